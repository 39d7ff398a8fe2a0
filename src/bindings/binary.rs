//! Native byte buffers handed across the script boundary.

use std::fmt;
use std::ops::Deref;

/// Immutable view over a contiguous byte range owned by someone else.
///
/// Buffers produced by `BinaryMarshaller::unbox` borrow the marshaller's
/// scratch storage, so they cannot outlive the next call into the same
/// marshaller. Copy with [`NativeBuffer::to_vec`] to keep the bytes longer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeBuffer<'a> {
    bytes: &'a [u8],
}

impl<'a> NativeBuffer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl Deref for NativeBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl AsRef<[u8]> for NativeBuffer<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

impl<'a> From<&'a [u8]> for NativeBuffer<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for NativeBuffer<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::new(bytes.as_slice())
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for NativeBuffer<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Self::new(bytes.as_slice())
    }
}

impl fmt::Debug for NativeBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 16;
        write!(f, "NativeBuffer(len={}, [", self.len())?;
        for (i, byte) in self.bytes.iter().take(PREVIEW).enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        if self.len() > PREVIEW {
            write!(f, " ..")?;
        }
        write!(f, "])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_buffer_views_bytes() {
        let data = [1u8, 2, 255];
        let buffer = NativeBuffer::from(&data);
        assert_eq!(buffer.len(), 3);
        assert_eq!(&*buffer, &[1, 2, 255]);
        assert_eq!(buffer.as_ptr(), data.as_ptr());
    }

    #[test]
    fn test_debug_preview() {
        let data: Vec<u8> = (0..20).collect();
        let text = format!("{:?}", NativeBuffer::from(&data));
        assert!(text.starts_with("NativeBuffer(len=20, [00 01"));
        assert!(text.ends_with(" ..])"));
        assert_eq!(format!("{:?}", NativeBuffer::default()), "NativeBuffer(len=0, [])");
    }
}
