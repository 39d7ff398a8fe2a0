//! Binary Marshaller
//!
//! Converts between script buffer values and native bytes for any runtime
//! implementing [`Engine`]:
//!
//! - `unbox`: raw buffer or buffer view → [`NativeBuffer`]
//! - `box_value`: [`NativeBuffer`] → raw buffer, through the integration's
//!   [`BoxPath`]

use super::binary::NativeBuffer;
use super::engine::{AdoptBuffer, Engine};
use crate::config::{GlobalNames, MarshalConfig};
use crate::core::{MarshalError, MarshalResult};

/// Strategy used by `box_value` to hand bytes to a runtime.
pub trait BoxPath<E: Engine + ?Sized> {
    /// Short name used in trace output.
    const NAME: &'static str;

    fn box_bytes(engine: &E, names: &GlobalNames, data: NativeBuffer<'_>)
        -> MarshalResult<E::Value>;
}

/// Universal path: allocate a byte view of the right length inside the
/// runtime and write every byte through indexed property sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyByIndex;

impl<E: Engine + ?Sized> BoxPath<E> for CopyByIndex {
    const NAME: &'static str = "copy-by-index";

    fn box_bytes(
        engine: &E,
        names: &GlobalNames,
        data: NativeBuffer<'_>,
    ) -> MarshalResult<E::Value> {
        if u32::try_from(data.len()).is_err() {
            return Err(MarshalError::Unsupported(format!(
                "buffer of {} bytes exceeds the script index range",
                data.len()
            )));
        }

        let constructor = engine.global_constructor(&names.byte_view)?;
        let byte_count = engine.from_number(data.len() as f64)?;
        let view = engine.construct(&constructor, &[byte_count])?;

        for (index, byte) in data.iter().enumerate() {
            let value = engine.from_number(f64::from(*byte))?;
            engine.set_index(&view, index as u32, value)?;
        }

        let buffer = engine.get_property(&view, &names.buffer)?;
        if engine.to_object(&buffer).is_none() {
            return Err(MarshalError::Type(format!(
                "`{}` of a new byte view is not an object",
                names.buffer
            )));
        }
        Ok(buffer)
    }
}

/// Fast path: copy into a native allocation and transfer ownership of it to
/// the runtime, which frees it when the raw buffer is collected.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdoptBytes;

impl<E: AdoptBuffer + ?Sized> BoxPath<E> for AdoptBytes {
    const NAME: &'static str = "adopt";

    fn box_bytes(
        engine: &E,
        _names: &GlobalNames,
        data: NativeBuffer<'_>,
    ) -> MarshalResult<E::Value> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(data.len())
            .map_err(|_| MarshalError::Allocation { bytes: data.len() })?;
        bytes.extend_from_slice(&data);
        engine.adopt_bytes(bytes)
    }
}

/// Generic binary marshaller.
///
/// Holds the scratch storage reused by [`BinaryMarshaller::unbox`]. One
/// instance per runtime context; instances are never shared between threads.
#[derive(Debug, Clone)]
pub struct BinaryMarshaller {
    names: GlobalNames,
    scratch: Vec<u8>,
    initial_capacity: usize,
    retain_capacity: usize,
}

impl Default for BinaryMarshaller {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryMarshaller {
    pub fn new() -> Self {
        Self::with_config(&MarshalConfig::default())
    }

    pub fn with_config(config: &MarshalConfig) -> Self {
        Self {
            names: config.globals.clone(),
            scratch: Vec::with_capacity(config.scratch.initial_capacity),
            initial_capacity: config.scratch.initial_capacity,
            retain_capacity: config.scratch.retain_capacity,
        }
    }

    pub fn names(&self) -> &GlobalNames {
        &self.names
    }

    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Extracts the bytes of a raw buffer or buffer view.
    ///
    /// The result borrows this marshaller's scratch storage and is valid until
    /// the next call on `self`. Fails with `MarshalError::Type` when the value
    /// is neither shape; a failed call never yields partial bytes.
    pub fn unbox<E: Engine>(
        &mut self,
        engine: &E,
        value: &E::Value,
    ) -> MarshalResult<NativeBuffer<'_>> {
        let view = self.canonical_view(engine, value)?;
        let byte_count = self.view_length(engine, &view)?;

        if self.scratch.capacity() > self.retain_capacity && byte_count <= self.retain_capacity {
            self.scratch = Vec::with_capacity(byte_count.max(self.initial_capacity));
        }
        self.scratch.clear();
        self.scratch.resize(byte_count, 0);
        copy_bytes(engine, &view, &mut self.scratch)?;

        tracing::trace!(target: "marshal", bytes = byte_count, "unboxed binary value");
        Ok(NativeBuffer::new(&self.scratch))
    }

    /// Like [`BinaryMarshaller::unbox`], but returns independently owned
    /// storage and leaves the scratch buffer untouched.
    pub fn unbox_owned<E: Engine>(&self, engine: &E, value: &E::Value) -> MarshalResult<Vec<u8>> {
        let view = self.canonical_view(engine, value)?;
        let mut bytes = vec![0; self.view_length(engine, &view)?];
        copy_bytes(engine, &view, &mut bytes)?;
        Ok(bytes)
    }

    /// Creates a raw buffer holding a copy of `data`, using the integration's
    /// box path.
    pub fn box_value<E: Engine>(&self, engine: &E, data: NativeBuffer<'_>) -> MarshalResult<E::Value> {
        tracing::trace!(
            target: "marshal",
            bytes = data.len(),
            path = <E::Boxing as BoxPath<E>>::NAME,
            "boxing binary value"
        );
        <E::Boxing as BoxPath<E>>::box_bytes(engine, &self.names, data)
    }

    /// Boxes through indexed writes regardless of the integration's default.
    pub fn box_copy<E: Engine>(&self, engine: &E, data: NativeBuffer<'_>) -> MarshalResult<E::Value> {
        <CopyByIndex as BoxPath<E>>::box_bytes(engine, &self.names, data)
    }

    /// Boxes by handing a native allocation to the runtime.
    pub fn box_adopt<E: AdoptBuffer>(
        &self,
        engine: &E,
        data: NativeBuffer<'_>,
    ) -> MarshalResult<E::Value> {
        <AdoptBytes as BoxPath<E>>::box_bytes(engine, &self.names, data)
    }

    /// Normalizes `value` into a byte view over the bytes it denotes.
    fn canonical_view<E: Engine>(&self, engine: &E, value: &E::Value) -> MarshalResult<E::Object> {
        let names = &self.names;
        let raw_constructor = engine.global_constructor(&names.raw_buffer)?;
        let view_constructor = engine.global_constructor(&names.byte_view)?;

        let args = if engine.is_instance_of(value, &raw_constructor) {
            tracing::trace!(target: "marshal", "value is a raw buffer");
            vec![value.clone()]
        } else {
            let object = engine.to_object(value).ok_or_else(MarshalError::not_binary)?;
            let object_value = engine.object_value(&object);
            let is_view = engine.call_method(&raw_constructor, &names.is_view, &[object_value])?;
            if !engine.to_boolean(&is_view)? {
                return Err(MarshalError::not_binary());
            }

            let buffer = engine.get_property(&object, &names.buffer)?;
            if engine.to_object(&buffer).is_none() {
                return Err(MarshalError::not_binary());
            }
            let byte_offset = engine.get_property(&object, &names.byte_offset)?;
            let byte_length = engine.get_property(&object, &names.byte_length)?;
            tracing::trace!(target: "marshal", "value is a buffer view");
            vec![buffer, byte_offset, byte_length]
        };

        engine.construct(&view_constructor, &args)
    }

    fn view_length<E: Engine>(&self, engine: &E, view: &E::Object) -> MarshalResult<usize> {
        let length = engine.get_property(view, &self.names.length)?;
        let length = engine.to_number(&length)?;
        if !length.is_finite() || length < 0.0 || length.fract() != 0.0 {
            return Err(MarshalError::Type(format!(
                "byte view `{}` is not a valid byte count: {}",
                self.names.length, length
            )));
        }
        Ok(length as usize)
    }
}

/// Reads `out.len()` bytes from `view` in ascending index order.
fn copy_bytes<E: Engine>(engine: &E, view: &E::Object, out: &mut [u8]) -> MarshalResult<()> {
    for (index, slot) in out.iter_mut().enumerate() {
        let index = u32::try_from(index).map_err(|_| {
            MarshalError::Unsupported(format!("byte index {} exceeds the script index range", index))
        })?;
        let byte = engine.get_index(view, index)?;
        *slot = engine.to_number(&byte)? as u8;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::sandbox::{ElementType, Sandbox, SandboxValue};

    #[test]
    fn test_unbox_raw_buffer() {
        let sandbox = Sandbox::new();
        let raw = sandbox.array_buffer(&[0x01, 0x02, 0xFF]).unwrap();
        let mut marshaller = BinaryMarshaller::new();

        let buffer = marshaller.unbox(&sandbox, &raw).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.as_slice(), &[1, 2, 255]);
    }

    #[test]
    fn test_unbox_view_range() {
        let sandbox = Sandbox::new();
        let raw = sandbox.array_buffer(&[10, 20, 30, 40]).unwrap();
        let view = sandbox.typed_array(ElementType::Uint8, &raw, 1, Some(2)).unwrap();
        let mut marshaller = BinaryMarshaller::new();

        assert_eq!(marshaller.unbox(&sandbox, &view).unwrap().as_slice(), &[20, 30]);
    }

    #[test]
    fn test_unbox_rejects_scalars_and_plain_objects() {
        let sandbox = Sandbox::new();
        let mut marshaller = BinaryMarshaller::new();
        let values = [
            SandboxValue::Number(3.0),
            SandboxValue::Bool(true),
            SandboxValue::from("bytes"),
            SandboxValue::Undefined,
            sandbox.plain_object(),
        ];
        for value in &values {
            let err = marshaller.unbox(&sandbox, value).unwrap_err();
            assert_eq!(err, MarshalError::not_binary(), "value: {:?}", value);
        }
    }

    #[test]
    fn test_scratch_reuse_has_no_residue() {
        let sandbox = Sandbox::new();
        let long = sandbox.array_buffer(&[9; 64]).unwrap();
        let short = sandbox.array_buffer(&[1, 2]).unwrap();
        let empty = sandbox.array_buffer(&[]).unwrap();
        let mut marshaller = BinaryMarshaller::new();

        assert_eq!(marshaller.unbox(&sandbox, &long).unwrap().len(), 64);
        assert_eq!(marshaller.unbox(&sandbox, &short).unwrap().as_slice(), &[1, 2]);
        assert!(marshaller.unbox(&sandbox, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_scratch_capacity_is_released() {
        let mut config = MarshalConfig::default();
        config.scratch.initial_capacity = 8;
        config.scratch.retain_capacity = 32;
        let sandbox = Sandbox::new();
        let big = sandbox.array_buffer(&[7; 100]).unwrap();
        let small = sandbox.array_buffer(&[1]).unwrap();
        let mut marshaller = BinaryMarshaller::with_config(&config);

        marshaller.unbox(&sandbox, &big).unwrap();
        assert!(marshaller.scratch_capacity() >= 100);
        marshaller.unbox(&sandbox, &small).unwrap();
        assert!(marshaller.scratch_capacity() <= 32);
    }

    #[test]
    fn test_unbox_owned_matches_unbox() {
        let sandbox = Sandbox::new();
        let raw = sandbox.array_buffer(&[5, 6, 7, 8]).unwrap();
        let view = sandbox.typed_array(ElementType::Uint16, &raw, 2, Some(1)).unwrap();
        let mut marshaller = BinaryMarshaller::new();

        let owned = marshaller.unbox_owned(&sandbox, &view).unwrap();
        assert_eq!(owned, vec![7, 8]);
        assert_eq!(marshaller.unbox(&sandbox, &view).unwrap().as_slice(), owned.as_slice());
    }

    #[test]
    fn test_box_copy_produces_raw_buffer() {
        let sandbox = Sandbox::new();
        let marshaller = BinaryMarshaller::new();

        let value = marshaller.box_value(&sandbox, NativeBuffer::from(&[0x00, 0xFF])).unwrap();
        assert_eq!(sandbox.raw_bytes(&value), Some(vec![0x00, 0xFF]));

        let empty = marshaller.box_copy(&sandbox, NativeBuffer::default()).unwrap();
        assert_eq!(sandbox.raw_bytes(&empty), Some(Vec::new()));
    }

    #[test]
    fn test_missing_constructor_is_lookup_error() {
        let sandbox = Sandbox::new();
        let raw = sandbox.array_buffer(&[1]).unwrap();
        sandbox.delete_global("Uint8Array");
        let mut marshaller = BinaryMarshaller::new();

        assert_eq!(
            marshaller.unbox(&sandbox, &raw).unwrap_err(),
            MarshalError::lookup("Uint8Array")
        );
        assert!(marshaller
            .box_value(&sandbox, NativeBuffer::from(&[1]))
            .unwrap_err()
            .is_lookup());
    }

    #[test]
    fn test_renamed_globals() {
        let mut config = MarshalConfig::default();
        config.globals.byte_view = "Bytes".to_string();
        let sandbox = Sandbox::new();
        let bytes_ctor = sandbox.global("Uint8Array");
        sandbox.set_global("Bytes", bytes_ctor);
        sandbox.delete_global("Uint8Array");
        let mut marshaller = BinaryMarshaller::with_config(&config);

        let boxed = marshaller.box_value(&sandbox, NativeBuffer::from(&[3, 4])).unwrap();
        assert_eq!(marshaller.unbox(&sandbox, &boxed).unwrap().as_slice(), &[3, 4]);
    }
}
