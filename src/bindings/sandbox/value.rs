//! Object model of the sandbox runtime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Element type of a typed array view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
    Float64,
}

impl ElementType {
    pub const ALL: [ElementType; 8] = [
        ElementType::Uint8,
        ElementType::Int8,
        ElementType::Uint16,
        ElementType::Int16,
        ElementType::Uint32,
        ElementType::Int32,
        ElementType::Float32,
        ElementType::Float64,
    ];

    /// Bytes per element.
    pub fn size(self) -> usize {
        match self {
            ElementType::Uint8 | ElementType::Int8 => 1,
            ElementType::Uint16 | ElementType::Int16 => 2,
            ElementType::Uint32 | ElementType::Int32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }

    pub fn constructor_name(self) -> &'static str {
        match self {
            ElementType::Uint8 => "Uint8Array",
            ElementType::Int8 => "Int8Array",
            ElementType::Uint16 => "Uint16Array",
            ElementType::Int16 => "Int16Array",
            ElementType::Uint32 => "Uint32Array",
            ElementType::Int32 => "Int32Array",
            ElementType::Float32 => "Float32Array",
            ElementType::Float64 => "Float64Array",
        }
    }

    /// Decodes one little-endian element. `bytes.len()` must equal `size()`.
    pub(crate) fn read(self, bytes: &[u8]) -> f64 {
        match self {
            ElementType::Uint8 => f64::from(bytes[0]),
            ElementType::Int8 => f64::from(bytes[0] as i8),
            ElementType::Uint16 => f64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            ElementType::Int16 => f64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            ElementType::Uint32 => f64::from(u32::from_le_bytes(four(bytes))),
            ElementType::Int32 => f64::from(i32::from_le_bytes(four(bytes))),
            ElementType::Float32 => f64::from(f32::from_le_bytes(four(bytes))),
            ElementType::Float64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                f64::from_le_bytes(raw)
            }
        }
    }

    /// Encodes `number` with the wrapping integer conversions scripts use.
    pub(crate) fn write(self, number: f64, out: &mut [u8]) {
        let int = wrapping_integer(number);
        match self {
            ElementType::Uint8 | ElementType::Int8 => out[0] = int as u8,
            ElementType::Uint16 | ElementType::Int16 => {
                out.copy_from_slice(&(int as u16).to_le_bytes())
            }
            ElementType::Uint32 | ElementType::Int32 => {
                out.copy_from_slice(&(int as u32).to_le_bytes())
            }
            ElementType::Float32 => out.copy_from_slice(&(number as f32).to_le_bytes()),
            ElementType::Float64 => out.copy_from_slice(&number.to_le_bytes()),
        }
    }
}

fn four(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn wrapping_integer(number: f64) -> i64 {
    if number.is_finite() {
        number.trunc() as i64
    } else {
        0
    }
}

/// Shared byte storage of a raw buffer.
pub(crate) type Bytes = Rc<RefCell<Vec<u8>>>;

/// Window over a raw buffer. `element == None` is a DataView.
#[derive(Clone)]
pub(crate) struct View {
    pub(crate) buffer: ObjectRef,
    pub(crate) bytes: Bytes,
    pub(crate) byte_offset: usize,
    pub(crate) byte_length: usize,
    pub(crate) element: Option<ElementType>,
}

impl View {
    /// Byte range of element `index`, if in bounds.
    pub(crate) fn element_range(&self, index: u32) -> Option<(ElementType, std::ops::Range<usize>)> {
        let element = self.element?;
        let start = (index as usize).checked_mul(element.size())?;
        let end = start + element.size();
        if end > self.byte_length {
            return None;
        }
        Some((element, self.byte_offset + start..self.byte_offset + end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Object,
    ArrayBuffer,
    TypedArray(ElementType),
    DataView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeFn {
    IsView,
}

pub(crate) enum Class {
    Plain,
    Buffer(Bytes),
    View(View),
    Constructor(Builtin),
    Function(NativeFn),
}

pub(crate) struct ObjectData {
    pub(crate) class: Class,
    pub(crate) constructor: Option<ObjectRef>,
    pub(crate) properties: HashMap<String, SandboxValue>,
}

/// Handle to a sandbox object. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef(pub(crate) Rc<RefCell<ObjectData>>);

impl ObjectRef {
    pub(crate) fn new(class: Class, constructor: Option<ObjectRef>) -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData {
            class,
            constructor,
            properties: HashMap::new(),
        })))
    }

    pub(crate) fn data(&self) -> std::cell::Ref<'_, ObjectData> {
        self.0.borrow()
    }

    pub(crate) fn data_mut(&self) -> std::cell::RefMut<'_, ObjectData> {
        self.0.borrow_mut()
    }

    pub fn is_view(&self) -> bool {
        matches!(self.data().class, Class::View(_))
    }

    pub fn is_raw_buffer(&self) -> bool {
        matches!(self.data().class, Class::Buffer(_))
    }

    pub(crate) fn raw_bytes(&self) -> Option<Bytes> {
        match &self.data().class {
            Class::Buffer(bytes) => Some(Rc::clone(bytes)),
            _ => None,
        }
    }

    fn class_name(&self) -> &'static str {
        match &self.data().class {
            Class::Plain => "Object",
            Class::Buffer(_) => "ArrayBuffer",
            Class::View(view) => view.element.map_or("DataView", ElementType::constructor_name),
            Class::Constructor(_) | Class::Function(_) => "Function",
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object {}]", self.class_name())
    }
}

/// A value of the sandbox runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
}

impl SandboxValue {
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            SandboxValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            SandboxValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SandboxValue::Undefined => "undefined",
            SandboxValue::Null => "null",
            SandboxValue::Bool(_) => "boolean",
            SandboxValue::Number(_) => "number",
            SandboxValue::String(_) => "string",
            SandboxValue::Object(_) => "object",
        }
    }
}

impl From<&str> for SandboxValue {
    fn from(value: &str) -> Self {
        SandboxValue::String(Rc::from(value))
    }
}

impl From<f64> for SandboxValue {
    fn from(value: f64) -> Self {
        SandboxValue::Number(value)
    }
}

impl From<bool> for SandboxValue {
    fn from(value: bool) -> Self {
        SandboxValue::Bool(value)
    }
}

impl From<ObjectRef> for SandboxValue {
    fn from(value: ObjectRef) -> Self {
        SandboxValue::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_encoding_wraps() {
        let mut out = [0u8; 1];
        ElementType::Uint8.write(256.0 + 7.0, &mut out);
        assert_eq!(out, [7]);
        ElementType::Int8.write(-1.0, &mut out);
        assert_eq!(ElementType::Int8.read(&out), -1.0);
        assert_eq!(ElementType::Uint8.read(&out), 255.0);
        ElementType::Uint8.write(f64::NAN, &mut out);
        assert_eq!(out, [0]);
    }

    #[test]
    fn test_element_encoding_is_little_endian() {
        let mut out = [0u8; 2];
        ElementType::Uint16.write(0x1234 as f64, &mut out);
        assert_eq!(out, [0x34, 0x12]);

        let mut out = [0u8; 8];
        ElementType::Float64.write(1.5, &mut out);
        assert_eq!(ElementType::Float64.read(&out), 1.5);
    }

    #[test]
    fn test_object_identity() {
        let a = ObjectRef::new(Class::Plain, None);
        let b = ObjectRef::new(Class::Plain, None);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(format!("{:?}", a), "[object Object]");
    }
}
