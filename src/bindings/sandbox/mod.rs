//! Sandbox runtime
//!
//! A small in-process script runtime with its own object model: realms with
//! their own constructors, raw buffers, typed array views of every element
//! width, DataViews and plain objects. Memory is reference counted; a raw
//! buffer is released when the last value referencing it is dropped.
//!
//! The sandbox cannot wrap foreign memory, so it boxes by indexed copy.

mod value;

pub use value::{ElementType, ObjectRef, SandboxValue};

use std::cell::RefCell;
use std::rc::Rc;

use value::{Builtin, Class, NativeFn, View};

use super::engine::Engine;
use super::marshal::CopyByIndex;
use crate::core::{MarshalError, MarshalResult};

/// Largest length a script index conversion accepts (2^53 - 1).
const MAX_SAFE_INDEX: f64 = 9_007_199_254_740_991.0;

/// One sandbox realm; also the context handle passed to the marshaller.
///
/// Cloning yields another handle to the same realm. Each [`Sandbox::new`]
/// creates a separate realm whose constructors are distinct from every other
/// realm's.
#[derive(Clone)]
pub struct Sandbox {
    globals: ObjectRef,
    /// Realm intrinsic used for buffers allocated implicitly by views.
    array_buffer: ObjectRef,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    pub fn new() -> Self {
        let globals = ObjectRef::new(Class::Plain, None);
        let array_buffer = ObjectRef::new(Class::Constructor(Builtin::ArrayBuffer), None);
        let is_view = ObjectRef::new(Class::Function(NativeFn::IsView), None);
        array_buffer
            .data_mut()
            .properties
            .insert("isView".to_string(), is_view.into());

        let sandbox = Self {
            globals,
            array_buffer: array_buffer.clone(),
        };
        sandbox.install("Object", ObjectRef::new(Class::Constructor(Builtin::Object), None));
        sandbox.install("ArrayBuffer", array_buffer);
        sandbox.install("DataView", ObjectRef::new(Class::Constructor(Builtin::DataView), None));
        for element in ElementType::ALL {
            sandbox.install(
                element.constructor_name(),
                ObjectRef::new(Class::Constructor(Builtin::TypedArray(element)), None),
            );
        }
        sandbox
    }

    fn install(&self, name: &str, constructor: ObjectRef) {
        self.set_global(name, constructor.into());
    }

    pub fn global(&self, name: &str) -> SandboxValue {
        self.globals
            .data()
            .properties
            .get(name)
            .cloned()
            .unwrap_or(SandboxValue::Undefined)
    }

    pub fn set_global(&self, name: &str, value: SandboxValue) {
        self.globals.data_mut().properties.insert(name.to_string(), value);
    }

    pub fn delete_global(&self, name: &str) -> Option<SandboxValue> {
        self.globals.data_mut().properties.remove(name)
    }

    /// Whether both handles refer to the same realm.
    pub fn same_realm(&self, other: &Sandbox) -> bool {
        self.globals == other.globals
    }

    /// `new Object()`
    pub fn plain_object(&self) -> SandboxValue {
        let constructor = self.global("Object").as_object().cloned();
        ObjectRef::new(Class::Plain, constructor).into()
    }

    /// `new ArrayBuffer(bytes.len())` filled with `bytes`.
    pub fn array_buffer(&self, bytes: &[u8]) -> MarshalResult<SandboxValue> {
        let constructor = self.global_constructor("ArrayBuffer")?;
        let buffer = self.construct(&constructor, &[SandboxValue::Number(bytes.len() as f64)])?;
        if let Some(storage) = buffer.raw_bytes() {
            storage.borrow_mut().copy_from_slice(bytes);
        }
        Ok(buffer.into())
    }

    /// `new <Element>Array(buffer, byte_offset, length)`; `length` counts elements.
    pub fn typed_array(
        &self,
        element: ElementType,
        buffer: &SandboxValue,
        byte_offset: usize,
        length: Option<usize>,
    ) -> MarshalResult<SandboxValue> {
        let constructor = self.global_constructor(element.constructor_name())?;
        self.view_with(&constructor, buffer, byte_offset, length)
    }

    /// `new DataView(buffer, byte_offset, byte_length)`
    pub fn data_view(
        &self,
        buffer: &SandboxValue,
        byte_offset: usize,
        byte_length: Option<usize>,
    ) -> MarshalResult<SandboxValue> {
        let constructor = self.global_constructor("DataView")?;
        self.view_with(&constructor, buffer, byte_offset, byte_length)
    }

    fn view_with(
        &self,
        constructor: &ObjectRef,
        buffer: &SandboxValue,
        byte_offset: usize,
        length: Option<usize>,
    ) -> MarshalResult<SandboxValue> {
        let mut args = vec![buffer.clone(), SandboxValue::Number(byte_offset as f64)];
        if let Some(length) = length {
            args.push(SandboxValue::Number(length as f64));
        }
        Ok(self.construct(constructor, &args)?.into())
    }

    /// Snapshot of a raw buffer's bytes; `None` for anything else.
    pub fn raw_bytes(&self, value: &SandboxValue) -> Option<Vec<u8>> {
        let bytes = value.as_object()?.raw_bytes()?;
        let snapshot = bytes.borrow().clone();
        Some(snapshot)
    }

    fn new_buffer(&self, constructor: ObjectRef, length: usize) -> ObjectRef {
        let bytes = Rc::new(RefCell::new(vec![0u8; length]));
        ObjectRef::new(Class::Buffer(bytes), Some(constructor))
    }

    fn new_view(
        &self,
        constructor: &ObjectRef,
        element: Option<ElementType>,
        args: &[SandboxValue],
    ) -> MarshalResult<ObjectRef> {
        let kind = element.map_or("DataView", ElementType::constructor_name);
        let size = element.map_or(1, ElementType::size);

        let buffer = match args.first() {
            Some(SandboxValue::Object(object)) if object.is_raw_buffer() => object.clone(),
            Some(SandboxValue::Object(_)) => {
                return Err(MarshalError::Engine(format!(
                    "TypeError: {} can only be constructed over an ArrayBuffer",
                    kind
                )))
            }
            other if element.is_some() => {
                let length = to_index(other, "length")?;
                let byte_length = length.checked_mul(size).ok_or_else(|| {
                    MarshalError::Engine(format!("RangeError: invalid {} length", kind))
                })?;
                let buffer = self.new_buffer(self.array_buffer.clone(), byte_length);
                return Ok(self.attach_view(constructor, buffer, 0, byte_length, element));
            }
            _ => {
                return Err(MarshalError::Engine(
                    "TypeError: DataView requires an ArrayBuffer".to_string(),
                ))
            }
        };

        let buffer_length = buffer.raw_bytes().map_or(0, |bytes| bytes.borrow().len());
        let byte_offset = to_index(args.get(1), "offset")?;
        if byte_offset % size != 0 {
            return Err(MarshalError::Engine(format!(
                "RangeError: start offset of {} should be a multiple of {}",
                kind, size
            )));
        }
        if byte_offset > buffer_length {
            return Err(MarshalError::Engine(format!(
                "RangeError: start offset {} is outside the bounds of the buffer",
                byte_offset
            )));
        }

        let byte_length = match args.get(2) {
            None | Some(SandboxValue::Undefined) => {
                let rest = buffer_length - byte_offset;
                if rest % size != 0 {
                    return Err(MarshalError::Engine(format!(
                        "RangeError: byte length of {} should be a multiple of {}",
                        kind, size
                    )));
                }
                rest
            }
            length => {
                let length = to_index(length, "length")?;
                let byte_length = length.saturating_mul(size);
                if byte_offset + byte_length > buffer_length {
                    return Err(MarshalError::Engine(format!(
                        "RangeError: invalid {} length {}",
                        kind, length
                    )));
                }
                byte_length
            }
        };

        Ok(self.attach_view(constructor, buffer, byte_offset, byte_length, element))
    }

    fn attach_view(
        &self,
        constructor: &ObjectRef,
        buffer: ObjectRef,
        byte_offset: usize,
        byte_length: usize,
        element: Option<ElementType>,
    ) -> ObjectRef {
        let bytes = buffer.raw_bytes().unwrap_or_default();
        let view = View {
            buffer,
            bytes,
            byte_offset,
            byte_length,
            element,
        };
        ObjectRef::new(Class::View(view), Some(constructor.clone()))
    }
}

/// Script `ToIndex`: undefined and NaN become 0, negatives are a RangeError.
fn to_index(value: Option<&SandboxValue>, what: &str) -> MarshalResult<usize> {
    let number = match value {
        None | Some(SandboxValue::Undefined) => return Ok(0),
        Some(value) => number_of(value),
    };
    if number.is_nan() {
        return Ok(0);
    }
    let index = number.trunc();
    if !(0.0..=MAX_SAFE_INDEX).contains(&index) {
        return Err(MarshalError::Engine(format!("RangeError: invalid {} {}", what, number)));
    }
    Ok(index as usize)
}

fn number_of(value: &SandboxValue) -> f64 {
    match value {
        SandboxValue::Undefined => f64::NAN,
        SandboxValue::Null => 0.0,
        SandboxValue::Bool(b) => f64::from(u8::from(*b)),
        SandboxValue::Number(n) => *n,
        SandboxValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        SandboxValue::Object(_) => f64::NAN,
    }
}

impl Engine for Sandbox {
    type Value = SandboxValue;
    type Object = ObjectRef;
    type Boxing = CopyByIndex;

    fn global_constructor(&self, name: &str) -> MarshalResult<ObjectRef> {
        match self.global(name) {
            SandboxValue::Object(object)
                if matches!(object.data().class, Class::Constructor(_)) =>
            {
                Ok(object)
            }
            _ => Err(MarshalError::lookup(name)),
        }
    }

    fn is_instance_of(&self, value: &SandboxValue, constructor: &ObjectRef) -> bool {
        value
            .as_object()
            .map_or(false, |object| object.data().constructor.as_ref() == Some(constructor))
    }

    fn to_object(&self, value: &SandboxValue) -> Option<ObjectRef> {
        value.as_object().cloned()
    }

    fn object_value(&self, object: &ObjectRef) -> SandboxValue {
        SandboxValue::Object(object.clone())
    }

    fn get_property(&self, object: &ObjectRef, name: &str) -> MarshalResult<SandboxValue> {
        let data = object.data();
        let intrinsic = match (&data.class, name) {
            (Class::View(view), "buffer") => Some(SandboxValue::Object(view.buffer.clone())),
            (Class::View(view), "byteOffset") => Some(SandboxValue::Number(view.byte_offset as f64)),
            (Class::View(view), "byteLength") => Some(SandboxValue::Number(view.byte_length as f64)),
            (Class::View(view), "length") => view
                .element
                .map(|element| SandboxValue::Number((view.byte_length / element.size()) as f64)),
            (Class::Buffer(bytes), "byteLength") => {
                Some(SandboxValue::Number(bytes.borrow().len() as f64))
            }
            _ => None,
        };
        Ok(intrinsic.unwrap_or_else(|| {
            data.properties
                .get(name)
                .cloned()
                .unwrap_or(SandboxValue::Undefined)
        }))
    }

    fn get_index(&self, object: &ObjectRef, index: u32) -> MarshalResult<SandboxValue> {
        let data = object.data();
        if let Class::View(view) = &data.class {
            if view.element.is_some() {
                return Ok(match view.element_range(index) {
                    Some((element, range)) => {
                        SandboxValue::Number(element.read(&view.bytes.borrow()[range]))
                    }
                    None => SandboxValue::Undefined,
                });
            }
        }
        Ok(data
            .properties
            .get(&index.to_string())
            .cloned()
            .unwrap_or(SandboxValue::Undefined))
    }

    fn set_index(&self, object: &ObjectRef, index: u32, value: SandboxValue) -> MarshalResult<()> {
        let mut data = object.data_mut();
        if let Class::View(view) = &data.class {
            if view.element.is_some() {
                // Out-of-range writes on typed arrays are silently dropped.
                if let Some((element, range)) = view.element_range(index) {
                    element.write(number_of(&value), &mut view.bytes.borrow_mut()[range]);
                }
                return Ok(());
            }
        }
        data.properties.insert(index.to_string(), value);
        Ok(())
    }

    fn call_method(
        &self,
        object: &ObjectRef,
        name: &str,
        args: &[SandboxValue],
    ) -> MarshalResult<SandboxValue> {
        let method = self.get_property(object, name)?;
        let function = method.as_object().map(|f| match f.data().class {
            Class::Function(function) => Some(function),
            _ => None,
        });
        match function {
            Some(Some(NativeFn::IsView)) => Ok(SandboxValue::Bool(
                args.first()
                    .and_then(SandboxValue::as_object)
                    .map_or(false, ObjectRef::is_view),
            )),
            _ => Err(MarshalError::lookup(name)),
        }
    }

    fn construct(&self, constructor: &ObjectRef, args: &[SandboxValue]) -> MarshalResult<ObjectRef> {
        let builtin = match constructor.data().class {
            Class::Constructor(builtin) => builtin,
            _ => {
                return Err(MarshalError::Engine(
                    "TypeError: value is not a constructor".to_string(),
                ))
            }
        };
        match builtin {
            Builtin::Object => Ok(ObjectRef::new(Class::Plain, Some(constructor.clone()))),
            Builtin::ArrayBuffer => {
                let length = to_index(args.first(), "array buffer length")?;
                Ok(self.new_buffer(constructor.clone(), length))
            }
            Builtin::TypedArray(element) => self.new_view(constructor, Some(element), args),
            Builtin::DataView => self.new_view(constructor, None, args),
        }
    }

    fn to_boolean(&self, value: &SandboxValue) -> MarshalResult<bool> {
        Ok(match value {
            SandboxValue::Undefined | SandboxValue::Null => false,
            SandboxValue::Bool(b) => *b,
            SandboxValue::Number(n) => *n != 0.0 && !n.is_nan(),
            SandboxValue::String(s) => !s.is_empty(),
            SandboxValue::Object(_) => true,
        })
    }

    fn to_number(&self, value: &SandboxValue) -> MarshalResult<f64> {
        Ok(number_of(value))
    }

    fn from_number(&self, number: f64) -> MarshalResult<SandboxValue> {
        Ok(SandboxValue::Number(number))
    }

    fn from_boolean(&self, value: bool) -> MarshalResult<SandboxValue> {
        Ok(SandboxValue::Bool(value))
    }

    fn null_value(&self) -> SandboxValue {
        SandboxValue::Null
    }

    fn is_nullish(&self, value: &SandboxValue) -> bool {
        matches!(value, SandboxValue::Undefined | SandboxValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realms_have_distinct_constructors() {
        let a = Sandbox::new();
        let b = Sandbox::new();
        assert!(!a.same_realm(&b));
        assert!(a.same_realm(&a.clone()));
        assert_ne!(
            a.global_constructor("ArrayBuffer").unwrap(),
            b.global_constructor("ArrayBuffer").unwrap()
        );
    }

    #[test]
    fn test_instance_of_uses_identity() {
        let a = Sandbox::new();
        let b = Sandbox::new();
        let buffer = a.array_buffer(&[1, 2]).unwrap();
        assert!(a.is_instance_of(&buffer, &a.global_constructor("ArrayBuffer").unwrap()));
        assert!(!b.is_instance_of(&buffer, &b.global_constructor("ArrayBuffer").unwrap()));
    }

    #[test]
    fn test_typed_array_reads_elements() {
        let sandbox = Sandbox::new();
        let buffer = sandbox.array_buffer(&[1, 0, 2, 0]).unwrap();
        let view = sandbox.typed_array(ElementType::Uint16, &buffer, 0, None).unwrap();
        let view = view.as_object().unwrap();

        assert_eq!(sandbox.get_property(view, "length").unwrap(), SandboxValue::Number(2.0));
        assert_eq!(sandbox.get_index(view, 1).unwrap(), SandboxValue::Number(2.0));
        assert_eq!(sandbox.get_index(view, 2).unwrap(), SandboxValue::Undefined);
    }

    #[test]
    fn test_views_share_storage() {
        let sandbox = Sandbox::new();
        let buffer = sandbox.array_buffer(&[0; 4]).unwrap();
        let view = sandbox.typed_array(ElementType::Uint8, &buffer, 2, None).unwrap();
        sandbox
            .set_index(view.as_object().unwrap(), 0, SandboxValue::Number(300.0))
            .unwrap();
        assert_eq!(sandbox.raw_bytes(&buffer), Some(vec![0, 0, 44, 0]));
    }

    #[test]
    fn test_view_bounds_are_checked() {
        let sandbox = Sandbox::new();
        let buffer = sandbox.array_buffer(&[0; 6]).unwrap();
        assert!(sandbox.typed_array(ElementType::Uint32, &buffer, 2, None).is_err());
        assert!(sandbox.typed_array(ElementType::Uint32, &buffer, 0, None).is_err());
        assert!(sandbox.typed_array(ElementType::Uint16, &buffer, 2, Some(3)).is_err());
        assert!(sandbox.typed_array(ElementType::Uint16, &buffer, 2, Some(2)).is_ok());
        assert!(sandbox.data_view(&buffer, 7, None).is_err());
    }

    #[test]
    fn test_is_view() {
        let sandbox = Sandbox::new();
        let ctor = sandbox.global_constructor("ArrayBuffer").unwrap();
        let buffer = sandbox.array_buffer(&[1]).unwrap();
        let view = sandbox.data_view(&buffer, 0, None).unwrap();

        let check = |value: SandboxValue| sandbox.call_method(&ctor, "isView", &[value]).unwrap();
        assert_eq!(check(view), SandboxValue::Bool(true));
        assert_eq!(check(buffer), SandboxValue::Bool(false));
        assert_eq!(check(SandboxValue::Null), SandboxValue::Bool(false));
    }

    #[test]
    fn test_lookup_failures() {
        let sandbox = Sandbox::new();
        sandbox.set_global("ArrayBuffer", SandboxValue::Number(1.0));
        assert!(sandbox.global_constructor("ArrayBuffer").unwrap_err().is_lookup());
        assert!(sandbox.global_constructor("Missing").unwrap_err().is_lookup());

        let object = sandbox.plain_object();
        assert!(sandbox
            .call_method(object.as_object().unwrap(), "isView", &[])
            .unwrap_err()
            .is_lookup());
    }

    #[test]
    fn test_coercions() {
        let sandbox = Sandbox::new();
        assert!(!sandbox.to_boolean(&SandboxValue::Number(f64::NAN)).unwrap());
        assert!(sandbox.to_boolean(&SandboxValue::from("x")).unwrap());
        assert_eq!(sandbox.to_number(&SandboxValue::from(" 42 ")).unwrap(), 42.0);
        assert!(sandbox.to_number(&SandboxValue::Undefined).unwrap().is_nan());
        assert!(sandbox.is_nullish(&sandbox.null_value()));
    }
}
