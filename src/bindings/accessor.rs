//! Native Accessor
//!
//! Value-conversion facade used by storage code. It dispatches on the declared
//! property type: `Data` goes through the binary marshaller, scalar kinds use
//! the engine's direct coercions. Strings, dates and object links are
//! marshalled elsewhere and are rejected here.

use serde::{Deserialize, Serialize};

use super::binary::NativeBuffer;
use super::engine::Engine;
use super::marshal::BinaryMarshaller;
use crate::config::MarshalConfig;
use crate::core::{MarshalError, MarshalResult};

/// Upper bound on the up-front allocation for `unbox_list`; a script controls
/// `length`, so longer lists grow as their elements convert.
const LIST_PREALLOCATE_LIMIT: usize = 1024;

/// `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
const INT_UPPER_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Declared type of a stored property or list element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    Double,
    String,
    Data,
    Date,
    Object,
    List,
}

/// A value on the native side of the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    Data(Vec<u8>),
}

impl NativeValue {
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            NativeValue::Data(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Per-context accessor. Owns the engine handle and a binary marshaller.
pub struct NativeAccessor<E: Engine> {
    engine: E,
    binary: BinaryMarshaller,
}

impl<E: Engine> NativeAccessor<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            binary: BinaryMarshaller::new(),
        }
    }

    pub fn with_config(engine: E, config: &MarshalConfig) -> Self {
        Self {
            engine,
            binary: BinaryMarshaller::with_config(config),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Borrowed binary unbox; see [`BinaryMarshaller::unbox`].
    pub fn unbox_binary(&mut self, value: &E::Value) -> MarshalResult<NativeBuffer<'_>> {
        self.binary.unbox(&self.engine, value)
    }

    pub fn box_binary(&self, data: NativeBuffer<'_>) -> MarshalResult<E::Value> {
        self.binary.box_value(&self.engine, data)
    }

    /// Converts a script value for a property declared as `property_type`.
    ///
    /// `null`/`undefined` become [`NativeValue::Null`] only when `optional`.
    pub fn unbox(
        &mut self,
        value: &E::Value,
        property_type: PropertyType,
        optional: bool,
    ) -> MarshalResult<NativeValue> {
        if self.engine.is_nullish(value) {
            return if optional {
                Ok(NativeValue::Null)
            } else {
                Err(MarshalError::Type(format!(
                    "{:?} property is not optional",
                    property_type
                )))
            };
        }

        match property_type {
            PropertyType::Bool => Ok(NativeValue::Bool(self.engine.to_boolean(value)?)),
            PropertyType::Int => {
                let number = self.engine.to_number(value)?;
                if !number.is_finite()
                    || number.fract() != 0.0
                    || number < -INT_UPPER_BOUND
                    || number >= INT_UPPER_BOUND
                {
                    return Err(MarshalError::Type(format!(
                        "{} is not convertible to int",
                        number
                    )));
                }
                Ok(NativeValue::Int(number as i64))
            }
            PropertyType::Float => Ok(NativeValue::Float(self.engine.to_number(value)? as f32)),
            PropertyType::Double => Ok(NativeValue::Double(self.engine.to_number(value)?)),
            PropertyType::Data => {
                let bytes = self.binary.unbox(&self.engine, value)?;
                Ok(NativeValue::Data(bytes.to_vec()))
            }
            other => Err(MarshalError::Unsupported(format!(
                "{:?} values are not marshalled by the native accessor",
                other
            ))),
        }
    }

    /// Converts every element of a script list (anything with `length` and
    /// indexed elements) as `element_type`. Elements are never optional.
    pub fn unbox_list(
        &mut self,
        list: &E::Value,
        element_type: PropertyType,
    ) -> MarshalResult<Vec<NativeValue>> {
        let object = self
            .engine
            .to_object(list)
            .ok_or_else(|| MarshalError::Type("value is not a list".to_string()))?;
        let length = self
            .engine
            .get_property(&object, &self.binary.names().length)?;
        let length = self.engine.to_number(&length)?;
        if !length.is_finite() || length < 0.0 || length > f64::from(u32::MAX) {
            return Err(MarshalError::Type("value is not a list".to_string()));
        }

        let length = length as u32;
        let mut values = Vec::with_capacity((length as usize).min(LIST_PREALLOCATE_LIMIT));
        for index in 0..length {
            let element = self.engine.get_index(&object, index)?;
            values.push(self.unbox(&element, element_type, false)?);
        }
        Ok(values)
    }

    /// Converts a native value back into a script value.
    pub fn box_value(&self, value: &NativeValue) -> MarshalResult<E::Value> {
        match value {
            NativeValue::Null => Ok(self.engine.null_value()),
            NativeValue::Bool(b) => self.engine.from_boolean(*b),
            NativeValue::Int(i) => self.engine.from_number(*i as f64),
            NativeValue::Float(f) => self.engine.from_number(f64::from(*f)),
            NativeValue::Double(d) => self.engine.from_number(*d),
            NativeValue::Data(bytes) => self.box_binary(NativeBuffer::from(bytes)),
        }
    }
}
