//! Engine Trait Bundle
//!
//! The primitives a script runtime must expose so the binary marshaller can
//! run against it unmodified. Each integration implements [`Engine`] on its
//! context handle; the marshaller is monomorphized per integration.

use super::marshal::BoxPath;
use crate::core::MarshalResult;

/// Per-runtime bindings consumed by the marshaller.
///
/// All calls happen synchronously on the thread that owns the runtime
/// context.
pub trait Engine {
    /// Any script value.
    type Value: Clone;

    /// A script value known to be an object.
    type Object: Clone;

    /// How `box` hands native bytes to this runtime. Fixed per integration.
    type Boxing: BoxPath<Self>;

    /// Looks up a named constructor on the global object.
    ///
    /// Fails with `MarshalError::Lookup` when the global is absent or not
    /// callable.
    fn global_constructor(&self, name: &str) -> MarshalResult<Self::Object>;

    /// Whether `value` was produced by exactly this constructor.
    ///
    /// Identity based: a structurally identical constructor from another realm
    /// does not match.
    fn is_instance_of(&self, value: &Self::Value, constructor: &Self::Object) -> bool;

    /// The value as an object, or `None` for scalars.
    fn to_object(&self, value: &Self::Value) -> Option<Self::Object>;

    fn object_value(&self, object: &Self::Object) -> Self::Value;

    fn get_property(&self, object: &Self::Object, name: &str) -> MarshalResult<Self::Value>;

    fn get_index(&self, object: &Self::Object, index: u32) -> MarshalResult<Self::Value>;

    fn set_index(&self, object: &Self::Object, index: u32, value: Self::Value)
        -> MarshalResult<()>;

    /// Invokes `object[name](...args)` with `object` as the receiver.
    ///
    /// A missing or non-callable method is a `MarshalError::Lookup`.
    fn call_method(
        &self,
        object: &Self::Object,
        name: &str,
        args: &[Self::Value],
    ) -> MarshalResult<Self::Value>;

    /// `new constructor(...args)`.
    fn construct(&self, constructor: &Self::Object, args: &[Self::Value])
        -> MarshalResult<Self::Object>;

    fn to_boolean(&self, value: &Self::Value) -> MarshalResult<bool>;

    fn to_number(&self, value: &Self::Value) -> MarshalResult<f64>;

    fn from_number(&self, number: f64) -> MarshalResult<Self::Value>;

    fn from_boolean(&self, value: bool) -> MarshalResult<Self::Value>;

    fn null_value(&self) -> Self::Value;

    /// `null` or `undefined`.
    fn is_nullish(&self, value: &Self::Value) -> bool;
}

/// Runtimes that can take ownership of a native allocation directly.
///
/// The returned raw buffer owns `bytes`; the runtime's collector releases it
/// once the buffer becomes unreachable. The native side must not free it.
pub trait AdoptBuffer: Engine {
    fn adopt_bytes(&self, bytes: Vec<u8>) -> MarshalResult<Self::Value>;
}
