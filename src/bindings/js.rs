//! JavaScript Binding Adapter using rquickjs
//!
//! Implements the engine bundle on top of a QuickJS context. With the
//! `adopt-buffers` feature (on by default) boxing hands a Rust allocation to
//! QuickJS through `ArrayBuffer::new`; the runtime drops it when the buffer is
//! collected. Without the feature boxing copies byte by byte through a
//! `Uint8Array`.

use rquickjs::convert::Coerced;
use rquickjs::function::{Constructor, Rest, This};
use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};

use super::engine::Engine;
use crate::core::{MarshalError, MarshalResult};

#[cfg(feature = "adopt-buffers")]
use super::engine::AdoptBuffer;
#[cfg(feature = "adopt-buffers")]
use super::marshal::AdoptBytes;
#[cfg(not(feature = "adopt-buffers"))]
use super::marshal::CopyByIndex;

/// Engine handle over one QuickJS context.
#[derive(Clone)]
pub struct QuickJs<'js> {
    ctx: Ctx<'js>,
}

impl<'js> QuickJs<'js> {
    pub fn new(ctx: Ctx<'js>) -> Self {
        Self { ctx }
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    /// Evaluates `source` in this context.
    pub fn eval(&self, source: &str) -> MarshalResult<Value<'js>> {
        self.ctx
            .eval::<Value, _>(source)
            .map_err(|e| self.engine_error(e))
    }

    /// Converts an rquickjs error, pulling the pending exception message if
    /// the failure was a thrown JS value.
    fn engine_error(&self, error: rquickjs::Error) -> MarshalError {
        if let rquickjs::Error::Exception = error {
            let thrown = self.ctx.catch();
            if let Some(message) = thrown.as_exception().and_then(|e| e.message()) {
                return MarshalError::Engine(message);
            }
            return MarshalError::Engine(format!("uncaught exception: {:?}", thrown));
        }
        MarshalError::Engine(error.to_string())
    }
}

impl<'js> Engine for QuickJs<'js> {
    type Value = Value<'js>;
    type Object = Object<'js>;

    #[cfg(feature = "adopt-buffers")]
    type Boxing = AdoptBytes;
    #[cfg(not(feature = "adopt-buffers"))]
    type Boxing = CopyByIndex;

    fn global_constructor(&self, name: &str) -> MarshalResult<Object<'js>> {
        let value: Value = self
            .ctx
            .globals()
            .get(name)
            .map_err(|e| self.engine_error(e))?;
        if !value.is_function() {
            return Err(MarshalError::lookup(name));
        }
        value.into_object().ok_or_else(|| MarshalError::lookup(name))
    }

    fn is_instance_of(&self, value: &Value<'js>, constructor: &Object<'js>) -> bool {
        value
            .as_object()
            .map_or(false, |object| object.is_instance_of(constructor))
    }

    fn to_object(&self, value: &Value<'js>) -> Option<Object<'js>> {
        value.as_object().cloned()
    }

    fn object_value(&self, object: &Object<'js>) -> Value<'js> {
        object.clone().into_value()
    }

    fn get_property(&self, object: &Object<'js>, name: &str) -> MarshalResult<Value<'js>> {
        object.get(name).map_err(|e| self.engine_error(e))
    }

    fn get_index(&self, object: &Object<'js>, index: u32) -> MarshalResult<Value<'js>> {
        object.get(index).map_err(|e| self.engine_error(e))
    }

    fn set_index(&self, object: &Object<'js>, index: u32, value: Value<'js>) -> MarshalResult<()> {
        object.set(index, value).map_err(|e| self.engine_error(e))
    }

    fn call_method(
        &self,
        object: &Object<'js>,
        name: &str,
        args: &[Value<'js>],
    ) -> MarshalResult<Value<'js>> {
        let method: Value = object.get(name).map_err(|e| self.engine_error(e))?;
        let method = method
            .into_function()
            .ok_or_else(|| MarshalError::lookup(name))?;
        call(&method, object, args).map_err(|e| self.engine_error(e))
    }

    fn construct(&self, constructor: &Object<'js>, args: &[Value<'js>]) -> MarshalResult<Object<'js>> {
        let constructor: Constructor = constructor
            .clone()
            .into_value()
            .get()
            .map_err(|e| self.engine_error(e))?;
        constructor
            .construct((Rest(args.to_vec()),))
            .map_err(|e| self.engine_error(e))
    }

    fn to_boolean(&self, value: &Value<'js>) -> MarshalResult<bool> {
        value
            .get::<Coerced<bool>>()
            .map(|coerced| coerced.0)
            .map_err(|e| self.engine_error(e))
    }

    fn to_number(&self, value: &Value<'js>) -> MarshalResult<f64> {
        value
            .get::<Coerced<f64>>()
            .map(|coerced| coerced.0)
            .map_err(|e| self.engine_error(e))
    }

    fn from_number(&self, number: f64) -> MarshalResult<Value<'js>> {
        Ok(Value::new_number(self.ctx.clone(), number))
    }

    fn from_boolean(&self, value: bool) -> MarshalResult<Value<'js>> {
        Ok(Value::new_bool(self.ctx.clone(), value))
    }

    fn null_value(&self) -> Value<'js> {
        Value::new_null(self.ctx.clone())
    }

    fn is_nullish(&self, value: &Value<'js>) -> bool {
        value.is_null() || value.is_undefined()
    }
}

fn call<'js>(
    method: &Function<'js>,
    receiver: &Object<'js>,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    method.call((This(receiver.clone()), Rest(args.to_vec())))
}

#[cfg(feature = "adopt-buffers")]
impl<'js> AdoptBuffer for QuickJs<'js> {
    fn adopt_bytes(&self, bytes: Vec<u8>) -> MarshalResult<Value<'js>> {
        let buffer = rquickjs::ArrayBuffer::new(self.ctx.clone(), bytes)
            .map_err(|e| self.engine_error(e))?;
        Ok(buffer.into_value())
    }
}

/// Owns a QuickJS runtime and one full context.
pub struct JsRuntime {
    #[allow(dead_code)]
    runtime: Runtime,
    context: Context,
}

impl JsRuntime {
    pub fn new() -> MarshalResult<Self> {
        let runtime = Runtime::new().map_err(|e| MarshalError::Engine(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| MarshalError::Engine(e.to_string()))?;
        tracing::debug!(target: "marshal.js", "QuickJS context created");
        Ok(Self { runtime, context })
    }

    /// Runs `f` with an engine handle scoped to the context.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(QuickJs<'js>) -> R,
    {
        self.context.with(|ctx| f(QuickJs::new(ctx)))
    }
}
