//! # Script Marshal
//!
//! Engine-agnostic binary marshalling between embedded script runtimes and
//! native byte buffers.
//!
//! ## Features
//!
//! - **One algorithm, many runtimes**: conversion is written once against the
//!   [`bindings::Engine`] trait bundle and monomorphized per runtime
//! - **Raw buffers and views**: any typed view or DataView is read back as raw
//!   octets, independent of its element width
//! - **Ownership transfer**: runtimes that can adopt native memory receive it
//!   directly and free it when collected
//! - **QuickJS**: built-in integration through `rquickjs`
//!
//! ### Example
//!
//! ```ignore
//! use script_marshal::bindings::{BinaryMarshaller, JsRuntime, NativeBuffer};
//!
//! let js = JsRuntime::new()?;
//! js.with(|engine| {
//!     let mut marshaller = BinaryMarshaller::new();
//!     let value = marshaller.box_value(&engine, NativeBuffer::from(&[0x00, 0xFF]))?;
//!     let bytes = marshaller.unbox(&engine, &value)?;
//!     assert_eq!(bytes.as_slice(), &[0x00, 0xFF]);
//!     Ok::<_, script_marshal::MarshalError>(())
//! })?;
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Error types
//! - [`config`]: Configuration and logging setup
//! - [`bindings`]: Engine bundle, marshaller, accessor and runtime integrations

/// Error types shared by every module
pub mod core;
/// Configuration loading, validation and logging initialisation
pub mod config;
/// Binary binding layer
pub mod bindings;

pub use bindings::{
    BinaryMarshaller, Engine, NativeAccessor, NativeBuffer, NativeValue, PropertyType,
};
pub use config::MarshalConfig;
pub use core::{MarshalError, MarshalResult};
