//! Binary Binding Layer
//!
//! Moves binary blobs between embedded script runtimes and native storage.
//! One conversion algorithm runs against every runtime through the engine
//! trait bundle. The in-process sandbox runtime is compiled with the
//! `sandbox` feature.
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Script Runtimes                           │
//! │  ┌──────────────────────┐      ┌──────────────────────┐     │
//! │  │  QuickJS (rquickjs)  │      │  Sandbox (in-process)│     │
//! │  │  box: adopt bytes    │      │  box: copy by index  │     │
//! │  └──────────┬───────────┘      └──────────┬───────────┘     │
//! │             │                             │                 │
//! │             v                             v                 │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │           Engine Trait Bundle (per runtime)         │    │
//! │  └───────────────────────┬─────────────────────────────┘    │
//! │                          │                                  │
//! │                          v                                  │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │     Binary Marshaller (unbox / box_value)           │    │
//! │  └───────────────────────┬─────────────────────────────┘    │
//! │                          │                                  │
//! │                          v                                  │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │     Native Accessor (dispatch by property type)     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod accessor;
pub mod binary;
pub mod engine;
pub mod js;
pub mod marshal;
#[cfg(any(test, feature = "sandbox"))]
pub mod sandbox;

pub use accessor::{NativeAccessor, NativeValue, PropertyType};
pub use binary::NativeBuffer;
pub use engine::{AdoptBuffer, Engine};
pub use js::{JsRuntime, QuickJs};
pub use marshal::{AdoptBytes, BinaryMarshaller, BoxPath, CopyByIndex};
#[cfg(any(test, feature = "sandbox"))]
pub use sandbox::{ElementType, ObjectRef, Sandbox, SandboxValue};
