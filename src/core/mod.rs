//! 核心模块
//!
//! - `error` - 错误类型定义

pub mod error;

pub use error::{MarshalError, MarshalResult};
