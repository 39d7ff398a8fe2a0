//! 统一错误处理模块
//!
//! 编组层的所有操作都是同步的单次转换，失败时直接返回给调用方：
//!
//! - **Lookup**: 运行时的全局对象上缺少必需的构造函数或方法（嵌入配置错误）
//! - **Type**: 传入的脚本值不是可识别的形状
//! - **Allocation**: 快速路径分配原生内存失败
//! - **Engine**: 运行时原语本身抛出的异常
//!
//! 本层不重试、不记录错误日志、不返回部分结果。

use thiserror::Error;

/// 二进制编组错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("Lookup error: global `{name}` is missing or not callable")]
    Lookup { name: String },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Allocation error: failed to allocate {bytes} bytes for runtime buffer")]
    Allocation { bytes: usize },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Unsupported conversion: {0}")]
    Unsupported(String),
}

impl MarshalError {
    pub const NOT_BINARY: &'static str = "value is not convertible to binary";

    pub fn lookup(name: impl Into<String>) -> Self {
        Self::Lookup { name: name.into() }
    }

    /// 值既不是原始缓冲区也不是可识别的视图
    pub fn not_binary() -> Self {
        Self::Type(Self::NOT_BINARY.to_string())
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Self::Type(_))
    }
}

/// 编组结果类型别名
pub type MarshalResult<T> = Result<T, MarshalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            MarshalError::not_binary().to_string(),
            "Type error: value is not convertible to binary"
        );
        assert_eq!(
            MarshalError::lookup("Uint8Array").to_string(),
            "Lookup error: global `Uint8Array` is missing or not callable"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert!(MarshalError::lookup("ArrayBuffer").is_lookup());
        assert!(MarshalError::not_binary().is_type());
        assert!(!MarshalError::Allocation { bytes: 8 }.is_type());
    }
}
