/// 运行时全局名称配置

use serde::{Deserialize, Serialize};
use super::{ConfigResult, ConfigError};

/// 编组算法在脚本运行时中查找的构造函数和属性名称
///
/// 默认值对应标准 JavaScript 命名。嵌入方若重命名了全局对象，可以在这里覆盖。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalNames {
    /// 原始缓冲区构造函数
    pub raw_buffer: String,

    /// 规范字节视图构造函数 (8 位无符号元素)
    pub byte_view: String,

    /// 原始缓冲区构造函数上的视图判定方法
    pub is_view: String,

    /// 视图指向其原始缓冲区的属性
    pub buffer: String,

    pub byte_offset: String,

    pub byte_length: String,

    /// 字节视图的元素个数
    pub length: String,
}

impl Default for GlobalNames {
    fn default() -> Self {
        Self {
            raw_buffer: "ArrayBuffer".to_string(),
            byte_view: "Uint8Array".to_string(),
            is_view: "isView".to_string(),
            buffer: "buffer".to_string(),
            byte_offset: "byteOffset".to_string(),
            byte_length: "byteLength".to_string(),
            length: "length".to_string(),
        }
    }
}

impl GlobalNames {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        let fields = [
            ("raw_buffer", &self.raw_buffer),
            ("byte_view", &self.byte_view),
            ("is_view", &self.is_view),
            ("buffer", &self.buffer),
            ("byte_offset", &self.byte_offset),
            ("byte_length", &self.byte_length),
            ("length", &self.length),
        ];
        for (field, name) in fields {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Global name `{}` must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}
