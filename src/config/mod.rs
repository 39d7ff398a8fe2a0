/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量覆盖和验证
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod globals;
pub mod logging;

pub use globals::GlobalNames;
pub use logging::{init_logging, LogLevel, LoggingConfig};

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读写错误
    #[error("Config file `{}`: {source}", .path.display())]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 解析或序列化错误
    #[error("Config {format:?} error: {message}")]
    ParseError {
        format: ConfigFormat,
        message: String,
    },
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 按扩展名选择格式，`.json` 以外一律按TOML处理
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }

    fn parse_error(self, message: impl ToString) -> ConfigError {
        ConfigError::ParseError {
            format: self,
            message: message.to_string(),
        }
    }
}

/// 编组层主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarshalConfig {
    /// 运行时全局名称
    #[serde(default)]
    pub globals: GlobalNames,

    /// 暂存缓冲区配置
    #[serde(default)]
    pub scratch: ScratchConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MarshalConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析配置文本
    pub fn parse(content: &str, format: ConfigFormat) -> ConfigResult<Self> {
        match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| format.parse_error(e)),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| format.parse_error(e)),
        }
    }

    /// 序列化为配置文本
    pub fn render(&self, format: ConfigFormat) -> ConfigResult<String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| format.parse_error(e)),
            ConfigFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| format.parse_error(e))
            }
        }
    }

    /// 从文件加载配置，格式由扩展名决定
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::FileError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, ConfigFormat::from_path(path))
    }

    /// 保存到文件，格式由扩展名决定
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = self.render(ConfigFormat::from_path(path))?;
        fs::write(path, content).map_err(|source| ConfigError::FileError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MARSHAL_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
        if let Ok(val) = env::var("MARSHAL_SCRATCH_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.scratch.initial_capacity = capacity;
            }
        }
        if let Ok(val) = env::var("MARSHAL_SCRATCH_RETAIN") {
            if let Ok(retain) = val.parse() {
                self.scratch.retain_capacity = retain;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.globals.validate()?;
        self.scratch.validate()?;
        Ok(())
    }

    /// 加载配置文件并应用环境变量
    ///
    /// 文件不存在、无法解析或验证失败时使用默认配置。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut config = match Self::load(path) {
            Ok(config) => {
                tracing::debug!(target: "config", path = %path.display(), "Loaded marshal config");
                config
            }
            Err(e) => {
                tracing::debug!(target: "config", path = %path.display(), error = %e, "Using default marshal config");
                Self::default()
            }
        };
        config.apply_env_overrides();
        if let Err(e) = config.validate() {
            tracing::debug!(target: "config", path = %path.display(), error = %e, "Invalid marshal config, using defaults");
            config = Self::default();
        }
        config
    }
}

/// 暂存缓冲区配置
///
/// `unbox` 复用同一块暂存内存；超过 `retain_capacity` 的容量由下一次结果不超过上限的调用释放。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// 初始容量（字节）
    pub initial_capacity: usize,

    /// 调用之间保留的最大容量（字节）
    pub retain_capacity: usize,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            retain_capacity: 1 << 20,
        }
    }
}

impl ScratchConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retain_capacity < self.initial_capacity {
            return Err(ConfigError::ValidationError(format!(
                "Scratch retain capacity {} is smaller than initial capacity {}",
                self.retain_capacity, self.initial_capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MarshalConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = MarshalConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: MarshalConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.globals, parsed.globals);
        assert_eq!(config.scratch, parsed.scratch);
    }

    #[test]
    fn test_json_serialization() {
        let config = MarshalConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed = MarshalConfig::parse(&json_str, ConfigFormat::Json).unwrap();
        assert_eq!(config.globals, parsed.globals);
    }

    #[test]
    fn test_partial_toml() {
        let config = MarshalConfig::parse(
            r#"
            [globals]
            byte_view = "Bytes"

            [scratch]
            retain_capacity = 4096
            "#,
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.globals.byte_view, "Bytes");
        assert_eq!(config.globals.raw_buffer, "ArrayBuffer");
        assert_eq!(config.scratch.retain_capacity, 4096);
        assert_eq!(config.scratch.initial_capacity, 256);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_invalid_scratch() {
        let mut config = MarshalConfig::default();
        config.scratch.initial_capacity = 1024;
        config.scratch.retain_capacity = 16;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            MarshalConfig::parse("[globals", ConfigFormat::Toml),
            Err(ConfigError::ParseError {
                format: ConfigFormat::Toml,
                ..
            })
        ));
    }

    #[test]
    fn test_save_and_load_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MarshalConfig::default();
        config.globals.raw_buffer = "RawBuffer".to_string();

        let toml_path = dir.path().join("marshal.toml");
        config.save(&toml_path).unwrap();
        let loaded = MarshalConfig::load(&toml_path).unwrap();
        assert_eq!(loaded.globals.raw_buffer, "RawBuffer");

        let json_path = dir.path().join("marshal.json");
        config.save(&json_path).unwrap();
        assert!(std::fs::read_to_string(&json_path).unwrap().starts_with('{'));
        let loaded = MarshalConfig::load_or_default(&json_path);
        assert_eq!(loaded.globals.raw_buffer, "RawBuffer");
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let config = MarshalConfig::load_or_default(&missing);
        assert_eq!(config.globals, GlobalNames::default());
        assert!(matches!(
            MarshalConfig::load(&missing),
            Err(ConfigError::FileError { .. })
        ));
    }

    #[test]
    fn test_load_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marshal.toml");
        std::fs::write(
            &path,
            r#"
            [globals]
            raw_buffer = "RawBuffer"
            byte_view = ""
            "#,
        )
        .unwrap();

        // 文件本身可以解析，但验证失败
        let parsed = MarshalConfig::load(&path).unwrap();
        assert!(matches!(
            parsed.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let config = MarshalConfig::load_or_default(&path);
        assert_eq!(config.globals, GlobalNames::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_logging_section() {
        let config = MarshalConfig::parse(
            r#"
            [globals]
            raw_buffer = "RawBuffer"

            [logging]
            level = "debug"
            "#,
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.globals.raw_buffer, "RawBuffer");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.log_to_console);

        let rendered = config.render(ConfigFormat::Toml).unwrap();
        assert!(rendered.contains("level = \"debug\""));
    }
}
