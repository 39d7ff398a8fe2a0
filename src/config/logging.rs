/// 日志配置

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出到控制台
    pub log_to_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_to_console: true,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// 解析环境变量中的级别名称（不区分大小写）
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// 初始化日志系统
///
/// 配置tracing日志框架。设置了`RUST_LOG`时以环境变量为准，否则使用配置中的级别。
/// 重复调用是安全的，已经安装的订阅者会被保留。
pub fn init_logging(config: &LoggingConfig) {
    if !config.log_to_console {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    tracing::debug!(target: "config", level = config.level.as_str(), "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" trace "), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_level_names_match_parse() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            let json = serde_json::to_string(&level).unwrap();
            assert_eq!(json, format!("\"{}\"", level.as_str()));
            assert_eq!(LogLevel::parse(level.as_str()), Some(level));
        }

        let config: LoggingConfig = serde_json::from_str(r#"{"level": "warn"}"#).unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.log_to_console);
    }

    #[test]
    fn test_init_logging_twice() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
