//! 观测层错误
//!
//! 只覆盖安装日志与指标时会出现的失败；交换机的投递错误不经过这里。

use std::io;
use std::path::PathBuf;

/// 安装或调整观测设施时的失败
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    /// 观测配置文件无法读取
    #[error("cannot read observability config {}: {source}", path.display())]
    ReadConfig {
        /// 配置文件路径
        path: PathBuf,
        /// 底层 IO 错误
        #[source]
        source: io::Error,
    },

    /// 观测配置文件无法解析，或扩展名既不是 json 也不是 toml
    #[error("cannot parse observability config {}: {reason}", path.display())]
    ParseConfig {
        /// 配置文件路径
        path: PathBuf,
        /// 解析器给出的原因
        reason: String,
    },

    /// 级别或模块指令不被 `EnvFilter` 接受
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// 出错的指令
        directive: String,
        /// `EnvFilter` 给出的原因
        reason: String,
    },

    /// 日志文件或其目录无法创建
    #[error("cannot open log file {}: {reason}", path.display())]
    LogFile {
        /// 日志文件路径
        path: PathBuf,
        /// 失败原因
        reason: String,
    },

    /// 全局 subscriber 已被占用，或本管理器没有安装 subscriber
    #[error("tracing subscriber unavailable: {0}")]
    Subscriber(String),

    /// 全局 metrics recorder 已被占用
    #[error("metrics recorder unavailable: {0}")]
    Recorder(String),
}

impl ObservabilityError {
    pub(crate) fn invalid_filter(directive: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidFilter {
            directive: directive.into(),
            reason: reason.to_string(),
        }
    }

    /// 出错的子系统：`config`、`logging` 或 `metrics`
    pub fn component(&self) -> &'static str {
        match self {
            Self::ReadConfig { .. } | Self::ParseConfig { .. } => "config",
            Self::InvalidFilter { .. } | Self::LogFile { .. } | Self::Subscriber(_) => "logging",
            Self::Recorder(_) => "metrics",
        }
    }
}

/// 观测层结果类型
pub type Result<T> = std::result::Result<T, ObservabilityError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_invalid_filter_message() {
        let err = ObservabilityError::invalid_filter("courier_exchange=loud", "unknown level");
        assert_eq!(err.component(), "logging");
        assert_eq!(
            err.to_string(),
            "invalid log filter 'courier_exchange=loud': unknown level"
        );
    }

    #[test]
    fn test_read_config_keeps_io_source() {
        let err = ObservabilityError::ReadConfig {
            path: PathBuf::from("/etc/courier/observability.toml"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.component(), "config");
        assert!(err.to_string().contains("/etc/courier/observability.toml"));
        assert_eq!(err.source().unwrap().to_string(), "missing");
    }

    #[test]
    fn test_recorder_component() {
        let err = ObservabilityError::Recorder("already installed".to_string());
        assert_eq!(err.component(), "metrics");
        assert!(err.source().is_none());
    }
}
