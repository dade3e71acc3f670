//! 观测配置
//!
//! 可以单独从 json/toml 文件读取，也可以由 `courier-config` 的 `logging` 段生成。
//! 文件输出由 `logging.file` 是否设置决定。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ObservabilityError, Result};

/// 观测配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 日志输出
    pub logging: LoggingConfig,
    /// 指标 recorder
    pub metrics: MetricsConfig,
}

impl Config {
    /// 按扩展名读取 json 或 toml 配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let parse_error = |reason: String| ObservabilityError::ParseConfig {
            path: path.to_path_buf(),
            reason,
        };

        let content =
            std::fs::read_to_string(path).map_err(|source| ObservabilityError::ReadConfig {
                path: path.to_path_buf(),
                source,
            })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
            Some("toml") => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
            _ => Err(parse_error("expected a .json or .toml file".to_string())),
        }
    }

    /// 由 courier 主配置的 `logging` 段生成，指标保持默认
    pub fn from_courier_config(config: &courier_config::Config) -> Self {
        Self {
            logging: LoggingConfig::from(&config.logging),
            metrics: MetricsConfig::default(),
        }
    }

    /// 覆盖基础级别
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// 切换 JSON 输出
    pub fn with_json_format(mut self, json: bool) -> Self {
        self.logging.json_format = json;
        self
    }

    /// 额外写入日志文件
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.logging.file = Some(path.into());
        self
    }

    /// 为某个 target 单独设置级别，例如 `courier_exchange` => `debug`
    pub fn with_module_level(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.logging.module_levels.insert(target.into(), level.into());
        self
    }

    /// 不安装全局 subscriber，交给宿主程序
    pub fn without_logging(mut self) -> Self {
        self.logging.enabled = false;
        self
    }

    /// 不安装 metrics recorder
    pub fn without_metrics(mut self) -> Self {
        self.metrics.enabled = false;
        self
    }
}

/// 日志输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 为 false 时不安装全局 subscriber
    pub enabled: bool,
    /// 基础级别或任意 `EnvFilter` 指令
    pub level: String,
    /// 每个 target 的级别，按名称顺序追加为指令
    pub module_levels: BTreeMap<String, String>,
    /// 输出 JSON 行
    pub json_format: bool,
    /// 写到 stdout
    pub stdout: bool,
    /// 另外写入的日志文件
    pub file: Option<PathBuf>,
    /// stdout 使用 ANSI 颜色
    pub ansi_colors: bool,
    /// 输出事件 target
    pub include_target: bool,
    /// 输出线程 ID
    pub include_thread_id: bool,
    /// 输出源文件和行号
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            module_levels: BTreeMap::new(),
            json_format: false,
            stdout: true,
            file: None,
            ansi_colors: true,
            include_target: true,
            include_thread_id: false,
            include_location: false,
        }
    }
}

impl From<&courier_config::LoggingConfig> for LoggingConfig {
    fn from(config: &courier_config::LoggingConfig) -> Self {
        Self {
            level: config.level.as_str().to_string(),
            json_format: config.json_format,
            file: config.file.as_deref().and_then(courier_config::expand_tilde),
            ..Self::default()
        }
    }
}

/// 指标配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 为 false 时不安装任何 recorder，交换机的指标调用成为空操作
    pub enabled: bool,
    /// 安装 Prometheus recorder（需要 `prometheus` feature）
    pub prometheus: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus: true,
        }
    }
}
