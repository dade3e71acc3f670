pub mod config;
pub mod manager;

pub use config::{Config, ConfigError, ConfigResult, ExchangeSettings, LogLevel, LoggingConfig};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// 获取 Courier 配置目录路径
pub fn courier_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".courier"))
}

/// 获取默认配置文件路径
pub fn default_config_path() -> Option<PathBuf> {
    courier_dir().map(|dir| dir.join("config.json"))
}

/// 获取默认日志文件路径
pub fn default_log_path() -> Option<PathBuf> {
    courier_dir().map(|dir| dir.join("logs").join("courier.log"))
}

/// 展开路径中的 ~ 为用户主目录
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}
