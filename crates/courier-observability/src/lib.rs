//! Courier 观测设施
//!
//! 为嵌入交换机的程序安装 `tracing` subscriber 和 `metrics` recorder。
//! 两者都是进程级的全局状态，`Observability` 只应初始化一次；
//! 宿主已有自己的 subscriber 或 recorder 时，用 `without_logging` /
//! `without_metrics` 跳过对应部分。

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use crate::metrics::MetricsCollector;
pub use config::{Config, LoggingConfig, MetricsConfig};
pub use error::{ObservabilityError, Result};
pub use logging::LogManager;

use tokio::sync::Mutex;

/// 日志与指标的组合句柄
#[derive(Debug)]
pub struct Observability {
    logs: Mutex<LogManager>,
    metrics: MetricsCollector,
}

impl Observability {
    /// 先安装日志，再安装指标，这样 recorder 的安装日志也能输出
    pub async fn init(config: Config) -> Result<Self> {
        let logs = LogManager::new(&config).await?;
        let metrics = MetricsCollector::new(&config).await?;

        tracing::info!(
            target: "courier_observability",
            logging = logs.is_initialized(),
            metrics = metrics.is_initialized(),
            "Observability ready"
        );

        Ok(Self {
            logs: Mutex::new(logs),
            metrics,
        })
    }

    /// 使用 courier 主配置的 `logging` 段初始化
    pub async fn from_courier_config(config: &courier_config::Config) -> Result<Self> {
        Self::init(Config::from_courier_config(config)).await
    }

    /// 运行时替换过滤器，例如 `"warn,courier_exchange=debug"`
    pub async fn update_log_level(&self, level: &str) -> Result<()> {
        self.logs.lock().await.update_level(level).await
    }

    /// 当前生效的日志配置
    pub async fn logging(&self) -> LoggingConfig {
        self.logs.lock().await.config().clone()
    }

    /// 指标收集器
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Prometheus 文本格式的交换机指标
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }

    /// 关闭指标并把缓冲的日志写完
    pub async fn shutdown(self) -> Result<()> {
        self.metrics.shutdown().await?;
        self.logs.into_inner().shutdown().await
    }
}

/// 便捷导入
pub mod prelude {
    pub use crate::{Config, Observability, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn, Span};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_observability_without_global_state() {
        let config = Config::default()
            .with_log_level("debug")
            .without_logging()
            .without_metrics();

        let obs = Observability::init(config).await.unwrap();
        assert_eq!(obs.logging().await.level, "debug");
        assert!(!obs.metrics().is_initialized());
        assert!(obs.render_metrics().is_empty());

        // 没有安装 subscriber 时无法热更新
        let err = obs.update_log_level("warn").await.unwrap_err();
        assert!(matches!(err, ObservabilityError::Subscriber(_)));

        obs.shutdown().await.unwrap();
    }
}
