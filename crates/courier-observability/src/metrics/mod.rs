//! 指标 recorder
//!
//! 交换机通过 `metrics` 门面上报计数，指标名和描述由上报方自己注册。
//! 这里只负责安装全局 recorder 并导出文本。

#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::{Config, MetricsConfig};
#[cfg(feature = "prometheus")]
use crate::error::ObservabilityError;
use crate::error::Result;

/// 指标收集器
pub struct MetricsCollector {
    #[cfg(feature = "prometheus")]
    handle: Option<PrometheusHandle>,
    config: MetricsConfig,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("config", &self.config)
            .field("installed", &self.is_initialized())
            .finish()
    }
}

impl MetricsCollector {
    /// 按配置安装 recorder；全局 recorder 已被占用时返回 `Recorder` 错误
    pub async fn new(config: &Config) -> Result<Self> {
        let mut collector = Self {
            #[cfg(feature = "prometheus")]
            handle: None,
            config: config.metrics.clone(),
        };

        if collector.config.enabled {
            collector.install()?;
        }

        Ok(collector)
    }

    #[cfg(feature = "prometheus")]
    fn install(&mut self) -> Result<()> {
        if !self.config.prometheus {
            return Ok(());
        }

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| ObservabilityError::Recorder(e.to_string()))?;
        self.handle = Some(handle);

        tracing::info!(target: "courier_observability", "Prometheus recorder installed");
        Ok(())
    }

    #[cfg(not(feature = "prometheus"))]
    fn install(&mut self) -> Result<()> {
        tracing::warn!(
            target: "courier_observability",
            "Metrics enabled but built without the prometheus feature"
        );
        Ok(())
    }

    /// 是否由本收集器安装了 recorder
    pub fn is_initialized(&self) -> bool {
        #[cfg(feature = "prometheus")]
        {
            self.handle.is_some()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            false
        }
    }

    /// Prometheus 文本格式；未安装时为空
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.handle.as_ref().map(|h| h.render()).unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }

    /// 关闭前整理一次直方图桶，之后的 `render` 仍然可用
    pub async fn shutdown(&self) -> Result<()> {
        #[cfg(feature = "prometheus")]
        if let Some(handle) = &self.handle {
            handle.run_upkeep();
        }
        tracing::info!(target: "courier_observability", "Metrics collector shutting down");
        Ok(())
    }
}
