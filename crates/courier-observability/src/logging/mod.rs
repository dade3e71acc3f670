//! 结构化日志模块
//!
//! 提供基于 tracing 的结构化日志功能，支持 stdout 与文件两种输出。

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{Layered, SubscriberExt},
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::{Config, LoggingConfig};
use crate::error::{ObservabilityError, Result};

/// 日志级别重新加载句柄类型
type ReloadHandle = Handle<EnvFilter, Registry>;

/// 带可重载过滤器的注册表
type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;

type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// 日志管理器
pub struct LogManager {
    /// 配置
    config: LoggingConfig,

    /// 过滤器重新加载句柄
    reload_handle: Option<Arc<RwLock<ReloadHandle>>>,

    /// 文件输出的后台写线程句柄，释放时刷盘
    file_guard: Option<WorkerGuard>,

    /// 是否已初始化
    initialized: bool,
}

impl fmt::Debug for LogManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogManager")
            .field("config", &self.config)
            .field("file_output", &self.file_guard.is_some())
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl LogManager {
    /// 创建新的日志管理器
    ///
    /// `logging.enabled` 为 false 时不安装全局 subscriber。
    pub async fn new(config: &Config) -> Result<Self> {
        let mut manager = Self {
            config: config.logging.clone(),
            reload_handle: None,
            file_guard: None,
            initialized: false,
        };

        manager.init().await?;

        Ok(manager)
    }

    /// 初始化日志系统
    async fn init(&mut self) -> Result<()> {
        if self.initialized || !self.config.enabled {
            return Ok(());
        }

        let filter = build_filter(&self.config)?;
        let (filter, reload_handle) = reload::Layer::new(filter);

        // 添加输出层
        let mut layers: Vec<BoxedLayer> = Vec::new();
        if self.config.stdout {
            layers.push(self.fmt_layer(std::io::stdout, self.config.ansi_colors));
        }
        if let Some(path) = &self.config.file {
            let (writer, guard) = file_writer(path)?;
            self.file_guard = Some(guard);
            layers.push(self.fmt_layer(writer, false));
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(layers)
            .try_init()
            .map_err(|e| ObservabilityError::Subscriber(e.to_string()))?;

        self.reload_handle = Some(Arc::new(RwLock::new(reload_handle)));
        self.initialized = true;

        tracing::info!(
            target: "courier_observability",
            "Log manager initialized with level: {}",
            self.config.level
        );

        Ok(())
    }

    fn fmt_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(self.config.include_target)
            .with_thread_ids(self.config.include_thread_id)
            .with_line_number(self.config.include_location)
            .with_file(self.config.include_location)
            .with_ansi(ansi);

        if self.config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }

    /// 动态更新日志级别
    pub async fn update_level(&mut self, level: &str) -> Result<()> {
        let new_filter =
            EnvFilter::try_new(level).map_err(|e| ObservabilityError::invalid_filter(level, e))?;

        let handle = self.reload_handle.as_ref().ok_or_else(|| {
            ObservabilityError::Subscriber("this manager did not install one".to_string())
        })?;

        handle
            .read()
            .modify(|filter| {
                *filter = new_filter;
            })
            .map_err(|e| ObservabilityError::Subscriber(e.to_string()))?;

        self.config.level = level.to_string();

        tracing::info!(
            target: "courier_observability",
            "Log level updated to: {}",
            level
        );

        Ok(())
    }

    /// 是否已安装全局 subscriber
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 获取当前配置
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// 关闭日志管理器
    ///
    /// 释放文件写线程的 guard，返回前缓冲的日志已写入文件。
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!(
            target: "courier_observability",
            "Log manager shutting down"
        );
        if let Some(guard) = self.file_guard.take() {
            drop(guard);
        }
        Ok(())
    }
}

/// 构建环境过滤器
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| ObservabilityError::invalid_filter(&config.level, e))?;

    for (target, level) in &config.module_levels {
        let directive = format!("{}={}", target, level);
        let parsed = directive
            .parse()
            .map_err(|e| ObservabilityError::invalid_filter(&directive, e))?;
        filter = filter.add_directive(parsed);
    }

    Ok(filter)
}

/// 创建非阻塞的文件写入器
fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let log_file_error = |reason: String| ObservabilityError::LogFile {
        path: path.to_path_buf(),
        reason,
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| log_file_error("path has no file name".to_string()))?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(dir).map_err(|e| log_file_error(e.to_string()))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// 创建带有交换机上下文的 span
pub fn create_exchange_span(exchange: &str, mode: &str) -> tracing::Span {
    tracing::info_span!(
        "exchange",
        exchange = %exchange,
        mode = %mode,
    )
}
