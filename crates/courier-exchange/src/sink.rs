//! 诊断接收器
//!
//! 处理器失败不会返回给 `publish` 的调用者，而是交给 [`DiagnosticSink`]。

use crate::binding::Binding;
use crate::message::Message;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// 一次处理器调用失败
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("handler bound to '{routing_key}' failed on message {message_id} ({route}): {reason}")]
pub struct HandlerDeliveryError {
    pub exchange: String,
    pub message_id: Uuid,
    pub route: String,
    pub routing_key: String,
    pub queue: Option<String>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl HandlerDeliveryError {
    pub(crate) fn new(
        exchange: &str,
        message: &Message,
        binding: &Binding,
        cause: &anyhow::Error,
    ) -> Self {
        Self {
            exchange: exchange.to_string(),
            message_id: message.id(),
            route: message.route().to_string(),
            routing_key: binding.routing_key().to_string(),
            queue: binding.queue().map(str::to_string),
            reason: format!("{:#}", cause),
            failed_at: Utc::now(),
        }
    }
}

/// 错误输出通道
pub trait DiagnosticSink: Send + Sync {
    fn write_error(&self, error: &HandlerDeliveryError);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&HandlerDeliveryError) + Send + Sync,
{
    fn write_error(&self, error: &HandlerDeliveryError) {
        (self)(error)
    }
}

/// 默认接收器：写一条 `tracing` error 事件
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn write_error(&self, failure: &HandlerDeliveryError) {
        error!(
            target: "courier_exchange",
            exchange = %failure.exchange,
            message_id = %failure.message_id,
            route = %failure.route,
            routing_key = %failure.routing_key,
            queue = ?failure.queue,
            "Handler failed: {}",
            failure.reason
        );
    }
}

/// 内存接收器，保存所有失败记录
#[derive(Debug, Default)]
pub struct MemorySink {
    errors: Mutex<Vec<HandlerDeliveryError>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录失败的副本
    pub fn errors(&self) -> Vec<HandlerDeliveryError> {
        self.errors.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    pub fn clear(&self) {
        self.errors.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn write_error(&self, error: &HandlerDeliveryError) {
        self.errors.lock().push(error.clone());
    }
}
