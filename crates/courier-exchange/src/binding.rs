use crate::message::Envelope;
use crate::{ExchangeError, Result};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 处理器返回值；`Err` 会被交换机捕获并写入诊断接收器
pub type HandlerResult = anyhow::Result<()>;

/// 消息处理器 trait
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// 处理一条投递过来的消息
    async fn handle(&self, envelope: Envelope) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, envelope: Envelope) -> HandlerResult {
        (self)(envelope).await
    }
}

/// 绑定：路由键 + 处理器 + 可选的队列名
///
/// 带队列名的绑定在同一交换机内唯一，可以按名称解绑；
/// 匿名绑定没有身份，不能单独移除。
#[derive(Clone)]
pub struct Binding {
    routing_key: String,
    queue: Option<String>,
    handler: Arc<dyn MessageHandler>,
}

impl Binding {
    /// 创建匿名绑定
    pub fn new<H>(routing_key: impl Into<String>, handler: H) -> Result<Self>
    where
        H: MessageHandler + 'static,
    {
        Self::from_parts(routing_key.into(), None, Arc::new(handler))
    }

    /// 创建具名（队列）绑定
    pub fn named<H>(
        queue: impl Into<String>,
        routing_key: impl Into<String>,
        handler: H,
    ) -> Result<Self>
    where
        H: MessageHandler + 'static,
    {
        Self::from_parts(routing_key.into(), Some(queue.into()), Arc::new(handler))
    }

    /// 使用已共享的处理器创建绑定
    pub fn from_parts(
        routing_key: String,
        queue: Option<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self> {
        let binding = Self {
            routing_key,
            queue,
            handler,
        };
        binding.validate()?;
        Ok(binding)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.routing_key.is_empty() {
            return Err(ExchangeError::InvalidBinding(
                "routing key should be a non-empty string".to_string(),
            ));
        }
        if matches!(self.queue.as_deref(), Some("")) {
            return Err(ExchangeError::InvalidBinding(
                "queue should be a non-empty string".to_string(),
            ));
        }
        Ok(())
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("routing_key", &self.routing_key)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
