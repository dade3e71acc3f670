use crate::binding::{Binding, MessageHandler};
use crate::matcher::{ExchangeMode, RouteMatcher};
use crate::message::Message;
use crate::metrics::ExchangeMetrics;
use crate::sink::{DiagnosticSink, HandlerDeliveryError, TracingSink};
use crate::{ExchangeError, Result};
use courier_config::ExchangeSettings;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, debug_span, info, warn, Instrument};

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// 当前任务中正在排空队列的交换机 ID
    static DISPATCH_CHAIN: Vec<u64>;
}

/// 已注册的绑定及其编译好的匹配器
struct BoundEntry {
    binding: Binding,
    matcher: RouteMatcher,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dispatched: AtomicU64,
    deliveries: AtomicU64,
    failures: AtomicU64,
}

/// 交换机运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExchangeStats {
    /// 进入队列的消息数
    pub published: u64,
    /// 已完成投递的消息数
    pub dispatched: u64,
    /// 处理器调用次数（含失败）
    pub deliveries: u64,
    /// 处理器失败次数
    pub failures: u64,
    /// 尚未开始投递的消息数
    pub pending: usize,
    /// 当前绑定数
    pub bindings: usize,
}

/// 交换机 - 按模式把消息投递给匹配的绑定
///
/// 职责：
/// 1. 维护按插入顺序排列的绑定，具名绑定的队列名唯一
/// 2. 绑定时编译路由键
/// 3. `publish` 排空待投递队列，逐条、逐绑定顺序等待处理器
///
/// 同一时刻只有一个任务在排空队列；并发的 `publish` 共享队列，
/// 每个调用都会在自己的消息投递完成之后才返回。
pub struct Exchange {
    id: u64,
    name: String,
    mode: ExchangeMode,
    bindings: RwLock<Vec<Arc<BoundEntry>>>,
    pending: Mutex<VecDeque<Message>>,
    dispatch_lock: tokio::sync::Mutex<()>,
    sink: Arc<dyn DiagnosticSink>,
    counters: Counters,
}

impl Exchange {
    /// 创建指定模式的交换机，诊断接收器为 [`TracingSink`]
    pub fn new(mode: ExchangeMode) -> Self {
        Self::builder().mode(mode).build()
    }

    pub fn builder() -> ExchangeBuilder {
        ExchangeBuilder::default()
    }

    /// 从配置创建；模式字符串非法时返回 `InvalidExchangeMode`
    pub fn from_settings(settings: &ExchangeSettings) -> Result<Self> {
        let mode = settings.mode.parse()?;
        Ok(Self::builder().name(&settings.name).mode(mode).build())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ExchangeMode {
        self.mode
    }

    /// 注册绑定
    ///
    /// 具名绑定的队列名已存在时返回 `DuplicateQueue`，状态不变。
    pub fn bind(&self, binding: Binding) -> Result<()> {
        binding.validate()?;
        let matcher = RouteMatcher::compile(self.mode, binding.routing_key())?;

        let mut bindings = self.bindings.write();
        if let Some(queue) = binding.queue() {
            if bindings.iter().any(|entry| entry.binding.queue() == Some(queue)) {
                warn!(
                    exchange = %self.name,
                    queue = %queue,
                    "Rejected binding, queue already bound"
                );
                return Err(ExchangeError::DuplicateQueue(queue.to_string()));
            }
        }

        info!(
            exchange = %self.name,
            routing_key = %binding.routing_key(),
            queue = ?binding.queue(),
            "Binding registered"
        );
        bindings.push(Arc::new(BoundEntry { binding, matcher }));
        let count = bindings.len();
        drop(bindings);

        ExchangeMetrics::set_bindings(&self.name, count);
        Ok(())
    }

    /// 注册匿名绑定
    pub fn subscribe<H>(&self, routing_key: impl Into<String>, handler: H) -> Result<()>
    where
        H: MessageHandler + 'static,
    {
        self.bind(Binding::new(routing_key, handler)?)
    }

    /// 注册具名绑定
    pub fn bind_queue<H>(
        &self,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
        handler: H,
    ) -> Result<()>
    where
        H: MessageHandler + 'static,
    {
        self.bind(Binding::named(queue, routing_key, handler)?)
    }

    /// 按队列名解绑，返回是否有绑定被移除
    pub fn unbind(&self, queue: &str) -> bool {
        let mut bindings = self.bindings.write();
        let before = bindings.len();
        bindings.retain(|entry| entry.binding.queue() != Some(queue));
        let count = bindings.len();
        drop(bindings);

        if count == before {
            debug!(exchange = %self.name, queue = %queue, "Unbind ignored, queue not bound");
            return false;
        }

        info!(exchange = %self.name, queue = %queue, "Queue unbound");
        ExchangeMetrics::set_bindings(&self.name, count);
        true
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.bindings
            .read()
            .iter()
            .any(|entry| entry.binding.queue() == Some(queue))
    }

    /// 具名绑定的队列名，按注册顺序
    pub fn queues(&self) -> Vec<String> {
        self.bindings
            .read()
            .iter()
            .filter_map(|entry| entry.binding.queue().map(str::to_string))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            pending: self.pending_count(),
            bindings: self.binding_count(),
        }
    }

    /// 发布消息，返回时该消息已投递给所有匹配的绑定
    ///
    /// 处理器失败只写入诊断接收器，不会返回给调用者。
    ///
    /// 在本交换机的处理器内部调用时例外：消息只入队，调用立即返回，
    /// 由外层正在运行的排空循环在当前消息之后投递。处理器不要等待
    /// 一个 `tokio::spawn` 出去、向同一交换机发布的任务：该任务在
    /// 排空锁上等待外层循环，外层循环又在等待处理器，二者会互相卡住。
    pub async fn publish(&self, message: Message) {
        self.enqueue(message);
        self.flush().await;
    }

    /// 按顺序发布一批消息，只排空一次
    pub async fn publish_all<I>(&self, messages: I)
    where
        I: IntoIterator<Item = Message>,
    {
        for message in messages {
            self.enqueue(message);
        }
        self.flush().await;
    }

    /// 只入队不投递，由下一次 `publish` / `flush` 处理
    pub fn enqueue(&self, message: Message) {
        debug!(
            exchange = %self.name,
            message_id = %message.id(),
            route = %message.route(),
            "Message enqueued"
        );
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        ExchangeMetrics::record_published(&self.name);
        self.pending.lock().push_back(message);
    }

    /// 排空待投递队列
    ///
    /// 在本交换机的处理器内部调用时直接返回，消息留给正在运行的排空循环。
    /// 重入检测依赖 task-local，只对同一个任务内的调用生效。
    pub async fn flush(&self) {
        let mut chain = DISPATCH_CHAIN
            .try_with(|chain| chain.clone())
            .unwrap_or_default();
        if chain.contains(&self.id) {
            debug!(
                exchange = %self.name,
                "Publish from inside dispatch, deferring to the running drain"
            );
            return;
        }

        let _guard = self.dispatch_lock.lock().await;
        chain.push(self.id);
        DISPATCH_CHAIN.scope(chain, self.drain()).await;
    }

    async fn drain(&self) {
        while let Some(message) = self.next_pending() {
            let span = debug_span!(
                "dispatch",
                exchange = %self.name,
                message_id = %message.id(),
                route = %message.route(),
            );
            self.dispatch(&message).instrument(span).await;
        }
    }

    fn next_pending(&self) -> Option<Message> {
        self.pending.lock().pop_front()
    }

    async fn dispatch(&self, message: &Message) {
        // 快照：处理器内的 bind/unbind 从下一条消息开始生效
        let bindings: Vec<Arc<BoundEntry>> = self.bindings.read().clone();
        let mut deliveries = 0u64;
        let mut failures = 0u64;

        for entry in bindings.iter().filter(|entry| entry.matcher.is_match(message.route())) {
            deliveries += 1;
            if let Err(cause) = entry.binding.handler().handle(message.to_envelope()).await {
                failures += 1;
                let failure = HandlerDeliveryError::new(&self.name, message, &entry.binding, &cause);
                self.sink.write_error(&failure);
            }
        }

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        self.counters.deliveries.fetch_add(deliveries, Ordering::Relaxed);
        self.counters.failures.fetch_add(failures, Ordering::Relaxed);
        ExchangeMetrics::record_dispatched(&self.name, deliveries, failures);

        debug!(deliveries, failures, "Message dispatched");
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("bindings", &self.binding_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// 交换机构建器
pub struct ExchangeBuilder {
    name: String,
    mode: ExchangeMode,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for ExchangeBuilder {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            mode: ExchangeMode::default(),
            sink: Arc::new(TracingSink),
        }
    }
}

impl ExchangeBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn mode(mut self, mode: ExchangeMode) -> Self {
        self.mode = mode;
        self
    }

    /// 设置诊断接收器，默认是 [`TracingSink`]
    pub fn sink<S>(self, sink: S) -> Self
    where
        S: DiagnosticSink + 'static,
    {
        self.shared_sink(Arc::new(sink))
    }

    pub fn shared_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> Exchange {
        Exchange {
            id: NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            mode: self.mode,
            bindings: RwLock::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            dispatch_lock: tokio::sync::Mutex::new(()),
            sink: self.sink,
            counters: Counters::default(),
        }
    }
}
