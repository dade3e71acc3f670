//! In-process message exchange.
//!
//! 消息按交换机模式（direct / topic / fanout）匹配绑定，并在 `publish`
//! 调用内按顺序投递给每个匹配的处理器。处理器失败只会写入诊断接收器，
//! 不会影响其他绑定或其他消息。

pub mod binding;
pub mod exchange;
pub mod matcher;
pub mod message;
pub mod metrics;
pub mod registry;
pub mod sink;

pub use binding::{Binding, HandlerResult, MessageHandler};
pub use exchange::{Exchange, ExchangeBuilder, ExchangeStats};
pub use matcher::{matches, topic_expression, ExchangeMode, RouteMatcher};
pub use message::{Envelope, Message};
pub use registry::ExchangeRegistry;
pub use sink::{DiagnosticSink, HandlerDeliveryError, MemorySink, TracingSink};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Invalid exchange mode: '{0}' (expected direct, topic or fanout)")]
    InvalidExchangeMode(String),

    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Queue already bound: {0}")]
    DuplicateQueue(String),

    #[error("Invalid topic pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Exchange '{name}' already declared as {existing}, requested {requested}")]
    ModeMismatch {
        name: String,
        existing: ExchangeMode,
        requested: ExchangeMode,
    },
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
