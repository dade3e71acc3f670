//! 交换机指标
//!
//! 通过 `metrics` 门面记录；未安装 recorder 时这些调用是空操作。

use metrics::{describe_counter, describe_gauge, Unit};

pub const MESSAGES_PUBLISHED: &str = "courier_messages_published_total";
pub const MESSAGES_DISPATCHED: &str = "courier_messages_dispatched_total";
pub const DELIVERIES: &str = "courier_deliveries_total";
pub const DELIVERY_FAILURES: &str = "courier_delivery_failures_total";
pub const BINDINGS: &str = "courier_bindings";

/// 交换机指标记录器
pub struct ExchangeMetrics;

impl ExchangeMetrics {
    /// 向已安装的 recorder 注册指标描述，安装 recorder 之后调用
    pub fn describe() {
        describe_counter!(MESSAGES_PUBLISHED, Unit::Count, "Messages enqueued on an exchange");
        describe_counter!(MESSAGES_DISPATCHED, Unit::Count, "Messages whose dispatch completed");
        describe_counter!(DELIVERIES, Unit::Count, "Handler invocations, failed ones included");
        describe_counter!(
            DELIVERY_FAILURES,
            Unit::Count,
            "Handler invocations that returned an error"
        );
        describe_gauge!(BINDINGS, Unit::Count, "Bindings currently registered on an exchange");
    }

    /// 记录进入待投递队列的消息
    pub fn record_published(exchange: &str) {
        metrics::counter!(MESSAGES_PUBLISHED, "exchange" => exchange.to_string()).increment(1);
    }

    /// 记录一条消息完成投递
    pub fn record_dispatched(exchange: &str, deliveries: u64, failures: u64) {
        let label = exchange.to_string();
        metrics::counter!(MESSAGES_DISPATCHED, "exchange" => label.clone()).increment(1);
        metrics::counter!(DELIVERIES, "exchange" => label.clone()).increment(deliveries);
        metrics::counter!(DELIVERY_FAILURES, "exchange" => label).increment(failures);
    }

    /// 设置当前绑定数
    pub fn set_bindings(exchange: &str, count: usize) {
        metrics::gauge!(BINDINGS, "exchange" => exchange.to_string()).set(count as f64);
    }
}
