//! End-to-end routing behaviour across the three exchange modes.

use courier_exchange::{
    Binding, Envelope, Exchange, ExchangeError, ExchangeMode, HandlerResult, MemorySink, Message,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Handler that records every envelope it receives.
#[derive(Clone, Default)]
struct Recorder {
    received: Arc<Mutex<Vec<Envelope>>>,
}

impl Recorder {
    fn handler(&self) -> impl Fn(Envelope) -> std::future::Ready<HandlerResult> + Send + Sync + 'static {
        let received = Arc::clone(&self.received);
        move |envelope| {
            received.lock().push(envelope);
            std::future::ready(Ok(()))
        }
    }

    fn count(&self) -> usize {
        self.received.lock().len()
    }

    fn routes(&self) -> Vec<String> {
        self.received.lock().iter().map(|e| e.route.clone()).collect()
    }
}

fn failing(calls: &Arc<AtomicUsize>) -> impl Fn(Envelope) -> std::future::Ready<HandlerResult> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move |_envelope| {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Err(anyhow::anyhow!("custom error")))
    }
}

fn exchange_with_sink(mode: ExchangeMode) -> (Exchange, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let exchange = Exchange::builder().mode(mode).shared_sink(sink.clone()).build();
    (exchange, sink)
}

#[test]
fn rejects_unknown_mode() {
    let result = "headers".parse::<ExchangeMode>();
    assert!(matches!(result, Err(ExchangeError::InvalidExchangeMode(mode)) if mode == "headers"));
}

#[tokio::test]
async fn direct_delivers_only_to_exact_routes() {
    let exchange = Exchange::new(ExchangeMode::Direct);
    let recorder = Recorder::default();
    exchange.subscribe("test", recorder.handler()).unwrap();
    exchange.subscribe("other-route", recorder.handler()).unwrap();

    let message = Message::new("test", "some payload").unwrap();
    let id = message.id();
    exchange.publish(message).await;

    assert_eq!(recorder.count(), 1);
    let envelope = recorder.received.lock()[0].clone();
    assert_eq!(envelope.id, id);
    assert_eq!(envelope.route, "test");
    assert_eq!(envelope.payload, json!("some payload"));
    assert!(envelope.correlation_id.is_none());
    assert!(envelope.reply_to.is_none());
}

#[tokio::test]
async fn direct_is_case_sensitive() {
    let exchange = Exchange::new(ExchangeMode::Direct);
    let recorder = Recorder::default();
    exchange.subscribe("Orders", recorder.handler()).unwrap();

    exchange.publish(Message::new("orders", 1).unwrap()).await;
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn fanout_delivers_to_everybody() {
    let exchange = Exchange::new(ExchangeMode::Fanout);
    let recorder = Recorder::default();
    exchange.subscribe("random1", recorder.handler()).unwrap();
    exchange.subscribe("random2", recorder.handler()).unwrap();

    exchange.publish(Message::new("any-route", "payload").unwrap()).await;

    assert_eq!(recorder.count(), 2);
    assert!(recorder
        .received
        .lock()
        .iter()
        .all(|e| e.payload == json!("payload")));
}

#[tokio::test]
async fn topic_ignores_longer_routes() {
    let exchange = Exchange::new(ExchangeMode::Topic);
    let recorder = Recorder::default();
    exchange.subscribe("start.route.path", recorder.handler()).unwrap();

    exchange
        .publish(Message::new("start.route.path.extra.content", "payload").unwrap())
        .await;
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn topic_ignores_routes_with_a_different_start() {
    let exchange = Exchange::new(ExchangeMode::Topic);
    let recorder = Recorder::default();
    exchange.subscribe("start.route.path", recorder.handler()).unwrap();

    exchange.publish(Message::new("route.path", "payload").unwrap()).await;
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn topic_delivers_on_full_match() {
    let exchange = Exchange::new(ExchangeMode::Topic);
    let recorder = Recorder::default();
    exchange.subscribe("start.route.path", recorder.handler()).unwrap();

    exchange.publish(Message::new("start.route.path", "payload").unwrap()).await;
    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn topic_wildcard_matches_one_segment() {
    let exchange = Exchange::new(ExchangeMode::Topic);
    let recorder = Recorder::default();
    exchange.subscribe("start.*.path", recorder.handler()).unwrap();

    exchange
        .publish_all(vec![
            Message::new("start.route.path", "payload").unwrap(),
            Message::new("start.other.path", "payload").unwrap(),
            Message::new("start.other.semi.path", "payload").unwrap(),
        ])
        .await;

    assert_eq!(recorder.routes(), vec!["start.route.path", "start.other.path"]);
}

#[tokio::test]
async fn topic_with_several_wildcards() {
    let exchange = Exchange::new(ExchangeMode::Topic);
    let recorder = Recorder::default();
    exchange.subscribe("*.orders.*", recorder.handler()).unwrap();

    exchange.publish(Message::new("eu.orders.created", 1).unwrap()).await;
    exchange.publish(Message::new("us.orders.shipped", 2).unwrap()).await;
    exchange.publish(Message::new("eu.refunds.created", 3).unwrap()).await;

    assert_eq!(recorder.routes(), vec!["eu.orders.created", "us.orders.shipped"]);
}

#[tokio::test]
async fn failing_handler_is_reported_once_and_isolated() {
    let (exchange, sink) = exchange_with_sink(ExchangeMode::Direct);
    let calls = Arc::new(AtomicUsize::new(0));
    let recorder = Recorder::default();

    exchange.subscribe("route", failing(&calls)).unwrap();
    exchange.subscribe("route", recorder.handler()).unwrap();

    exchange.publish(Message::new("route", "payload").unwrap()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.count(), 1);
    assert_eq!(sink.len(), 1);

    let failure = &sink.errors()[0];
    assert_eq!(failure.route, "route");
    assert_eq!(failure.reason, "custom error");
}

#[tokio::test]
async fn failing_handler_does_not_stop_later_messages() {
    let (exchange, sink) = exchange_with_sink(ExchangeMode::Fanout);
    let calls = Arc::new(AtomicUsize::new(0));
    let recorder = Recorder::default();

    exchange.subscribe("any", failing(&calls)).unwrap();
    exchange.subscribe("any", recorder.handler()).unwrap();

    exchange
        .publish_all(vec![
            Message::new("first", 1).unwrap(),
            Message::new("second", 2).unwrap(),
        ])
        .await;

    assert_eq!(recorder.routes(), vec!["first", "second"]);
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn duplicate_queue_keeps_original_binding() {
    let exchange = Exchange::new(ExchangeMode::Direct);
    let original = Recorder::default();
    let intruder = Recorder::default();

    exchange.bind_queue("billing", "orders", original.handler()).unwrap();
    let result = exchange.bind(Binding::named("billing", "orders", intruder.handler()).unwrap());
    assert!(matches!(result, Err(ExchangeError::DuplicateQueue(_))));

    exchange.publish(Message::new("orders", 1).unwrap()).await;
    assert_eq!(original.count(), 1);
    assert_eq!(intruder.count(), 0);
}

#[tokio::test]
async fn unbind_stops_delivery() {
    let exchange = Exchange::new(ExchangeMode::Direct);
    let recorder = Recorder::default();
    exchange.bind_queue("billing", "orders", recorder.handler()).unwrap();

    exchange.publish(Message::new("orders", 1).unwrap()).await;
    assert!(exchange.unbind("billing"));
    exchange.publish(Message::new("orders", 2).unwrap()).await;

    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn published_message_is_never_redelivered() {
    let exchange = Exchange::new(ExchangeMode::Fanout);
    let recorder = Recorder::default();
    exchange.subscribe("any", recorder.handler()).unwrap();

    let first = Message::new("first", 1).unwrap();
    let first_id = first.id();
    exchange.publish(first).await;
    exchange.publish(Message::new("second", 2).unwrap()).await;

    let ids: Vec<_> = recorder.received.lock().iter().map(|e| e.id).collect();
    assert_eq!(ids.iter().filter(|id| **id == first_id).count(), 1);
    assert_eq!(ids.len(), 2);
    assert_eq!(exchange.pending_count(), 0);
}

#[tokio::test]
async fn reply_round_trip_through_exchange() {
    let exchange = Arc::new(Exchange::new(ExchangeMode::Direct));
    let replies = Recorder::default();
    exchange.subscribe("rpc.reply", replies.handler()).unwrap();

    let weak = Arc::downgrade(&exchange);
    exchange
        .subscribe("rpc.sum", move |envelope: Envelope| {
            let weak = weak.clone();
            async move {
                let request = Message::try_from(envelope)?;
                let sum: i64 = request
                    .payload()
                    .as_array()
                    .map(|values| values.iter().filter_map(|v| v.as_i64()).sum())
                    .unwrap_or_default();
                if let Some(exchange) = weak.upgrade() {
                    exchange.publish(request.reply(sum)?).await;
                }
                HandlerResult::Ok(())
            }
        })
        .unwrap();

    let request = Message::new("rpc.sum", json!([1, 2, 3]))
        .unwrap()
        .with_reply_to("rpc.reply");
    let request_id = request.id().to_string();
    exchange.publish(request).await;

    let received = replies.received.lock().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload, json!(6));
    assert_eq!(received[0].correlation_id.as_deref(), Some(request_id.as_str()));
}
