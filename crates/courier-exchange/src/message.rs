use crate::{ExchangeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 消息对外投影
///
/// 处理器收到的就是这个结构，字段与 [`Message`] 一一对应。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// 消息唯一ID
    pub id: Uuid,
    /// 路由键
    pub route: String,
    /// 创建时间
    pub occurred_at: DateTime<Utc>,
    /// 关联ID（请求/响应配对）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// 回复路由
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// 消息负载，交换机不解析
    pub payload: serde_json::Value,
}

/// 不可变消息
///
/// 构造后所有字段只读；路由键必须非空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Envelope", into = "Envelope")]
pub struct Message {
    id: Uuid,
    route: String,
    occurred_at: DateTime<Utc>,
    correlation_id: Option<String>,
    reply_to: Option<String>,
    payload: serde_json::Value,
}

impl Message {
    /// 创建新消息，分配 ID 与时间戳
    pub fn new(route: impl Into<String>, payload: impl Into<serde_json::Value>) -> Result<Self> {
        let route = route.into();
        ensure_route(&route)?;

        Ok(Self {
            id: Uuid::new_v4(),
            route,
            occurred_at: Utc::now(),
            correlation_id: None,
            reply_to: None,
            payload: payload.into(),
        })
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// 创建回复消息
    ///
    /// 路由为本消息的 `reply_to`，关联ID沿用本消息的关联ID，没有时使用本消息ID。
    pub fn reply(&self, payload: impl Into<serde_json::Value>) -> Result<Message> {
        let reply_to = self.reply_to.as_deref().ok_or_else(|| {
            ExchangeError::InvalidMessage(format!("message {} has no reply_to route", self.id))
        })?;

        let correlation_id = self
            .correlation_id
            .clone()
            .unwrap_or_else(|| self.id.to_string());

        Ok(Message::new(reply_to, payload)?.with_correlation_id(correlation_id))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// 生成投递给处理器的投影
    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            id: self.id,
            route: self.route.clone(),
            occurred_at: self.occurred_at,
            correlation_id: self.correlation_id.clone(),
            reply_to: self.reply_to.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl TryFrom<Envelope> for Message {
    type Error = ExchangeError;

    fn try_from(envelope: Envelope) -> Result<Self> {
        ensure_route(&envelope.route)?;
        Ok(Self {
            id: envelope.id,
            route: envelope.route,
            occurred_at: envelope.occurred_at,
            correlation_id: envelope.correlation_id,
            reply_to: envelope.reply_to,
            payload: envelope.payload,
        })
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Envelope {
            id: message.id,
            route: message.route,
            occurred_at: message.occurred_at,
            correlation_id: message.correlation_id,
            reply_to: message.reply_to,
            payload: message.payload,
        }
    }
}

fn ensure_route(route: &str) -> Result<()> {
    if route.is_empty() {
        return Err(ExchangeError::InvalidMessage(
            "route should be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("orders.created", json!({"order": 42})).unwrap();
        assert_eq!(msg.route(), "orders.created");
        assert_eq!(msg.payload()["order"], 42);
        assert!(msg.correlation_id().is_none());
        assert!(msg.reply_to().is_none());
    }

    #[test]
    fn test_empty_route_rejected() {
        let result = Message::new("", "payload");
        assert!(matches!(result, Err(ExchangeError::InvalidMessage(_))));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Message::new("route", "payload").unwrap();
        let b = Message::new("route", "payload").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_envelope_projection() {
        let msg = Message::new("route", "payload")
            .unwrap()
            .with_correlation_id("corr-1")
            .with_reply_to("replies");
        let envelope = msg.to_envelope();

        assert_eq!(envelope.id, msg.id());
        assert_eq!(envelope.route, "route");
        assert_eq!(envelope.occurred_at, msg.occurred_at());
        assert_eq!(envelope.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(envelope.reply_to.as_deref(), Some("replies"));
        assert_eq!(envelope.payload, json!("payload"));
    }

    #[test]
    fn test_reply_uses_reply_to_and_correlation() {
        let request = Message::new("rpc.sum", json!([1, 2])).unwrap().with_reply_to("rpc.reply");
        let reply = request.reply(json!(3)).unwrap();

        assert_eq!(reply.route(), "rpc.reply");
        assert_eq!(reply.correlation_id(), Some(request.id().to_string().as_str()));

        let correlated = request.clone().with_correlation_id("abc");
        assert_eq!(correlated.reply(json!(3)).unwrap().correlation_id(), Some("abc"));

        let no_reply = Message::new("rpc.sum", json!([])).unwrap();
        assert!(no_reply.reply(json!(0)).is_err());
    }

    #[test]
    fn test_deserialization_revalidates_route() {
        let msg = Message::new("route", "payload").unwrap();
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);

        let bad = json.replace("\"route\":\"route\"", "\"route\":\"\"");
        assert!(serde_json::from_str::<Message>(&bad).is_err());
    }
}
