//! 路由匹配
//!
//! 三种交换机模式的匹配规则。topic 模式在绑定时编译成锚定的正则：
//! 所有 `.` 转义为字面点，所有 `*` 替换为一个非空、不含点的段。

use crate::{ExchangeError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `*` 的替换：一个或多个非点字符
const TOPIC_WILDCARD: &str = "[^.]+";

/// 交换机模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeMode {
    /// 路由键完全相等
    Direct,
    /// 以 `.` 分段、`*` 匹配单段
    Topic,
    /// 无条件投递给所有绑定
    Fanout,
}

impl Default for ExchangeMode {
    fn default() -> Self {
        ExchangeMode::Direct
    }
}

impl ExchangeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeMode::Direct => "direct",
            ExchangeMode::Topic => "topic",
            ExchangeMode::Fanout => "fanout",
        }
    }
}

impl fmt::Display for ExchangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeMode {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "direct" => Ok(ExchangeMode::Direct),
            "topic" => Ok(ExchangeMode::Topic),
            "fanout" => Ok(ExchangeMode::Fanout),
            other => Err(ExchangeError::InvalidExchangeMode(other.to_string())),
        }
    }
}

/// 绑定时编译好的匹配器
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    Fanout,
    Direct(String),
    Topic(Regex),
}

impl RouteMatcher {
    /// 按模式编译路由键
    pub fn compile(mode: ExchangeMode, pattern: &str) -> Result<Self> {
        match mode {
            ExchangeMode::Fanout => Ok(RouteMatcher::Fanout),
            ExchangeMode::Direct => Ok(RouteMatcher::Direct(pattern.to_string())),
            ExchangeMode::Topic => Regex::new(&topic_expression(pattern))
                .map(RouteMatcher::Topic)
                .map_err(|source| ExchangeError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                }),
        }
    }

    pub fn is_match(&self, route: &str) -> bool {
        match self {
            RouteMatcher::Fanout => true,
            RouteMatcher::Direct(key) => key == route,
            RouteMatcher::Topic(regex) => regex.is_match(route),
        }
    }
}

/// 将 topic 路由键转换为锚定的正则表达式
///
/// `start.*.path` => `^start\.[^.]+\.path$`
pub fn topic_expression(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(TOPIC_WILDCARD);
    format!("^{}$", body)
}

/// 判断消息路由是否匹配绑定的路由键
///
/// 无法编译的 topic 路由键视为不匹配。
pub fn matches(mode: ExchangeMode, route: &str, pattern: &str) -> bool {
    RouteMatcher::compile(mode, pattern)
        .map(|matcher| matcher.is_match(route))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("direct".parse::<ExchangeMode>().unwrap(), ExchangeMode::Direct);
        assert_eq!("topic".parse::<ExchangeMode>().unwrap(), ExchangeMode::Topic);
        assert_eq!("fanout".parse::<ExchangeMode>().unwrap(), ExchangeMode::Fanout);
        assert!(matches!(
            "Topic".parse::<ExchangeMode>(),
            Err(ExchangeError::InvalidExchangeMode(_))
        ));
        assert!("headers".parse::<ExchangeMode>().is_err());
        assert_eq!(ExchangeMode::default(), ExchangeMode::Direct);
    }

    #[test]
    fn test_mode_serde() {
        let json = serde_json::to_string(&ExchangeMode::Fanout).unwrap();
        assert_eq!(json, "\"fanout\"");
        assert_eq!(ExchangeMode::Topic.to_string(), "topic");
    }

    #[test]
    fn test_fanout_always_matches() {
        assert!(matches(ExchangeMode::Fanout, "any-route", "random1"));
        assert!(matches(ExchangeMode::Fanout, "a.b.c", "x"));
    }

    #[test]
    fn test_direct_exact_match() {
        assert!(matches(ExchangeMode::Direct, "test", "test"));
        assert!(!matches(ExchangeMode::Direct, "test", "other-route"));
        assert!(!matches(ExchangeMode::Direct, "Test", "test"));
        assert!(!matches(ExchangeMode::Direct, "testing", "test"));
        assert!(!matches(ExchangeMode::Direct, "a.b", "a.*"));
    }

    #[test]
    fn test_topic_expression_replaces_every_occurrence() {
        assert_eq!(topic_expression("start.*.path"), r"^start\.[^.]+\.path$");
        assert_eq!(topic_expression("*.*.*"), r"^[^.]+\.[^.]+\.[^.]+$");
        assert_eq!(topic_expression("a.b.c.d"), r"^a\.b\.c\.d$");
    }

    #[test]
    fn test_topic_segment_count_must_match() {
        let mode = ExchangeMode::Topic;
        assert!(!matches(mode, "start.route.path.extra.content", "start.route.path"));
        assert!(!matches(mode, "route.path", "start.route.path"));
        assert!(matches(mode, "start.route.path", "start.route.path"));
    }

    #[test]
    fn test_topic_wildcard() {
        let mode = ExchangeMode::Topic;
        assert!(matches(mode, "start.route.path", "start.*.path"));
        assert!(matches(mode, "start.other.path", "start.*.path"));
        assert!(!matches(mode, "start.other.semi.path", "start.*.path"));
        assert!(!matches(mode, "start..path", "start.*.path"));
        assert!(matches(mode, "a.b.c", "*.*.*"));
        assert!(!matches(mode, "a.b", "*.*.*"));
    }

    #[test]
    fn test_topic_dots_are_literal() {
        let mode = ExchangeMode::Topic;
        assert!(!matches(mode, "aXbXc", "a.b.c"));
        assert!(!matches(mode, "start-route.path", "start.route.path"));
        assert!(!matches(mode, "Start.route.path", "start.route.path"));
    }

    #[test]
    fn test_topic_escapes_regex_metacharacters() {
        let mode = ExchangeMode::Topic;
        assert!(matches(mode, "price.(usd)+", "price.(usd)+"));
        assert!(!matches(mode, "price.usdd", "price.(usd)+"));
    }

    #[test]
    fn test_compiled_matcher() {
        let matcher = RouteMatcher::compile(ExchangeMode::Topic, "orders.*").unwrap();
        assert!(matcher.is_match("orders.created"));
        assert!(!matcher.is_match("orders"));
        assert!(!matcher.is_match("orders.created.eu"));
    }
}
