//! Action：Decider 的单步决策
//!
//! Action::parse 从不失败：非法 JSON、未知 type、缺少必要字段都转为 Action::Error，
//! 编排器因此只需处理四种动作。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ToolUse {
        tool_name: String,
        parameters: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    Clarify {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    Error {
        message: String,
    },
}

/// 决策的原始形状（字段全部可选，逐项校验）
#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    kind: Option<String>,
    tool_name: Option<String>,
    parameters: Option<Value>,
    message: Option<String>,
    reasoning: Option<String>,
}

impl Action {
    pub fn error(message: impl Into<String>) -> Self {
        Action::Error {
            message: message.into(),
        }
    }

    /// 动作类型名（日志与事件使用）
    pub fn kind(&self) -> &'static str {
        match self {
            Action::ToolUse { .. } => "tool_use",
            Action::Complete { .. } => "complete",
            Action::Clarify { .. } => "clarify",
            Action::Error { .. } => "error",
        }
    }

    /// 解析 Decider 输出
    pub fn parse(raw: &str) -> Self {
        let json_str = extract_json(raw);
        let value: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Action::error(format!("invalid decision JSON: {}", e)),
        };

        let value = match value {
            Value::Array(mut items) => {
                if items.is_empty() {
                    return Action::error("decision was an empty array");
                }
                tracing::warn!(
                    count = items.len(),
                    "decider returned an array, using the first element"
                );
                items.swap_remove(0)
            }
            other => other,
        };

        let raw: RawAction = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => return Action::error(format!("invalid decision shape: {}", e)),
        };
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawAction) -> Self {
        let Some(kind) = raw.kind.map(|k| k.trim().to_lowercase()) else {
            return Action::error("decision is missing the \"type\" field");
        };
        let reasoning = raw.reasoning.filter(|r| !r.trim().is_empty());

        match kind.as_str() {
            "tool_use" => {
                let Some(tool_name) = raw.tool_name.filter(|n| !n.trim().is_empty()) else {
                    return Action::error("tool_use decision without tool_name");
                };
                let parameters = match raw.parameters {
                    None | Some(Value::Null) => Value::Object(Map::new()),
                    Some(obj @ Value::Object(_)) => obj,
                    Some(other) => {
                        return Action::error(format!(
                            "parameters for {} must be an object, got {}",
                            tool_name, other
                        ))
                    }
                };
                Action::ToolUse {
                    tool_name: tool_name.trim().to_string(),
                    parameters,
                    reasoning,
                }
            }
            "complete" => Action::Complete {
                message: raw.message,
                reasoning,
            },
            "clarify" => Action::Clarify {
                message: raw
                    .message
                    .unwrap_or_else(|| "decider requested clarification".to_string()),
                reasoning,
            },
            "error" => Action::Error {
                message: raw
                    .message
                    .unwrap_or_else(|| "decider reported an error".to_string()),
            },
            other => Action::error(format!("unknown action type: {}", other)),
        }
    }
}

/// 从 LLM 输出中取出 JSON 文本
///
/// 依次尝试：整段输出、``` 代码块内容（语言标记不区分大小写，取最后一个 ``` 作结尾）、
/// 首个 { / [ 到对应的最后一个 } / ]。返回第一个能解析的候选；都不行时返回最像 JSON 的那段。
pub(crate) fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    if is_json(trimmed) {
        return trimmed;
    }

    let fenced = fenced_body(trimmed);
    if let Some(body) = fenced.filter(|b| is_json(b)) {
        return body;
    }

    let spanned = bracket_span(trimmed);
    if let Some(span) = spanned.filter(|s| is_json(s)) {
        return span;
    }
    fenced.or(spanned).unwrap_or(trimmed)
}

fn is_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}

fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    let tag_len = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .count();
    let rest = if rest[..tag_len].eq_ignore_ascii_case("json") {
        &rest[tag_len..]
    } else {
        rest
    };
    let body = rest.rfind("```").map(|end| &rest[..end]).unwrap_or(rest);
    Some(body.trim())
}

fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    match text.rfind(close) {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => None,
    }
}
