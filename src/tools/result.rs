//! 工具执行结果信封
//!
//! 所有工具调用（含未找到工具、参数校验失败、超时、panic）都返回 ToolResult，
//! 编排器只需处理 success=false 这一条失败通道。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 统一结果：{success, data, error, metadata, execution_time_ms}
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 记录工具名与耗时；工具自己测得的耗时优先保留
    pub fn stamp(&mut self, tool_name: &str, elapsed_ms: f64) {
        self.metadata
            .insert("tool_name".to_string(), Value::String(tool_name.to_string()));
        if self.execution_time_ms.is_none() {
            self.execution_time_ms = Some(elapsed_ms);
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.metadata.get("tool_name").and_then(|v| v.as_str())
    }

    /// 失败原因；success=false 但工具未给出 error 时返回通用描述
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "tool reported failure without an error message".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_keeps_tool_reported_time() {
        let mut result = ToolResult::ok(serde_json::json!({}));
        result.execution_time_ms = Some(5.0);
        result.stamp("write_file", 12.5);
        assert_eq!(result.execution_time_ms, Some(5.0));
        assert_eq!(result.tool_name(), Some("write_file"));
    }

    #[test]
    fn test_failure_serializes_without_data() {
        let result = ToolResult::failure("boom");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }
}
