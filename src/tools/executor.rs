//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用 registry.execute，
//! 超时也转为 success=false 的 ToolResult；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::tools::{ToolRegistry, ToolResult, ToolSpec};

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// 执行指定工具；超时返回失败结果；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolResult {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let outcome = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                let mut result = ToolResult::failure(format!(
                    "tool '{}' timed out after {}s",
                    tool_name,
                    self.timeout.as_secs()
                ))
                .with_metadata("error_kind", "timeout");
                result.stamp(tool_name, start.elapsed().as_secs_f64() * 1000.0);
                result
            }
        };

        let outcome = match (result.success, result.metadata.get("error_kind")) {
            (true, _) => "ok",
            (false, Some(kind)) if kind == "timeout" => "timeout",
            _ => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.success,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.registry.catalog()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
