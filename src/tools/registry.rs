//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / 类型化 Input / execute），由 ToolRegistry 按名注册与查找。
//! Input 同时决定参数 JSON Schema（schemars 生成，供 LLM 理解）与参数校验（serde 反序列化），
//! 因此「声明的 schema」与「实际接受的参数」始终一致。

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::tools::ToolResult;

/// 工具 trait：名称、描述、参数类型、异步执行
///
/// Input 建议加 `#[serde(deny_unknown_fields)]`，这样 LLM 用错参数名时会在校验阶段失败，
/// 而不是被静默忽略。
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// 已校验的参数类型
    type Input: DeserializeOwned + JsonSchema + Send + 'static;

    /// 工具名称（Action 中的 "tool_name" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    async fn execute(&self, input: Self::Input) -> ToolResult;
}

/// 擦除 Input 类型后的工具，注册表内部按名存储
#[async_trait]
trait ErasedTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn call(&self, params: Value) -> ToolResult;
}

#[async_trait]
impl<T: Tool> ErasedTool for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> &str {
        Tool::description(self)
    }

    fn input_schema(&self) -> Value {
        let schema = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T::Input>();
        serde_json::to_value(schema).unwrap_or(Value::Null)
    }

    async fn call(&self, params: Value) -> ToolResult {
        // Decider 省略 parameters 时按空对象处理，交给 Input 判断必填字段
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        match serde_json::from_value::<T::Input>(params) {
            Ok(input) => self.execute(input).await,
            Err(e) => ToolResult::failure(format!(
                "invalid parameters for {}: {}",
                Tool::name(self),
                e
            ))
            .with_metadata("error_kind", "invalid_parameters"),
        }
    }
}

/// 工具目录条目：注入 Decider 的 system prompt
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具注册表：按名称存储，支持 register / contains / execute / catalog
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ErasedTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名注册会覆盖旧工具
    pub fn register(&mut self, tool: impl Tool) {
        let name = Tool::name(&tool).to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous entry replaced");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称排序的工具目录（名称、描述、参数 schema）
    pub fn catalog(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.input_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// 查找、校验并执行工具；任何失败（未知工具、参数错误、工具 panic）都转为 success=false
    pub async fn execute(&self, name: &str, params: Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::failure(format!("tool not found: {name}"))
                .with_metadata("tool_name", name)
                .with_metadata("error_kind", "unknown_tool");
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.call(params)).catch_unwind().await;
        let mut result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(tool = %name, reason = %reason, "tool panicked");
                ToolResult::failure(format!("tool {name} panicked: {reason}"))
                    .with_metadata("error_kind", "panic")
            }
        };
        result.stamp(name, start.elapsed().as_secs_f64() * 1000.0);
        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
