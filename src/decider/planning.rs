//! 规划输出解析
//!
//! 接受三种形状：任务对象数组、纯字符串数组、或 {"tasks": [...]}；可带 ```json 代码块（不区分大小写）。

use serde_json::Value;

use crate::core::AgentError;
use crate::decider::action::extract_json;
use crate::task::PlannedTask;

pub fn parse_task_breakdown(raw: &str) -> Result<Vec<PlannedTask>, AgentError> {
    let json_str = extract_json(raw);
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("task breakdown: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tasks") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AgentError::InvalidPlan(
                    "expected an array of tasks or an object with a \"tasks\" array".to_string(),
                ))
            }
        },
        other => {
            return Err(AgentError::InvalidPlan(format!(
                "expected an array of tasks, got {}",
                other
            )))
        }
    };

    let mut tasks = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let mut task = match item {
            Value::String(text) => {
                let text = text.trim().to_string();
                PlannedTask::new(format!("Task {}", idx + 1), text)
            }
            obj @ Value::Object(_) => serde_json::from_value::<PlannedTask>(obj)
                .map_err(|e| AgentError::InvalidPlan(format!("task {}: {}", idx + 1, e)))?,
            other => {
                return Err(AgentError::InvalidPlan(format!(
                    "task {} must be an object or string, got {}",
                    idx + 1,
                    other
                )))
            }
        };
        if task.name.trim().is_empty() && task.description.trim().is_empty() {
            return Err(AgentError::InvalidPlan(format!("task {} is empty", idx + 1)));
        }
        if task.name.trim().is_empty() {
            task.name = format!("Task {}", idx + 1);
        }
        tasks.push(task);
    }

    if tasks.is_empty() {
        return Err(AgentError::InvalidPlan("plan contains no tasks".to_string()));
    }
    Ok(tasks)
}
