//! 运行报告：终止时汇总计划状态、已校验文件与错误

use std::fmt;

use serde::{Serialize, Serializer};

use crate::task::TaskPlan;
use crate::tools::ToolResult;

/// 循环终止原因（先触发者生效）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 没有可执行的任务：全部完成或重试用尽
    PlanExhausted,
    IterationLimit,
    CircuitBreaker,
    Clarification,
    DeciderError,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::PlanExhausted => "plan_exhausted",
            StopReason::IterationLimit => "iteration_limit",
            StopReason::CircuitBreaker => "circuit_breaker",
            StopReason::Clarification => "clarification",
            StopReason::DeciderError => "decider_error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub success: bool,
    pub response: String,
    pub iterations: usize,
    pub stop_reason: StopReason,
    #[serde(serialize_with = "serialize_plan")]
    pub task_plan: TaskPlan,
    pub files_created: Vec<String>,
    pub errors: Vec<String>,
    pub tool_results: Vec<ToolResult>,
}

fn serialize_plan<S: Serializer>(plan: &TaskPlan, serializer: S) -> Result<S::Ok, S::Error> {
    plan.to_value().serialize(serializer)
}

impl RunReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!("{{\"success\": false, \"errors\": [\"report serialization failed: {}\"]}}", e)
        })
    }
}

/// 确定性的结果摘要文本
pub fn summarize(plan: &TaskPlan, stop_reason: StopReason, success: bool) -> String {
    let p = plan.progress();
    let mut text = if success {
        format!("All {} tasks completed and verified.", p.total)
    } else {
        format!(
            "Run stopped ({}): {}/{} tasks verified, {} failed, {} skipped.",
            stop_reason, p.done, p.total, p.failed, p.skipped
        )
    };

    let files = plan.files_created();
    if files.is_empty() {
        text.push_str(" No files verified.");
    } else {
        text.push_str(&format!(" Files created: {}.", files.join(", ")));
    }
    text
}
