//! Decider：给定上下文选择下一步 Action
//!
//! LlmDecider 把规划与单步决策都交给 LlmClient；LLM 的输出视为不可信输入，由 Action::parse 校验。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::decider::{parse_task_breakdown, Action};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::task::{PlannedTask, Task};
use crate::tools::ToolSpec;

pub const DEFAULT_PLANNING_PROMPT: &str = "You are a planning assistant. Break the user's request into a short ordered list of concrete tasks. \
Respond with ONLY a JSON array; each element is {\"name\": string, \"description\": string, \"files_expected\": [relative file paths the task must create]}. \
Use an empty files_expected list when a task produces no file.";

pub const DEFAULT_DECISION_PROMPT: &str = "You are an autonomous agent executing one task at a time inside a project directory. \
Choose exactly one next action for the current task. Only claim completion when the expected files have been written.";

const ACTION_FORMAT: &str = r#"{"type": "tool_use" | "complete" | "clarify" | "error", "tool_name": "<tool>", "parameters": {...}, "message": "<text>", "reasoning": "<why>"}"#;

/// 单步决策的输入
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub user_request: &'a str,
    pub task: &'a Task,
    /// 最近的对话历史（已按 history_window 截取）
    pub history: &'a [Message],
}

#[async_trait]
pub trait Decider: Send + Sync {
    /// 把用户请求拆分为有序任务
    async fn plan(&self, user_request: &str) -> Result<Vec<PlannedTask>, AgentError>;

    /// 为当前任务选择一个动作；Err 由编排器转为 Action::Error
    async fn decide(&self, input: &DecisionInput<'_>) -> Result<Action, AgentError>;
}

pub struct LlmDecider {
    llm: Arc<dyn LlmClient>,
    catalog: Vec<ToolSpec>,
    planning_prompt: String,
    decision_prompt: String,
}

impl LlmDecider {
    pub fn new(llm: Arc<dyn LlmClient>, catalog: Vec<ToolSpec>) -> Self {
        Self {
            llm,
            catalog,
            planning_prompt: DEFAULT_PLANNING_PROMPT.to_string(),
            decision_prompt: DEFAULT_DECISION_PROMPT.to_string(),
        }
    }

    pub fn with_planning_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.planning_prompt = prompt.into();
        self
    }

    pub fn with_decision_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.decision_prompt = prompt.into();
        self
    }

    /// 决策 system prompt：基础提示 + 工具目录 + 输出格式
    pub fn decision_system_prompt(&self) -> String {
        let tools = serde_json::to_string_pretty(&self.catalog).unwrap_or_else(|_| "[]".to_string());
        format!(
            "{}\n\n## Available tools\n```json\n{}\n```\n\n## Response format\nRespond with ONLY one JSON object:\n{}",
            self.decision_prompt, tools, ACTION_FORMAT
        )
    }

    fn describe_task(input: &DecisionInput<'_>) -> String {
        let task = input.task;
        let mut text = format!(
            "User request: {}\n\nCurrent task #{}: {}\n{}",
            input.user_request, task.id, task.name, task.description
        );
        if !task.files_expected.is_empty() {
            text.push_str(&format!(
                "\nExpected files: {}",
                task.files_expected.join(", ")
            ));
        }
        if task.retry_count > 0 {
            text.push_str(&format!(
                "\nAttempt {} of {}.",
                task.retry_count + 1,
                task.max_retries + 1
            ));
        }
        if let Some(err) = &task.error {
            text.push_str(&format!("\nPrevious error: {}", err));
        }
        text
    }
}

#[async_trait]
impl Decider for LlmDecider {
    async fn plan(&self, user_request: &str) -> Result<Vec<PlannedTask>, AgentError> {
        let messages = [
            Message::system(self.planning_prompt.clone()),
            Message::user(user_request.to_string()),
        ];
        let raw = self.llm.complete(&messages).await?;
        tracing::debug!(response = %raw, "planning response");
        parse_task_breakdown(&raw)
    }

    async fn decide(&self, input: &DecisionInput<'_>) -> Result<Action, AgentError> {
        let mut messages = Vec::with_capacity(input.history.len() + 2);
        messages.push(Message::system(self.decision_system_prompt()));
        messages.extend(input.history.iter().cloned());
        messages.push(Message::user(Self::describe_task(input)));

        let raw = self.llm.complete(&messages).await?;
        tracing::debug!(task_id = input.task.id, response = %raw, "decision response");
        Ok(Action::parse(&raw))
    }
}
