//! Agent 错误类型
//!
//! 仅用于可失败的外围操作（LLM 调用、JSON 解析、文件 I/O）。
//! 执行循环内部把所有错误就地收敛为 Task 状态与 AgentContext.errors，不会向调用方抛出。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Invalid task plan: {0}")]
    InvalidPlan(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

