//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / 脚本回放）实现 LlmClient::complete（非流式）。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("empty response from model")]
    EmptyResponse,

    /// 脚本客户端的预置回复已用完
    #[error("scripted responses exhausted")]
    Exhausted,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}
