//! 脚本化 LLM 客户端（用于测试与离线回放，无需 API）
//!
//! 按顺序返回预置回复；每次调用收到的消息都会记录下来，便于断言 prompt 内容。

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 脚本客户端：回复用完后返回 LlmError::Exhausted
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 从 JSON 文件加载回放脚本：字符串数组，或任意 JSON 值数组（非字符串按紧凑 JSON 文本返回）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let values: Vec<serde_json::Value> = serde_json::from_str(&raw)
            .map_err(|e| AgentError::JsonParseError(format!("replay script: {}", e)))?;
        Ok(Self::new(values.into_iter().map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })))
    }

    /// 追加一条错误回复（模拟传输失败）
    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// 已发生的调用（每次调用的完整消息列表）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        self.responses
            .lock()
            .map_err(|_| LlmError::Request("script lock poisoned".to_string()))?
            .pop_front()
            .unwrap_or(Err(LlmError::Exhausted))
    }
}
