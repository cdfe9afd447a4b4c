//! AgentContext：一次运行的可变状态
//!
//! 对话轨迹、任务计划、工具结果、错误列表与两项预算（迭代次数、连续失败次数）。

use crate::core::LoopSettings;
use crate::memory::ConversationLog;
use crate::task::TaskPlan;
use crate::tools::ToolResult;

#[derive(Debug, Clone)]
pub struct AgentContext {
    pub conversation: ConversationLog,
    pub plan: TaskPlan,
    pub current_task: Option<u32>,
    pub tool_results: Vec<ToolResult>,
    pub errors: Vec<String>,
    /// 任何一次校验通过的成功都会清零
    pub consecutive_errors: usize,
    pub max_consecutive_errors: usize,
    /// 单调递增，不超过 max_iterations
    pub iteration: usize,
    pub max_iterations: usize,
}

impl AgentContext {
    pub fn new(plan: TaskPlan, settings: &LoopSettings) -> Self {
        Self {
            conversation: ConversationLog::new(),
            plan,
            current_task: None,
            tool_results: Vec::new(),
            errors: Vec::new(),
            consecutive_errors: 0,
            max_consecutive_errors: settings.max_consecutive_errors.max(1),
            iteration: 0,
            max_iterations: settings.max_iterations,
        }
    }

    pub fn iterations_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    /// 进入下一轮，返回新的迭代序号（从 1 开始）
    pub fn advance(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// 记录一次失败；返回是否触发熔断
    pub fn record_failure(&mut self, error: impl Into<String>) -> bool {
        self.errors.push(error.into());
        self.consecutive_errors += 1;
        self.consecutive_errors >= self.max_consecutive_errors
    }
}
