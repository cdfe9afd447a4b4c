//! Decider：任务规划与单步动作选择

pub mod action;
pub mod llm;
pub mod planning;

pub use action::Action;
pub use llm::{
    DecisionInput, Decider, LlmDecider, DEFAULT_DECISION_PROMPT, DEFAULT_PLANNING_PROMPT,
};
pub use planning::parse_task_breakdown;
