//! 任务模型：Task / TaskPlan、文件系统校验与状态更新器

pub mod plan;
pub mod state;
pub mod updater;
pub mod verify;

pub use plan::{PlannedTask, Progress, TaskPlan};
pub use state::{Task, TaskStatus, DEFAULT_MAX_RETRIES};
pub use updater::{apply_completion_claim, apply_tool_result, FailureKind, UpdateOutcome};
