//! 核心编排层：错误类型、运行上下文、执行循环、报告与构建器

pub mod builder;
pub mod context;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod report;

pub use builder::AgentBuilder;
pub use context::AgentContext;
pub use error::AgentError;
pub use events::LoopEvent;
pub use orchestrator::{LoopSettings, Orchestrator};
pub use report::{RunReport, StopReason};
