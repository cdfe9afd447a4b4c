//! Taskforge - 校验驱动的任务执行智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 执行循环、运行上下文、熔断与报告、组件构建器
//! - **decider**: 任务规划与单步动作选择（Action 解析）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / 脚本回放）
//! - **memory**: 对话轨迹
//! - **observability**: tracing 初始化
//! - **task**: Task / TaskPlan、文件系统校验与状态更新
//! - **tools**: 工具注册表、执行器与内置文件 / 搜索 / Shell 工具

pub mod config;
pub mod core;
pub mod decider;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod task;
pub mod tools;

pub use crate::core::{AgentBuilder, LoopSettings, Orchestrator, RunReport, StopReason};
