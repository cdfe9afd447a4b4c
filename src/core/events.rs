//! 执行循环事件：供 CLI / 调用方实时观察进度

use serde::Serialize;

use crate::core::StopReason;
use crate::task::{Progress, TaskStatus};

/// 单步循环事件（可序列化为 JSON 行）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 规划完成（fallback=true 表示规划失败后退化为单任务）
    Planned { task_count: usize, fallback: bool },
    /// 选中任务
    TaskSelected {
        task_id: u32,
        iteration: usize,
        retry_count: u32,
    },
    /// Decider 选择的动作类型
    ActionChosen { task_id: u32, action: String },
    /// 工具返回
    ToolFinished {
        tool: String,
        success: bool,
        duration_ms: Option<f64>,
    },
    /// 任务状态更新（含失败原因）
    TaskUpdated {
        task_id: u32,
        status: TaskStatus,
        error: Option<String>,
    },
    /// 连续失败熔断
    CircuitBreakerTripped { consecutive_errors: usize },
    /// 运行结束
    Finished {
        success: bool,
        stop_reason: StopReason,
        progress: Progress,
    },
}
