//! 任务状态更新器：把 ToolResult 转换为经过文件系统校验的 Task 状态
//!
//! 工具的 success 只是必要条件；是否 Done 由磁盘上的文件决定。

use std::path::Path;

use crate::task::verify::claimed_paths;
use crate::task::Task;
use crate::tools::ToolResult;

/// 失败类别：工具本身失败，还是工具成功但产出未通过校验
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Tool,
    Verification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Done,
    Failed { kind: FailureKind, reason: String },
}

impl UpdateOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, UpdateOutcome::Done)
    }

    fn verification(reason: String) -> Self {
        UpdateOutcome::Failed {
            kind: FailureKind::Verification,
            reason,
        }
    }
}

/// 根据工具结果更新任务：
/// 1. 工具失败 → Failed
/// 2. 记录工具声称写入的路径
/// 3. 有预期文件：全部通过 → Done；部分 → "N/M files verified"；全无 → "no expected files found on filesystem"
/// 4. 无预期文件：复核声称的文件，全部存在或未声称任何文件 → Done
pub fn apply_tool_result(
    task: &mut Task,
    tool_name: &str,
    result: &ToolResult,
    root: &Path,
    iteration: usize,
) -> UpdateOutcome {
    task.tool_used = Some(tool_name.to_string());

    if !result.success {
        let reason = result.error_message();
        task.mark_failed(reason.clone());
        return UpdateOutcome::Failed {
            kind: FailureKind::Tool,
            reason,
        };
    }

    task.files_created = claimed_paths(result.data.as_ref());
    let checks = task.verify_files_exist(root);

    if !task.files_expected.is_empty() {
        let total = checks.len();
        let verified = checks.values().filter(|ok| **ok).count();
        return if verified == total {
            task.mark_done(iteration);
            UpdateOutcome::Done
        } else if verified == 0 {
            let reason = "no expected files found on filesystem".to_string();
            task.mark_failed(reason.clone());
            UpdateOutcome::verification(reason)
        } else {
            let reason = format!("{}/{} files verified", verified, total);
            task.mark_failed(reason.clone());
            UpdateOutcome::verification(reason)
        };
    }

    confirm_claimed(task, root, iteration)
}

/// Complete 动作：有预期文件时走 verify_completion；否则复核此前工具声称写入的文件（未声称则视为通过）
pub fn apply_completion_claim(task: &mut Task, root: &Path, iteration: usize) -> UpdateOutcome {
    if task.files_expected.is_empty() {
        return confirm_claimed(task, root, iteration);
    }
    if task.verify_completion(root) {
        task.mark_done(iteration);
        UpdateOutcome::Done
    } else {
        let reason = task
            .error
            .clone()
            .unwrap_or_else(|| "completion claimed but expected files are missing".to_string());
        task.mark_failed(reason.clone());
        UpdateOutcome::verification(reason)
    }
}

fn confirm_claimed(task: &mut Task, root: &Path, iteration: usize) -> UpdateOutcome {
    let (verified, claimed) = task.verify_claimed_files(root);
    if verified == claimed {
        task.mark_done(iteration);
        UpdateOutcome::Done
    } else {
        let reason = format!(
            "tool claimed files but only {}/{} verified",
            verified, claimed
        );
        task.mark_failed(reason.clone());
        UpdateOutcome::verification(reason)
    }
}
