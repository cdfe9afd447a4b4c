//! Task：单个工作单元及其校验逻辑
//!
//! 状态机：Pending → InProgress → Done | Failed；Failed 在重试预算内可被重新选中；
//! 提前终止时从未开始的任务记为 Skipped。Done 只能由最近一次通过的文件校验得出。

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::task::verify::{file_has_content, resolve};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// 日志中使用的状态标记
    pub fn marker(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "[ ]",
            TaskStatus::InProgress => "[~]",
            TaskStatus::Done => "[x]",
            TaskStatus::Failed => "[!]",
            TaskStatus::Skipped => "[-]",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    /// 任务必须产出的文件（有序、去重）
    #[serde(default)]
    pub files_expected: Vec<String>,
    /// 工具声称写入的文件（不可信）
    #[serde(default)]
    pub files_created: Vec<String>,
    /// 已在磁盘上确认存在且非空的文件
    #[serde(default)]
    pub files_verified: Vec<String>,
    #[serde(default)]
    pub tool_used: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub iteration_started: Option<usize>,
    #[serde(default)]
    pub iteration_completed: Option<usize>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Task {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        description: impl Into<String>,
        files_expected: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut expected: Vec<String> = Vec::new();
        for path in files_expected {
            let path = path.trim().to_string();
            if !path.is_empty() && !expected.contains(&path) {
                expected.push(path);
            }
        }
        Self {
            id,
            name: name.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            files_expected: expected,
            files_created: Vec::new(),
            files_verified: Vec::new(),
            tool_used: None,
            error: None,
            iteration_started: None,
            iteration_completed: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 检查 files_expected 中每个路径是否存在且非空；通过的路径记入 files_verified，未通过的移出
    pub fn verify_files_exist(&mut self, root: &Path) -> BTreeMap<String, bool> {
        let results: BTreeMap<String, bool> = self
            .files_expected
            .iter()
            .map(|p| (p.clone(), file_has_content(&resolve(root, p))))
            .collect();
        for (path, ok) in &results {
            self.record_check(path, *ok);
        }
        results
    }

    /// 复核工具声称写入的文件，返回 (已确认数, 声称数)
    pub fn verify_claimed_files(&mut self, root: &Path) -> (usize, usize) {
        let claimed = self.files_created.clone();
        let verified = claimed
            .iter()
            .filter(|p| {
                let ok = file_has_content(&resolve(root, p));
                self.record_check(p, ok);
                ok
            })
            .count();
        (verified, claimed.len())
    }

    fn record_check(&mut self, path: &str, ok: bool) {
        let known = self.files_verified.iter().position(|v| v == path);
        match (ok, known) {
            (true, None) => self.files_verified.push(path.to_string()),
            (false, Some(idx)) => {
                self.files_verified.remove(idx);
            }
            _ => {}
        }
    }

    /// 无预期文件时信任 status == Done；否则要求全部预期文件通过校验，失败时把缺失列表写入 error
    pub fn verify_completion(&mut self, root: &Path) -> bool {
        if self.files_expected.is_empty() {
            return self.status == TaskStatus::Done;
        }
        let missing: Vec<String> = self
            .verify_files_exist(root)
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(path, _)| path)
            .collect();
        if missing.is_empty() {
            true
        } else {
            self.error = Some(format!("Missing files: {}", missing.join(", ")));
            false
        }
    }

    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// Pending 或仍可重试的 Failed
    pub fn is_actionable(&self) -> bool {
        self.status == TaskStatus::Pending || self.can_retry()
    }

    /// 开始（或重新开始）执行：首次开始时记录 iteration_started
    pub fn start(&mut self, iteration: usize) {
        self.status = TaskStatus::InProgress;
        if self.iteration_started.is_none() {
            self.iteration_started = Some(iteration);
        }
    }

    pub(crate) fn mark_done(&mut self, iteration: usize) {
        self.status = TaskStatus::Done;
        self.error = None;
        self.iteration_completed = Some(iteration);
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
    }

    pub(crate) fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Skipped;
        self.error = Some(reason.into());
    }
}
