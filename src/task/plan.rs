//! TaskPlan：一次运行的有序任务集合与聚合查询
//!
//! next_task 是唯一的重试准入点（选中 Failed 任务时 retry_count += 1）；
//! is_complete / verify_all_tasks 每次都重新查磁盘，不缓存结果。

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::task::{Task, TaskStatus};

/// 规划阶段产出的任务描述（尚未分配 id）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files_expected: Vec<String>,
}

impl PlannedTask {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            files_expected: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files_expected = files.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// 各状态计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub tasks: Vec<Task>,
    pub user_request: String,
    pub created_at: DateTime<Utc>,
    pub project_dir: PathBuf,
}

/// 序列化视图：计划本身加上派生的进度字段
#[derive(Serialize)]
struct PlanSnapshot<'a> {
    #[serde(flatten)]
    plan: &'a TaskPlan,
    progress: Progress,
    completion_percentage: f64,
    files_created: Vec<String>,
}

impl TaskPlan {
    pub fn new(
        user_request: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        tasks: Vec<Task>,
    ) -> Self {
        Self {
            tasks,
            user_request: user_request.into(),
            created_at: Utc::now(),
            project_dir: project_dir.into(),
        }
    }

    /// 由规划结果构建：id 从 1 起按顺序分配
    pub fn from_planned(
        user_request: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        planned: Vec<PlannedTask>,
        max_retries: u32,
    ) -> Self {
        let tasks = planned
            .into_iter()
            .zip(1u32..)
            .map(|(p, id)| {
                let description = if p.description.trim().is_empty() {
                    p.name.clone()
                } else {
                    p.description
                };
                Task::new(id, p.name, description, p.files_expected).with_max_retries(max_retries)
            })
            .collect();
        Self::new(user_request, project_dir, tasks)
    }

    /// 规划失败时的兜底：单个任务包裹原始请求
    pub fn fallback(
        user_request: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        max_retries: u32,
    ) -> Self {
        let user_request = user_request.into();
        let task = Task::new(1, "Complete request", user_request.clone(), Vec::new())
            .with_max_retries(max_retries);
        Self::new(user_request, project_dir, vec![task])
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn task(&self, id: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: u32) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// 按计划顺序取第一个 Pending，或第一个仍可重试的 Failed（其 retry_count += 1）
    pub fn next_task(&mut self) -> Option<&mut Task> {
        let task = self.tasks.iter_mut().find(|t| t.is_actionable())?;
        if task.status == TaskStatus::Failed {
            task.retry_count += 1;
        }
        Some(task)
    }

    /// 是否还有可执行的任务（不触发重试计数）
    pub fn has_actionable(&self) -> bool {
        self.tasks.iter().any(Task::is_actionable)
    }

    /// 所有任务为 Done 且此刻重新校验通过；空计划视为完成（与 completion_percentage 的 100 一致）
    pub fn is_complete(&mut self) -> bool {
        let root = self.project_dir.clone();
        self.tasks
            .iter_mut()
            .all(|t| t.status == TaskStatus::Done && t.verify_completion(&root))
    }

    /// 最终复核：Done 任务重新校验，未通过者降级为 Failed（不再重试）
    ///
    /// 返回每个任务此刻是否“已校验完成”；非 Done 任务为 false，因此连续调用结果一致。
    pub fn verify_all_tasks(&mut self) -> BTreeMap<u32, bool> {
        let root = self.project_dir.clone();
        let mut results = BTreeMap::new();
        for task in &mut self.tasks {
            let ok = task.status == TaskStatus::Done && task.verify_completion(&root);
            if task.status == TaskStatus::Done && !ok {
                tracing::warn!(
                    task_id = task.id,
                    error = task.error.as_deref().unwrap_or(""),
                    "task failed final re-verification, demoted to failed"
                );
                task.status = TaskStatus::Failed;
            }
            results.insert(task.id, ok);
        }
        results
    }

    pub fn progress(&self) -> Progress {
        let mut p = Progress {
            total: self.tasks.len(),
            ..Progress::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => p.pending += 1,
                TaskStatus::InProgress => p.in_progress += 1,
                TaskStatus::Done => p.done += 1,
                TaskStatus::Failed => p.failed += 1,
                TaskStatus::Skipped => p.skipped += 1,
            }
        }
        p
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.tasks.is_empty() {
            return 100.0;
        }
        self.progress().done as f64 / self.tasks.len() as f64 * 100.0
    }

    /// 所有任务已校验的文件（按任务顺序、去重）
    pub fn files_created(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for path in self.tasks.iter().flat_map(|t| t.files_verified.iter()) {
            if !files.contains(path) {
                files.push(path.clone());
            }
        }
        files
    }

    /// 从未开始的 Pending 任务标为 Skipped（提前终止时调用）
    pub fn skip_untouched(&mut self, reason: &str) -> usize {
        let mut skipped = 0;
        for task in &mut self.tasks {
            if task.status == TaskStatus::Pending && task.iteration_started.is_none() {
                task.mark_skipped(reason);
                skipped += 1;
            }
        }
        skipped
    }

    /// 带派生字段（progress、completion_percentage、files_created）的 JSON
    pub fn to_value(&self) -> serde_json::Value {
        let snapshot = PlanSnapshot {
            plan: self,
            progress: self.progress(),
            completion_percentage: self.completion_percentage(),
            files_created: self.files_created(),
        };
        serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null)
    }

    pub fn to_json(&self) -> Result<String, AgentError> {
        serde_json::to_string_pretty(&self.to_value())
            .map_err(|e| AgentError::JsonParseError(e.to_string()))
    }

    /// 派生字段在反序列化时忽略
    pub fn from_json(raw: &str) -> Result<Self, AgentError> {
        serde_json::from_str(raw).map_err(|e| AgentError::JsonParseError(e.to_string()))
    }
}

impl fmt::Display for TaskPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.progress();
        writeln!(
            f,
            "Task plan: {}/{} done ({:.0}%), {} failed, {} skipped",
            p.done,
            p.total,
            self.completion_percentage(),
            p.failed,
            p.skipped
        )?;
        for task in &self.tasks {
            write!(f, "  {} {}. {}", task.status.marker(), task.id, task.name)?;
            if task.retry_count > 0 {
                write!(f, " (retry {}/{})", task.retry_count, task.max_retries)?;
            }
            if !task.files_verified.is_empty() {
                write!(f, " -> {}", task.files_verified.join(", "))?;
            }
            if let Some(err) = &task.error {
                write!(f, " [error: {}]", err)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plan(dir: &Path) -> TaskPlan {
        TaskPlan::from_planned(
            "build site",
            dir,
            vec![
                PlannedTask::new("index", "write index").with_files(&["index.html"]),
                PlannedTask::new("style", "").with_files(&["style.css"]),
            ],
            3,
        )
    }

    #[test]
    fn test_from_planned_assigns_ids_in_order() {
        let dir = TempDir::new().unwrap();
        let p = plan(dir.path());
        let ids: Vec<u32> = p.tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(p.tasks[1].description, "style");
    }

    #[test]
    fn test_next_task_retries_failed_in_place() {
        let dir = TempDir::new().unwrap();
        let mut p = plan(dir.path());
        p.tasks[0].status = TaskStatus::Done;
        p.tasks[1].status = TaskStatus::Failed;

        let next = p.next_task().unwrap();
        assert_eq!(next.id, 2);
        assert_eq!(next.retry_count, 1);
    }

    #[test]
    fn test_exhausted_task_is_never_selected_again() {
        let dir = TempDir::new().unwrap();
        let mut p = plan(dir.path());
        p.tasks[0].status = TaskStatus::Done;
        p.tasks[1].status = TaskStatus::Failed;
        p.tasks[1].retry_count = 3;
        assert!(p.next_task().is_none());
        assert_eq!(p.tasks[1].retry_count, 3);
    }

    #[test]
    fn test_verify_all_tasks_demotes_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html/>").unwrap();
        let mut p = plan(dir.path());
        for t in &mut p.tasks {
            t.status = TaskStatus::Done;
        }

        let first = p.verify_all_tasks();
        let second = p.verify_all_tasks();
        assert_eq!(first, second);
        assert_eq!(first.get(&1), Some(&true));
        assert_eq!(first.get(&2), Some(&false));
        assert_eq!(p.tasks[1].status, TaskStatus::Failed);
        assert!(!p.is_complete());
    }

    #[test]
    fn test_is_complete_rechecks_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "a").unwrap();
        std::fs::write(dir.path().join("style.css"), "b").unwrap();
        let mut p = plan(dir.path());
        for t in &mut p.tasks {
            t.status = TaskStatus::Done;
        }
        assert!(p.is_complete());
        std::fs::write(dir.path().join("style.css"), "").unwrap();
        assert!(!p.is_complete());
    }

    #[test]
    fn test_progress_and_percentage() {
        let dir = TempDir::new().unwrap();
        let mut p = plan(dir.path());
        p.tasks[0].status = TaskStatus::Done;
        let progress = p.progress();
        assert_eq!(progress.done, 1);
        assert_eq!(progress.pending, 1);
        assert_eq!(p.completion_percentage(), 50.0);

        let mut empty = TaskPlan::new("x", dir.path(), Vec::new());
        assert_eq!(empty.completion_percentage(), 100.0);
        assert_eq!(empty.progress().total, 0);
        assert!(empty.is_complete());
    }

    #[test]
    fn test_json_round_trip_ignores_derived_fields() {
        let dir = TempDir::new().unwrap();
        let mut p = plan(dir.path());
        p.tasks[0].files_verified.push("index.html".to_string());
        let json = p.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["files_created"][0], "index.html");
        assert_eq!(value["progress"]["total"], 2);

        let restored = TaskPlan::from_json(&json).unwrap();
        assert_eq!(restored, p);
    }

    #[test]
    fn test_fallback_wraps_request() {
        let p = TaskPlan::fallback("do the thing", "/tmp", 2);
        assert_eq!(p.tasks.len(), 1);
        assert_eq!(p.tasks[0].description, "do the thing");
        assert_eq!(p.tasks[0].max_retries, 2);
    }

    #[test]
    fn test_skip_untouched_leaves_started_tasks() {
        let dir = TempDir::new().unwrap();
        let mut p = plan(dir.path());
        p.tasks[0].start(1);
        assert_eq!(p.skip_untouched("run halted"), 1);
        assert_eq!(p.tasks[0].status, TaskStatus::InProgress);
        assert_eq!(p.tasks[1].status, TaskStatus::Skipped);
    }
}
