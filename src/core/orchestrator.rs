//! 执行循环（编排器）
//!
//! Planning → Selecting → Deciding → Executing → Verifying → {Selecting | Completing | Halted}。
//! 所有失败都收敛到 Task 状态与 AgentContext.errors；run 总是返回 RunReport。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AgentSection;
use crate::core::report::summarize;
use crate::core::{AgentContext, LoopEvent, RunReport, StopReason};
use crate::decider::{Action, DecisionInput, Decider};
use crate::memory::Message;
use crate::task::{
    apply_completion_claim, apply_tool_result, FailureKind, Task, TaskPlan, UpdateOutcome,
};
use crate::tools::{ToolExecutor, ToolResult};

/// 观察结果写入对话时的最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 1000;

/// 单次运行的预算（来自 [agent] 配置，可被 CLI 覆盖）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_iterations: usize,
    pub max_consecutive_errors: usize,
    pub max_retries: u32,
    /// 传给 Decider 的最近历史条数
    pub history_window: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_consecutive_errors: 4,
            max_retries: 3,
            history_window: 3,
        }
    }
}

impl From<&AgentSection> for LoopSettings {
    fn from(section: &AgentSection) -> Self {
        Self {
            max_iterations: section.max_iterations,
            max_consecutive_errors: section.max_consecutive_errors,
            max_retries: section.max_retries,
            history_window: section.history_window,
        }
    }
}

pub struct Orchestrator {
    decider: Arc<dyn Decider>,
    executor: ToolExecutor,
    project_dir: PathBuf,
    settings: LoopSettings,
    events: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl Orchestrator {
    pub fn new(
        decider: Arc<dyn Decider>,
        executor: ToolExecutor,
        project_dir: impl Into<PathBuf>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            decider,
            executor,
            project_dir: project_dir.into(),
            settings,
            events: None,
        }
    }

    /// 订阅循环事件
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(tx) = &self.events {
            // 接收端已关闭时忽略
            let _ = tx.send(event);
        }
    }

    /// 执行一次完整运行；在 run span（带 run_id）内记录日志
    pub async fn run(&self, user_request: &str) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.run_inner(run_id, user_request).instrument(span).await
    }

    /// 规划；失败时退化为单个兜底任务，不中止运行
    async fn plan(&self, user_request: &str) -> (TaskPlan, bool) {
        match self.decider.plan(user_request).await {
            Ok(planned) if !planned.is_empty() => (
                TaskPlan::from_planned(
                    user_request,
                    &self.project_dir,
                    planned,
                    self.settings.max_retries,
                ),
                false,
            ),
            Ok(_) => {
                tracing::warn!("planner returned no tasks, using fallback task");
                (self.fallback_plan(user_request), true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "planning failed, using fallback task");
                (self.fallback_plan(user_request), true)
            }
        }
    }

    fn fallback_plan(&self, user_request: &str) -> TaskPlan {
        TaskPlan::fallback(user_request, &self.project_dir, self.settings.max_retries)
    }

    async fn run_inner(&self, run_id: Uuid, user_request: &str) -> RunReport {
        let (plan, fallback) = self.plan(user_request).await;
        tracing::info!(tasks = plan.tasks.len(), fallback, "planning finished\n{}", plan);
        self.emit(LoopEvent::Planned {
            task_count: plan.tasks.len(),
            fallback,
        });

        let mut ctx = AgentContext::new(plan, &self.settings);
        ctx.conversation.push(Message::user(user_request));

        let stop_reason = loop {
            if !ctx.plan.has_actionable() {
                break StopReason::PlanExhausted;
            }
            if ctx.iterations_exhausted() {
                tracing::warn!(iterations = ctx.iteration, "iteration limit reached");
                ctx.errors.push(format!(
                    "iteration limit reached ({} iterations)",
                    ctx.max_iterations
                ));
                break StopReason::IterationLimit;
            }

            // 选中 Failed 任务时在此处计入重试
            let Some(task) = ctx.plan.next_task() else {
                break StopReason::PlanExhausted;
            };
            let snapshot = task.clone();
            let iteration = ctx.advance();
            if let Some(task) = ctx.plan.task_mut(snapshot.id) {
                task.start(iteration);
            }
            ctx.current_task = Some(snapshot.id);
            tracing::info!(
                task_id = snapshot.id,
                iteration,
                retry = snapshot.retry_count,
                "task selected: {}",
                snapshot.name
            );
            self.emit(LoopEvent::TaskSelected {
                task_id: snapshot.id,
                iteration,
                retry_count: snapshot.retry_count,
            });

            let action = self.decide(user_request, &snapshot, &ctx).await;
            tracing::info!(task_id = snapshot.id, action = action.kind(), "action chosen");
            self.emit(LoopEvent::ActionChosen {
                task_id: snapshot.id,
                action: action.kind().to_string(),
            });
            ctx.conversation.push(Message::assistant(
                serde_json::to_string(&action).unwrap_or_else(|_| action.kind().to_string()),
            ));

            let outcome = match action {
                Action::ToolUse {
                    tool_name,
                    parameters,
                    ..
                } => {
                    let result = self.executor.execute(&tool_name, parameters).await;
                    self.emit(LoopEvent::ToolFinished {
                        tool: tool_name.clone(),
                        success: result.success,
                        duration_ms: result.execution_time_ms,
                    });
                    ctx.conversation
                        .push(Message::user(observation(&tool_name, &result)));
                    let root = self.project_dir.clone();
                    let outcome = update_task(&mut ctx.plan, snapshot.id, |task| {
                        apply_tool_result(task, &tool_name, &result, &root, iteration)
                    });
                    ctx.tool_results.push(result);
                    outcome
                }
                Action::Complete { message, .. } => {
                    if let Some(message) = message {
                        tracing::debug!(task_id = snapshot.id, %message, "completion claimed");
                    }
                    let root = self.project_dir.clone();
                    update_task(&mut ctx.plan, snapshot.id, |task| {
                        apply_completion_claim(task, &root, iteration)
                    })
                }
                Action::Clarify { message, .. } => {
                    tracing::warn!(task_id = snapshot.id, %message, "decider asked for clarification");
                    interrupt(&mut ctx, snapshot.id, &message);
                    ctx.errors.push(format!("Clarification needed: {}", message));
                    break StopReason::Clarification;
                }
                Action::Error { message } => {
                    tracing::warn!(task_id = snapshot.id, %message, "decider error");
                    interrupt(&mut ctx, snapshot.id, &message);
                    ctx.errors.push(format!("Decider error: {}", message));
                    break StopReason::DeciderError;
                }
            };

            self.emit_task_update(&ctx.plan, snapshot.id);
            match outcome {
                UpdateOutcome::Done => {
                    tracing::info!(task_id = snapshot.id, iteration, "task verified done");
                    ctx.conversation.push(Message::user(format!(
                        "Task {} verified as done.",
                        snapshot.id
                    )));
                    ctx.record_success();
                }
                UpdateOutcome::Failed { kind, reason } => {
                    let label = match kind {
                        FailureKind::Tool => "tool failure",
                        FailureKind::Verification => "verification failure",
                    };
                    tracing::warn!(task_id = snapshot.id, iteration, %reason, "{}", label);
                    ctx.conversation.push(Message::user(format!(
                        "Task {} failed ({}): {}",
                        snapshot.id, label, reason
                    )));
                    if ctx.record_failure(format!("Task {}: {}", snapshot.id, reason)) {
                        self.trip_breaker(&mut ctx, snapshot.id);
                        break StopReason::CircuitBreaker;
                    }
                }
            }
        };

        self.complete(run_id, ctx, stop_reason)
    }

    async fn decide(&self, user_request: &str, task: &Task, ctx: &AgentContext) -> Action {
        let input = DecisionInput {
            user_request,
            task,
            history: ctx.conversation.recent(self.settings.history_window),
        };
        match self.decider.decide(&input).await {
            Ok(action) => action,
            Err(e) => Action::error(format!("decider failed: {}", e)),
        }
    }

    fn trip_breaker(&self, ctx: &mut AgentContext, task_id: u32) {
        let reason = format!(
            "stopped after {} consecutive failures",
            ctx.consecutive_errors
        );
        tracing::error!(task_id, consecutive_errors = ctx.consecutive_errors, "circuit breaker tripped");
        if let Some(task) = ctx.plan.task_mut(task_id) {
            task.mark_failed(reason.clone());
        }
        ctx.errors.push(reason);
        self.emit(LoopEvent::CircuitBreakerTripped {
            consecutive_errors: ctx.consecutive_errors,
        });
        self.emit_task_update(&ctx.plan, task_id);
    }

    fn emit_task_update(&self, plan: &TaskPlan, task_id: u32) {
        if let Some(task) = plan.task(task_id) {
            self.emit(LoopEvent::TaskUpdated {
                task_id,
                status: task.status,
                error: task.error.clone(),
            });
        }
    }

    /// Completing：提前终止时跳过未开始的任务，最终复核，生成报告
    fn complete(&self, run_id: Uuid, mut ctx: AgentContext, stop_reason: StopReason) -> RunReport {
        if stop_reason != StopReason::PlanExhausted {
            let skipped = ctx
                .plan
                .skip_untouched(&format!("not attempted: run stopped ({})", stop_reason));
            if skipped > 0 {
                tracing::info!(skipped, "untouched tasks skipped");
            }
        }

        let verification = ctx.plan.verify_all_tasks();
        tracing::debug!(?verification, "final re-verification");
        let success = ctx.plan.is_complete();
        tracing::info!(
            success,
            %stop_reason,
            iterations = ctx.iteration,
            "run finished\n{}",
            ctx.plan
        );

        self.emit(LoopEvent::Finished {
            success,
            stop_reason,
            progress: ctx.plan.progress(),
        });

        RunReport {
            run_id: run_id.to_string(),
            success,
            response: summarize(&ctx.plan, stop_reason, success),
            iterations: ctx.iteration,
            stop_reason,
            files_created: ctx.plan.files_created(),
            task_plan: ctx.plan,
            errors: ctx.errors,
            tool_results: ctx.tool_results,
        }
    }
}

/// 对当前任务执行更新；任务不在计划中时视为校验失败
fn update_task(
    plan: &mut TaskPlan,
    task_id: u32,
    f: impl FnOnce(&mut Task) -> UpdateOutcome,
) -> UpdateOutcome {
    match plan.task_mut(task_id) {
        Some(task) => f(task),
        None => UpdateOutcome::Failed {
            kind: FailureKind::Verification,
            reason: format!("task {} not found in plan", task_id),
        },
    }
}

/// Clarify / Error：任务保持 InProgress，记录中断原因
fn interrupt(ctx: &mut AgentContext, task_id: u32, message: &str) {
    if let Some(task) = ctx.plan.task_mut(task_id) {
        task.error = Some(message.to_string());
    }
}

fn observation(tool_name: &str, result: &ToolResult) -> String {
    let body = serde_json::to_string(result).unwrap_or_else(|_| result.error_message());
    let body = if body.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!(
            "{}...",
            body.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>()
        )
    } else {
        body
    };
    format!("Tool {} returned: {}", tool_name, body)
}
