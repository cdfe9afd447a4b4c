//! 执行循环集成测试：脚本化 LLM + 真实工具 + 临时项目目录

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use taskforge::config::AppConfig;
use taskforge::core::{AgentBuilder, AgentError, LoopEvent, LoopSettings, Orchestrator, StopReason};
use taskforge::decider::{Action, DecisionInput, Decider, LlmDecider};
use taskforge::llm::ScriptedLlmClient;
use taskforge::task::{PlannedTask, TaskStatus};
use taskforge::tools::ToolExecutor;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn executor(dir: &Path) -> ToolExecutor {
    let registry = AgentBuilder::new(AppConfig::default())
        .with_project_dir(dir)
        .build_tool_registry();
    ToolExecutor::new(registry, 5)
}

fn scripted(dir: &Path, responses: Vec<String>, settings: LoopSettings) -> (Orchestrator, Arc<ScriptedLlmClient>) {
    let executor = executor(dir);
    let llm = Arc::new(ScriptedLlmClient::new(responses));
    let decider = LlmDecider::new(llm.clone(), executor.catalog());
    (Orchestrator::new(Arc::new(decider), executor, dir, settings), llm)
}

fn write(path: &str, content: &str) -> String {
    json!({
        "type": "tool_use",
        "tool_name": "write_file",
        "parameters": {"file_path": path, "content": content}
    })
    .to_string()
}

fn plan(tasks: serde_json::Value) -> String {
    tasks.to_string()
}

fn no_retries() -> LoopSettings {
    LoopSettings {
        max_retries: 0,
        ..LoopSettings::default()
    }
}

#[tokio::test]
async fn test_written_expected_file_completes_run() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([{"name": "write a", "files_expected": ["out/a.txt"]}])),
            write("out/a.txt", "hello"),
        ],
        LoopSettings::default(),
    );

    let report = orchestrator.run("create out/a.txt").await;
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.stop_reason, StopReason::PlanExhausted);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.files_created, vec!["out/a.txt"]);
    assert_eq!(report.task_plan.tasks[0].status, TaskStatus::Done);
    assert!(report.errors.is_empty());
    assert_eq!(report.tool_results.len(), 1);

    let value: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(value["task_plan"]["completion_percentage"], 100.0);
    assert_eq!(value["stop_reason"], "plan_exhausted");
}

#[tokio::test]
async fn test_success_claim_without_expected_file_fails_task() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([{"name": "write a", "files_expected": ["out/a.txt"]}])),
            write("elsewhere.txt", "hello"),
        ],
        no_retries(),
    );

    let report = orchestrator.run("create out/a.txt").await;
    assert!(!report.success);
    let task = &report.task_plan.tasks[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task
        .error
        .as_deref()
        .unwrap()
        .contains("no expected files found"));
    assert!(report.files_created.is_empty());
}

#[tokio::test]
async fn test_partial_output_reports_count() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([{"name": "pair", "files_expected": ["a.txt", "b.txt"]}])),
            write("a.txt", "only one"),
        ],
        no_retries(),
    );

    let report = orchestrator.run("create two files").await;
    assert!(!report.success);
    assert_eq!(report.task_plan.tasks[0].status, TaskStatus::Failed);
    assert!(report.task_plan.tasks[0]
        .error
        .as_deref()
        .unwrap()
        .contains("1/2"));
    assert!(report.errors.iter().any(|e| e.contains("1/2 files verified")));
}

#[tokio::test]
async fn test_circuit_breaker_halts_after_consecutive_failures() {
    let dir = TempDir::new().unwrap();
    let failing = json!({
        "type": "tool_use",
        "tool_name": "read_file",
        "parameters": {"file_path": "missing.txt"}
    })
    .to_string();
    let mut responses = vec![plan(json!([{"name": "read", "files_expected": []}]))];
    responses.extend(std::iter::repeat(failing).take(5));
    let settings = LoopSettings {
        max_iterations: 20,
        max_consecutive_errors: 4,
        max_retries: 10,
        history_window: 3,
    };
    let (orchestrator, llm) = scripted(dir.path(), responses, settings);

    let report = orchestrator.run("read a file").await;
    assert!(!report.success);
    assert_eq!(report.stop_reason, StopReason::CircuitBreaker);
    assert_eq!(report.iterations, 4);
    assert_eq!(llm.remaining(), 1);
    let task = &report.task_plan.tasks[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task
        .error
        .as_deref()
        .unwrap()
        .contains("stopped after 4 consecutive"));
}

#[tokio::test]
async fn test_failed_task_retried_before_later_tasks() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([
                {"name": "first", "files_expected": ["a.txt"]},
                {"name": "second", "files_expected": ["b.txt"]}
            ])),
            write("wrong.txt", "x"),
            write("a.txt", "a"),
            write("b.txt", "b"),
        ],
        LoopSettings::default(),
    );

    let report = orchestrator.run("two files").await;
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.iterations, 3);
    assert_eq!(report.task_plan.tasks[0].retry_count, 1);
    assert_eq!(report.task_plan.tasks[0].iteration_started, Some(1));
    assert_eq!(report.task_plan.tasks[0].iteration_completed, Some(2));
    assert_eq!(report.task_plan.tasks[1].retry_count, 0);
    assert_eq!(report.files_created, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn test_retry_budget_exhausts_task() {
    let dir = TempDir::new().unwrap();
    let settings = LoopSettings {
        max_retries: 1,
        max_consecutive_errors: 10,
        ..LoopSettings::default()
    };
    let (orchestrator, llm) = scripted(
        dir.path(),
        vec![
            plan(json!([{"name": "a", "files_expected": ["a.txt"]}])),
            write("x.txt", "x"),
            write("y.txt", "y"),
            write("a.txt", "never used"),
        ],
        settings,
    );

    let report = orchestrator.run("a").await;
    assert_eq!(report.stop_reason, StopReason::PlanExhausted);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.task_plan.tasks[0].retry_count, 1);
    assert_eq!(llm.remaining(), 1);
}

#[tokio::test]
async fn test_iteration_limit_stops_run() {
    let dir = TempDir::new().unwrap();
    let settings = LoopSettings {
        max_iterations: 2,
        max_consecutive_errors: 10,
        max_retries: 5,
        history_window: 3,
    };
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([
                {"name": "a", "files_expected": ["a.txt"]},
                {"name": "b", "files_expected": ["b.txt"]}
            ])),
            write("x.txt", "x"),
            write("y.txt", "y"),
            write("z.txt", "z"),
        ],
        settings,
    );

    let report = orchestrator.run("a and b").await;
    assert!(!report.success);
    assert_eq!(report.stop_reason, StopReason::IterationLimit);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.task_plan.tasks[1].status, TaskStatus::Skipped);
    assert!(report.errors.iter().any(|e| e.contains("iteration limit")));
}

#[tokio::test]
async fn test_clarify_terminates_and_skips_rest() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([{"name": "a"}, {"name": "b"}])),
            json!({"type": "clarify", "message": "which framework?"}).to_string(),
        ],
        LoopSettings::default(),
    );

    let report = orchestrator.run("build an app").await;
    assert!(!report.success);
    assert_eq!(report.stop_reason, StopReason::Clarification);
    assert_eq!(report.iterations, 1);
    let first = &report.task_plan.tasks[0];
    assert_eq!(first.status, TaskStatus::InProgress);
    assert_eq!(first.error.as_deref(), Some("which framework?"));
    assert_eq!(report.task_plan.tasks[1].status, TaskStatus::Skipped);
    assert_eq!(report.errors, vec!["Clarification needed: which framework?"]);
}

#[tokio::test]
async fn test_malformed_decision_stops_with_decider_error() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([{"name": "a"}])),
            "I'll get right on that!".to_string(),
        ],
        LoopSettings::default(),
    );

    let report = orchestrator.run("a").await;
    assert_eq!(report.stop_reason, StopReason::DeciderError);
    assert!(report.errors[0].starts_with("Decider error: invalid decision JSON"));
}

#[tokio::test]
async fn test_exhausted_llm_becomes_decider_error() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![plan(json!([{"name": "a"}]))],
        LoopSettings::default(),
    );

    let report = orchestrator.run("a").await;
    assert!(!report.success);
    assert_eq!(report.stop_reason, StopReason::DeciderError);
    assert!(report.errors[0].contains("decider failed"));
}

#[tokio::test]
async fn test_planning_failure_falls_back_to_single_task() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            "Sorry, I cannot produce JSON today.".to_string(),
            json!({"type": "complete", "message": "nothing to write"}).to_string(),
        ],
        LoopSettings::default(),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = orchestrator.with_events(tx);

    let report = orchestrator.run("say hello").await;
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.task_plan.tasks.len(), 1);
    assert_eq!(report.task_plan.tasks[0].description, "say hello");

    let first = rx.recv().await.unwrap();
    assert_eq!(
        first,
        LoopEvent::Planned {
            task_count: 1,
            fallback: true
        }
    );
    drop(orchestrator);
    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    assert!(matches!(
        last,
        Some(LoopEvent::Finished {
            success: true,
            stop_reason: StopReason::PlanExhausted,
            ..
        })
    ));
}

#[tokio::test]
async fn test_completion_claim_is_checked_on_disk() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([{"name": "a", "files_expected": ["a.txt"]}])),
            json!({"type": "complete"}).to_string(),
        ],
        no_retries(),
    );

    let report = orchestrator.run("a").await;
    assert!(!report.success);
    assert_eq!(
        report.task_plan.tasks[0].error.as_deref(),
        Some("Missing files: a.txt")
    );
}

#[tokio::test]
async fn test_unknown_tool_is_a_task_failure() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = scripted(
        dir.path(),
        vec![
            plan(json!([{"name": "a"}])),
            json!({"type": "tool_use", "tool_name": "deploy", "parameters": {}}).to_string(),
        ],
        no_retries(),
    );

    let report = orchestrator.run("a").await;
    assert!(!report.success);
    assert_eq!(report.stop_reason, StopReason::PlanExhausted);
    assert_eq!(
        report.task_plan.tasks[0].error.as_deref(),
        Some("tool not found: deploy")
    );
}

/// 在第二个任务决策时删除第一个任务的产出，模拟运行期间文件系统变化
struct DriftingDecider {
    root: std::path::PathBuf,
    step: Mutex<usize>,
}

#[async_trait]
impl Decider for DriftingDecider {
    async fn plan(&self, _request: &str) -> Result<Vec<PlannedTask>, AgentError> {
        Ok(vec![
            PlannedTask::new("a", "write a").with_files(&["a.txt"]),
            PlannedTask::new("b", "write b").with_files(&["b.txt"]),
        ])
    }

    async fn decide(&self, input: &DecisionInput<'_>) -> Result<Action, AgentError> {
        let step = {
            let mut step = self.step.lock().unwrap();
            *step += 1;
            *step
        };
        if step == 2 {
            std::fs::remove_file(self.root.join("a.txt"))?;
        }
        let path = format!("{}.txt", input.task.name);
        Ok(Action::ToolUse {
            tool_name: "write_file".to_string(),
            parameters: json!({"file_path": path, "content": "data"}),
            reasoning: None,
        })
    }
}

#[tokio::test]
async fn test_final_reverification_demotes_drifted_task() {
    let dir = TempDir::new().unwrap();
    let decider = DriftingDecider {
        root: dir.path().to_path_buf(),
        step: Mutex::new(0),
    };
    let orchestrator = Orchestrator::new(
        Arc::new(decider),
        executor(dir.path()),
        dir.path(),
        LoopSettings::default(),
    );

    let report = orchestrator.run("a and b").await;
    assert!(!report.success);
    assert_eq!(report.stop_reason, StopReason::PlanExhausted);
    let first = &report.task_plan.tasks[0];
    assert_eq!(first.status, TaskStatus::Failed);
    assert_eq!(first.error.as_deref(), Some("Missing files: a.txt"));
    assert_eq!(report.task_plan.tasks[1].status, TaskStatus::Done);
    assert_eq!(report.files_created, vec!["b.txt"]);
}
