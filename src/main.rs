//! Taskforge - 校验驱动的任务执行智能体
//!
//! 入口：加载配置、初始化日志、构建编排器并执行一次运行；报告 JSON 输出到 stdout 或 --report 文件。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use taskforge::config::load_config;
use taskforge::core::{AgentBuilder, LoopEvent};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "taskforge",
    version,
    about = "Plan a request into tasks, drive tools, and verify results on disk"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one request to completion and print the run report.
    Run {
        /// The request to carry out.
        request: String,
        /// Extra config file layered over config/default.toml.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory the tools write into and verification checks.
        #[arg(long)]
        project_dir: Option<PathBuf>,
        #[arg(long)]
        max_iterations: Option<usize>,
        #[arg(long)]
        max_consecutive_errors: Option<usize>,
        #[arg(long)]
        max_retries: Option<u32>,
        /// JSON array of canned LLM responses used instead of a live endpoint.
        #[arg(long)]
        replay: Option<PathBuf>,
        /// Write the report here instead of stdout.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Print loop events as JSON lines on stderr.
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(2);
        }
    }
}

/// 返回运行是否成功
async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();
    let Command::Run {
        request,
        config,
        project_dir,
        max_iterations,
        max_consecutive_errors,
        max_retries,
        replay,
        report,
        events,
    } = cli.command;

    let cfg = load_config(config).context("Failed to load config")?;
    taskforge::observability::init(&cfg.logging.level);

    let mut builder = AgentBuilder::new(cfg).with_replay(replay);
    if let Some(dir) = project_dir {
        builder = builder.with_project_dir(dir);
    }
    let mut settings = *builder.settings();
    if let Some(n) = max_iterations {
        settings.max_iterations = n;
    }
    if let Some(n) = max_consecutive_errors {
        settings.max_consecutive_errors = n;
    }
    if let Some(n) = max_retries {
        settings.max_retries = n;
    }
    builder = builder.with_settings(settings);

    let mut orchestrator = builder.build().context("Failed to build agent")?;

    let printer = if events {
        let (tx, mut rx) = mpsc::unbounded_channel::<LoopEvent>();
        orchestrator = orchestrator.with_events(tx);
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{}", line);
                }
            }
        }))
    } else {
        None
    };

    let run_report = orchestrator.run(&request).await;
    // 释放发送端，事件打印任务随之结束
    drop(orchestrator);
    if let Some(handle) = printer {
        let _ = handle.await;
    }

    let payload = run_report.to_json();
    match report {
        Some(path) => std::fs::write(&path, format!("{}\n", payload))
            .with_context(|| format!("write report {}", path.display()))?,
        None => println!("{}", payload),
    }

    Ok(run_report.success)
}
