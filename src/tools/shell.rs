//! Shell 执行器：白名单命令，禁止危险操作
//!
//! 仅允许配置中的命令名（首词，如 ls、grep、cargo）；禁止 rm -rf、wget、chmod 777 等子串；
//! 在项目目录下通过 sh -c / cmd /C 执行，带超时与 tracing 审计。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::process::Command;

use crate::tools::{Tool, ToolResult};

/// 禁止的命令/子串（即使白名单中有同名，也不允许带这些参数）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

/// 输出截断长度（字符）
const MAX_OUTPUT_CHARS: usize = 8000;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ShellInput {
    /// 要执行的命令（首词必须在白名单中）
    pub command: String,
}

/// Shell 工具：仅允许白名单内命令
pub struct ShellTool {
    allowed_commands: HashSet<String>,
    working_dir: PathBuf,
    timeout_secs: u64,
}

impl ShellTool {
    pub fn new(
        allowed_commands: Vec<String>,
        working_dir: impl AsRef<Path>,
        timeout_secs: u64,
    ) -> Self {
        let allowed_commands = allowed_commands
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            allowed_commands,
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout_secs,
        }
    }

    /// 解析命令：只取第一个 token 作为命令名
    fn command_name<'a>(&self, raw: &'a str) -> &'a str {
        raw.split_whitespace().next().unwrap_or("")
    }

    fn is_allowed(&self, raw: &str) -> Result<(), String> {
        let raw_lower = raw.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if raw_lower.contains(forbidden) {
                return Err(format!("Forbidden pattern: {}", forbidden));
            }
        }
        let name = self.command_name(&raw_lower);
        if name.is_empty() {
            return Err("Empty command".to_string());
        }
        if self.allowed_commands.contains(name) {
            return Ok(());
        }
        Err(format!("Command '{}' not in allowlist", name))
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_OUTPUT_CHARS {
        format!("{}...", s.chars().take(MAX_OUTPUT_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

#[async_trait]
impl Tool for ShellTool {
    type Input = ShellInput;

    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run an allowlisted shell command inside the project directory (configurable allowlist, e.g. ls, grep, cat, cargo)."
    }

    async fn execute(&self, input: ShellInput) -> ToolResult {
        let command = input.command.trim();
        if let Err(e) = self.is_allowed(command) {
            return ToolResult::failure(e);
        }

        tracing::info!(command = %command, "shell tool execute");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.working_dir).kill_on_drop(true);

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::failure(format!("Execution failed: {}", e)),
            Err(_) => {
                return ToolResult::failure(format!(
                    "Command timed out after {}s",
                    self.timeout_secs
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let data = serde_json::json!({
            "stdout": truncate(&stdout),
            "stderr": truncate(&stderr),
            "exit_code": output.status.code(),
        });
        if output.status.success() {
            ToolResult::ok(data)
        } else {
            ToolResult {
                data: Some(data),
                ..ToolResult::failure(format!(
                    "Exit {:?}\nstderr: {}",
                    output.status.code(),
                    stderr.trim()
                ))
            }
        }
    }
}
