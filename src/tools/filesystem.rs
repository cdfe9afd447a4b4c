//! 沙箱文件系统工具
//!
//! SafeFs 绑定项目根目录，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ReadFileTool / ListDirectoryTool 基于 SafeFs 提供读文件与列目录能力。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::core::AgentError;
use crate::tools::{Tool, ToolResult};

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 已存在的路径：canonicalize 后必须仍在 root 下（符号链接也不能逃逸）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let path = path.trim_start_matches("./");
        let full = self.root_dir.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        let root_canon = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());
        if canonical.starts_with(root_canon) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string())) // 如 ../../etc/passwd
        }
    }

    /// 尚不存在的路径（写文件）：按词法检查，拒绝 `..` 与根外的绝对路径
    pub fn resolve_new(&self, path: &str) -> Result<PathBuf, AgentError> {
        let trimmed = path.trim_start_matches("./");
        let candidate = Path::new(trimmed);
        if trimmed.is_empty()
            || candidate
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(AgentError::PathEscape(path.to_string()));
        }
        let full = self.root_dir.join(candidate);
        if full.starts_with(&self.root_dir) {
            Ok(full)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    /// 相对 root 的展示路径（统一用 `/` 分隔）
    pub fn display(&self, path: &Path) -> String {
        let root_canon = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());
        path.strip_prefix(&root_canon)
            .or_else(|_| path.strip_prefix(&self.root_dir))
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved).map_err(|e| {
            AgentError::ToolExecutionFailed(format!("Read failed: {}", e))
        })
    }

    /// 列目录；recursive 时用 walkdir 遍历（跳过隐藏项），目录以 `/` 结尾
    pub fn list_dir(&self, path: &str, recursive: bool) -> Result<Vec<String>, AgentError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        if !base.is_dir() {
            return Err(AgentError::ToolExecutionFailed(format!(
                "Not a directory: {}",
                path
            )));
        }
        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut entries = Vec::new();
        for entry in WalkDir::new(&base)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry =
                entry.map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?;
            let rel = entry
                .path()
                .strip_prefix(&base)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if entry.file_type().is_dir() {
                entries.push(format!("{}/", rel));
            } else {
                entries.push(rel);
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadFileInput {
    /// 相对项目根目录的文件路径
    pub file_path: String,
}

/// 读取文件内容
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    type Input = ReadFileInput;

    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the project directory. Returns its content, size and line count."
    }

    async fn execute(&self, input: ReadFileInput) -> ToolResult {
        tracing::info!(path = %input.file_path, "read_file tool execute");
        match self.fs.read_file(&input.file_path) {
            Ok(content) => ToolResult::ok(serde_json::json!({
                "content": content,
                "size": content.len(),
                "lines": content.lines().count(),
            })),
            Err(e) => ToolResult::failure(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListDirectoryInput {
    /// 目录路径，默认项目根目录
    #[serde(default)]
    pub path: Option<String>,
    /// 是否递归列出子目录
    #[serde(default)]
    pub recursive: bool,
}

/// 列出目录
pub struct ListDirectoryTool {
    fs: SafeFs,
}

impl ListDirectoryTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    type Input = ListDirectoryInput;

    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List entries of a directory in the project (directories end with '/')."
    }

    async fn execute(&self, input: ListDirectoryInput) -> ToolResult {
        let path = input.path.as_deref().unwrap_or(".");
        tracing::info!(path = %path, recursive = input.recursive, "list_directory tool execute");
        match self.fs.list_dir(path, input.recursive) {
            Ok(entries) => ToolResult::ok(serde_json::json!({ "entries": entries })),
            Err(e) => ToolResult::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_rejects_escape() {
        let dir = TempDir::new().unwrap();
        let fs = SafeFs::new(dir.path());
        assert!(matches!(
            fs.resolve_new("../outside.txt"),
            Err(AgentError::PathEscape(_))
        ));
        assert!(matches!(
            fs.resolve_new("/etc/passwd"),
            Err(AgentError::PathEscape(_))
        ));
        assert!(fs.resolve_new("./src/a.txt").unwrap().ends_with("src/a.txt"));
    }

    #[tokio::test]
    async fn test_read_and_list() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/a.txt"), "one\ntwo\n").unwrap();
        std::fs::write(dir.path().join("src/nested/b.txt"), "b").unwrap();
        std::fs::write(dir.path().join(".hidden"), "h").unwrap();

        let read = ReadFileTool::new(dir.path())
            .execute(ReadFileInput {
                file_path: "src/a.txt".to_string(),
            })
            .await;
        assert!(read.success);
        assert_eq!(read.data.as_ref().unwrap()["lines"], 2);

        let list = ListDirectoryTool::new(dir.path())
            .execute(ListDirectoryInput {
                path: None,
                recursive: true,
            })
            .await;
        let entries = list.data.unwrap()["entries"].clone();
        assert_eq!(
            entries,
            serde_json::json!(["src/", "src/a.txt", "src/nested/", "src/nested/b.txt"])
        );
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let result = ReadFileTool::new(dir.path())
            .execute(ReadFileInput {
                file_path: "nope.txt".to_string(),
            })
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Path not found"));
    }
}
