//! 文件写入工具 - 创建或覆盖项目内文件
//!
//! 成功时在 data.files_created 中声明写入的路径，供任务状态更新器做落盘校验。

use std::path::Path;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::tools::{SafeFs, Tool, ToolResult};

const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WriteFileInput {
    /// 相对项目根目录的文件路径
    pub file_path: String,
    /// 文件内容
    pub content: String,
    /// 是否覆盖已存在的文件（默认 true，重试时需要覆盖上一轮的残留输出）
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

/// 文件写入工具
pub struct WriteFileTool {
    fs: SafeFs,
    max_file_size: usize,
}

impl WriteFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: usize) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    fn write(&self, input: &WriteFileInput) -> Result<usize, String> {
        if input.content.len() > self.max_file_size {
            return Err(format!(
                "Content too large: {} bytes (max: {})",
                input.content.len(),
                self.max_file_size
            ));
        }

        let target = self.fs.resolve_new(&input.file_path).map_err(|e| e.to_string())?;
        if target.is_dir() {
            return Err(format!("Path is a directory: {}", input.file_path));
        }
        if target.exists() && !input.overwrite {
            return Err(format!(
                "File already exists: {}. Use overwrite=true to overwrite.",
                input.file_path
            ));
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create parent directory: {}", e))?;
        }
        std::fs::write(&target, &input.content)
            .map_err(|e| format!("Failed to write file: {}", e))?;
        Ok(input.content.len())
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    type Input = WriteFileInput;

    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file inside the project directory. Parent directories are created automatically."
    }

    async fn execute(&self, input: WriteFileInput) -> ToolResult {
        tracing::info!(path = %input.file_path, bytes = input.content.len(), "write_file tool execute");
        match self.write(&input) {
            Ok(bytes) => ToolResult::ok(serde_json::json!({
                "file_path": input.file_path,
                "bytes_written": bytes,
                "files_created": [input.file_path],
            })),
            Err(e) => ToolResult::failure(e),
        }
    }
}
