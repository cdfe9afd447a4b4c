//! 文件内容搜索工具
//!
//! 在项目目录中按子串或正则搜索，可用 glob 过滤文件名。

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::tools::{SafeFs, Tool, ToolResult};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchFilesInput {
    /// 搜索模式（子串或正则）
    pub pattern: String,
    /// 搜索起点，默认项目根目录
    #[serde(default)]
    pub path: Option<String>,
    /// 文件名 glob 过滤，如 "*.rs"
    #[serde(default)]
    pub include: Option<String>,
    /// pattern 是否按正则解释
    #[serde(default)]
    pub use_regex: bool,
}

#[derive(Debug, Serialize)]
struct FileMatch {
    file: String,
    line: usize,
    text: String,
}

enum Matcher {
    Plain(String),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Plain(p) => line.contains(p.as_str()),
            Matcher::Regex(re) => re.is_match(line),
        }
    }
}

/// 搜索工具
pub struct SearchFilesTool {
    fs: SafeFs,
    max_results: usize,
    max_file_size: u64,
}

impl SearchFilesTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
            max_results: 50,
            max_file_size: 1024 * 1024, // 1MB
        }
    }

    pub fn with_limits(mut self, max_results: usize, max_file_size: u64) -> Self {
        self.max_results = max_results;
        self.max_file_size = max_file_size;
        self
    }

    fn search(&self, input: &SearchFilesInput) -> Result<Vec<FileMatch>, String> {
        let matcher = if input.use_regex {
            Matcher::Regex(
                Regex::new(&input.pattern).map_err(|e| format!("Invalid regex pattern: {}", e))?,
            )
        } else {
            Matcher::Plain(input.pattern.clone())
        };
        let include = input
            .include
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| format!("Invalid include pattern: {}", e))?;
        let start = match input.path.as_deref() {
            None | Some("") | Some(".") => self.fs.root().to_path_buf(),
            Some(p) => self.fs.resolve(p).map_err(|e| e.to_string())?,
        };

        let mut results = Vec::new();
        for entry in WalkDir::new(&start)
            .max_depth(10)
            .into_iter()
            .filter_entry(|e| {
                // 跳过隐藏目录和构建产物目录
                let name = e.file_name().to_string_lossy();
                e.depth() == 0
                    || (!name.starts_with('.') && name != "target" && name != "node_modules")
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry
                .metadata()
                .map(|m| m.len() > self.max_file_size)
                .unwrap_or(true)
            {
                continue;
            }
            if let Some(pattern) = &include {
                let file_name = entry.file_name().to_string_lossy();
                if !pattern.matches(&file_name) {
                    continue;
                }
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue; // 跳过无法按 UTF-8 读取的文件
            };
            for (idx, line) in content.lines().enumerate() {
                if matcher.is_match(line) {
                    results.push(FileMatch {
                        file: self.fs.display(entry.path()),
                        line: idx + 1,
                        text: line.chars().take(200).collect(),
                    });
                    if results.len() >= self.max_results {
                        return Ok(results);
                    }
                }
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    type Input = SearchFilesInput;

    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search file contents in the project by substring or regex, optionally filtering file names with a glob."
    }

    async fn execute(&self, input: SearchFilesInput) -> ToolResult {
        tracing::info!(pattern = %input.pattern, "search_files tool execute");
        match self.search(&input) {
            Ok(matches) => ToolResult::ok(serde_json::json!({
                "total": matches.len(),
                "matches": matches,
            })),
            Err(e) => ToolResult::failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\nfn helper() {}\n").unwrap();
        std::fs::write(dir.path().join("src/notes.md"), "fn in markdown\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_search_with_glob_filter() {
        let dir = setup();
        let result = SearchFilesTool::new(dir.path())
            .execute(SearchFilesInput {
                pattern: "fn ".to_string(),
                path: None,
                include: Some("*.rs".to_string()),
                use_regex: false,
            })
            .await;
        let data = result.data.unwrap();
        assert_eq!(data["total"], 2);
        assert_eq!(data["matches"][0]["file"], "src/main.rs");
    }

    #[tokio::test]
    async fn test_search_stops_at_max_results() {
        let dir = setup();
        let result = SearchFilesTool::new(dir.path())
            .with_limits(1, 1024)
            .execute(SearchFilesInput {
                pattern: "fn ".to_string(),
                path: None,
                include: None,
                use_regex: false,
            })
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["total"], 1);
    }

    #[tokio::test]
    async fn test_search_regex_and_invalid_regex() {
        let dir = setup();
        let tool = SearchFilesTool::new(dir.path());
        let ok = tool
            .execute(SearchFilesInput {
                pattern: r"fn \w+\(\)".to_string(),
                path: Some("src".to_string()),
                include: None,
                use_regex: true,
            })
            .await;
        assert_eq!(ok.data.unwrap()["total"], 2);

        let bad = tool
            .execute(SearchFilesInput {
                pattern: "(".to_string(),
                path: None,
                include: None,
                use_regex: true,
            })
            .await;
        assert!(bad.error.unwrap().contains("Invalid regex"));
    }
}
