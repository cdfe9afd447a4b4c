//! 文件系统校验辅助
//!
//! “存在”意味着路径是普通文件且长度大于 0：空文件视为不存在，避免工具只 touch 了文件就被判定完成。

use std::path::{Path, PathBuf};

use serde_json::Value;

/// 工具结果 data 中约定的“已创建路径”键
pub const CREATED_PATH_KEYS: &[&str] = &["files_created", "component_file", "page_path"];

/// 相对路径基于项目目录解析；绝对路径原样使用
pub fn resolve(root: &Path, path: &str) -> PathBuf {
    root.join(path)
}

/// 文件存在、是普通文件且非空
pub fn file_has_content(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// 从 ToolResult.data 中提取工具声称写入的路径（保持顺序、去重）
///
/// `files_created` 可为字符串数组或单个字符串；`component_file` / `page_path` 为单个字符串。
pub fn claimed_paths(data: Option<&Value>) -> Vec<String> {
    let Some(Value::Object(map)) = data else {
        return Vec::new();
    };

    let mut paths: Vec<String> = Vec::new();
    let mut push = |p: &str| {
        let p = p.trim();
        if !p.is_empty() && !paths.iter().any(|existing| existing == p) {
            paths.push(p.to_string());
        }
    };

    for key in CREATED_PATH_KEYS {
        match map.get(*key) {
            Some(Value::String(s)) => push(s),
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(s) = item.as_str() {
                        push(s);
                    }
                }
            }
            _ => {}
        }
    }
    paths
}
