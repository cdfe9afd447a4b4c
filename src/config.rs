//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TASKFORGE__*` 覆盖（双下划线表示嵌套，如 `TASKFORGE__AGENT__MAX_ITERATIONS=20`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub logging: LoggingSection,
}

/// [agent] 段：执行循环预算与项目目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Decide + Execute 循环的最大轮数
    pub max_iterations: usize,
    /// 连续失败达到此值即熔断
    pub max_consecutive_errors: usize,
    /// 单个任务的最大重试次数
    pub max_retries: u32,
    /// 传给 Decider 的最近历史条数
    pub history_window: usize,
    /// 工具读写与文件校验的根目录，未设置时用 ./workspace
    pub project_dir: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_consecutive_errors: 4,
            max_retries: 3,
            history_window: 3,
            project_dir: None,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: String,
    /// 未设置时读取环境变量 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: Some(0.1),
            request_timeout_secs: 60,
        }
    }
}

/// [tools] 段：工具超时、写入大小上限、Shell 白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub max_file_size: usize,
    /// search_files 单次最多返回的匹配行数
    pub search_max_results: usize,
    pub shell: ShellSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            max_file_size: 10 * 1024 * 1024,
            search_max_results: 50,
            shell: ShellSection::default(),
        }
    }
}

/// [tools.shell] 段：允许执行的命令名（仅首词，如 ls、grep、cargo）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_commands: vec![
                "ls".into(),
                "grep".into(),
                "cat".into(),
                "head".into(),
                "tail".into(),
                "wc".into(),
                "find".into(),
                "git".into(),
                "npm".into(),
                "cargo".into(),
            ],
        }
    }
}

/// [logging] 段：默认日志级别（RUST_LOG 优先）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 TASKFORGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TASKFORGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if !path.exists() {
            return Err(config::ConfigError::NotFound(path.display().to_string()));
        }
        builder = builder.add_source(config::File::from(path.clone()));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TASKFORGE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_loop_budgets() {
        let config = AppConfig::default();
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.max_consecutive_errors, 4);
        assert_eq!(config.agent.max_retries, 3);
        assert_eq!(config.tools.tool_timeout_secs, 30);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_iterations = 25\nproject_dir = \"/tmp/demo\"\n\n[tools.shell]\nallowed_commands = [\"ls\"]\n",
        )
        .unwrap();
        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.agent.max_iterations, 25);
        assert_eq!(config.agent.max_consecutive_errors, 4);
        assert_eq!(config.agent.project_dir, Some(PathBuf::from("/tmp/demo")));
        assert_eq!(config.tools.shell.allowed_commands, vec!["ls".to_string()]);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(dir.path().join("missing.toml"))).is_err());
    }
}
