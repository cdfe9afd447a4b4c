//! Agent 构建器：统一的组件初始化逻辑
//!
//! 由配置构建工具注册表、LLM 客户端（在线或回放脚本）、Decider 与编排器。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, LoopSettings, Orchestrator};
use crate::decider::{LlmDecider, DEFAULT_DECISION_PROMPT, DEFAULT_PLANNING_PROMPT};
use crate::llm::{LlmClient, OpenAiClient, ScriptedLlmClient};
use crate::tools::{
    ListDirectoryTool, ReadFileTool, SearchFilesTool, ShellTool, ToolExecutor, ToolRegistry,
    WriteFileTool,
};

/// 依次尝试 config/prompts 与 ../config/prompts 下的文件，都不存在时用内置提示词
fn load_prompt(file_name: &str, fallback: &str) -> String {
    [
        format!("config/prompts/{}", file_name),
        format!("../config/prompts/{}", file_name),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .filter(|s| !s.trim().is_empty())
    .unwrap_or_else(|| fallback.to_string())
}

pub struct AgentBuilder {
    config: AppConfig,
    project_dir: PathBuf,
    settings: LoopSettings,
    replay: Option<PathBuf>,
}

impl AgentBuilder {
    /// 项目目录：配置 [agent].project_dir，未设置时为 ./workspace
    pub fn new(config: AppConfig) -> Self {
        let project_dir = config
            .agent
            .project_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"));
        let settings = LoopSettings::from(&config.agent);
        Self {
            config,
            project_dir,
            settings,
            replay: None,
        }
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 使用回放脚本代替在线 LLM
    pub fn with_replay(mut self, script: Option<PathBuf>) -> Self {
        self.replay = script;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// 所有内置工具都限定在项目目录内
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let tools_cfg = &self.config.tools;
        let mut tools = ToolRegistry::new();
        tools.register(
            WriteFileTool::new(&self.project_dir).with_max_file_size(tools_cfg.max_file_size),
        );
        tools.register(ReadFileTool::new(&self.project_dir));
        tools.register(ListDirectoryTool::new(&self.project_dir));
        tools.register(
            SearchFilesTool::new(&self.project_dir)
                .with_limits(tools_cfg.search_max_results, tools_cfg.max_file_size as u64),
        );
        tools.register(ShellTool::new(
            tools_cfg.shell.allowed_commands.clone(),
            &self.project_dir,
            tools_cfg.tool_timeout_secs,
        ));
        tools
    }

    pub fn build_llm(&self) -> Result<Arc<dyn LlmClient>, AgentError> {
        match &self.replay {
            Some(path) => {
                let client = ScriptedLlmClient::from_file(path)?;
                tracing::info!(script = %path.display(), responses = client.remaining(), "Using scripted LLM replay");
                Ok(Arc::new(client))
            }
            None => {
                tracing::info!(model = %self.config.llm.model, "Using OpenAI-compatible LLM");
                Ok(Arc::new(OpenAiClient::from_config(&self.config.llm)))
            }
        }
    }

    pub fn build_decider(&self, llm: Arc<dyn LlmClient>, tools: &ToolRegistry) -> LlmDecider {
        LlmDecider::new(llm, tools.catalog())
            .with_planning_prompt(load_prompt("planning.md", DEFAULT_PLANNING_PROMPT))
            .with_decision_prompt(load_prompt("decision.md", DEFAULT_DECISION_PROMPT))
    }

    /// 创建项目目录并组装编排器
    pub fn build(&self) -> Result<Orchestrator, AgentError> {
        std::fs::create_dir_all(&self.project_dir)?;
        let tools = self.build_tool_registry();
        let llm = self.build_llm()?;
        let decider = self.build_decider(llm, &tools);
        let executor = ToolExecutor::new(tools, self.config.tools.tool_timeout_secs);
        Ok(Orchestrator::new(
            Arc::new(decider),
            executor,
            &self.project_dir,
            self.settings,
        ))
    }
}
