//! 工具层：注册表、执行器与内置工具
//!
//! 工具只操作项目目录；文件类工具返回 `files_created` 等键供任务状态更新器校验。

pub mod executor;
pub mod filesystem;
pub mod registry;
pub mod result;
pub mod search;
pub mod shell;
pub mod write;

pub use executor::ToolExecutor;
pub use filesystem::{ListDirectoryTool, ReadFileTool, SafeFs};
pub use registry::{Tool, ToolRegistry, ToolSpec};
pub use result::ToolResult;
pub use search::SearchFilesTool;
pub use shell::ShellTool;
pub use write::WriteFileTool;
