//! 对话记录：执行循环的 role/content 轨迹，仅作为 Decider 输入

pub mod conversation;

pub use conversation::{ConversationLog, Message, Role};
