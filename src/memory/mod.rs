//! 记忆层：会话内的对话历史（不落盘）

pub mod conversation;

pub use conversation::{Author, Conversation, PlannerRole, PlannerTurn, Turn};
