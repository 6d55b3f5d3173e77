//! Quill - Workspace 助手核心
//!
//! 对话驱动、先确认后执行：Planner 提议工具调用，用户确认后由执行器调用账户 API。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话聚合、错误与恢复、状态投影、会话监管、命令循环
//! - **llm**: LLM 客户端抽象与实现（Gemini / OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话历史（Turn 序列）
//! - **planner**: 历史 -> 回复或工具提议
//! - **tools**: 固定工具目录与动作执行器
//! - **workspace**: 凭证、账户 API 请求、活动 Feed

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planner;
pub mod tools;
pub mod workspace;
