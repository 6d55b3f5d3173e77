//! LLM 客户端抽象
//!
//! 所有后端（Gemini / OpenAI 兼容 / Mock）实现 LlmClient：给定 system 指令、对话上下文与工具目录，
//! 返回文本回复或结构化工具调用。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::PlannerTurn;
use crate::tools::{ToolCall, ToolDeclaration};

/// 后端调用失败
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

/// 一次生成的结果：可能同时带文本与工具调用，Planner 优先取工具调用
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl LlmReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 单次非流式生成（带函数声明）
    async fn generate(
        &self,
        system: &str,
        contents: &[PlannerTurn],
        tools: &[ToolDeclaration],
    ) -> Result<LlmReply, LlmError>;

    /// 模型名（日志用）
    fn model(&self) -> &str;
}
