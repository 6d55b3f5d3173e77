//! Planner：对话 -> 回复或工具提议
//!
//! 把历史映射为 LLM 上下文（去掉 System Turn，assistant -> model），附上固定工具目录调用 LLM；
//! 返回非空的工具调用列表或文本回复。只取第一个工具调用是编排层的事。

use std::sync::Arc;

use crate::core::PlannerError;
use crate::llm::LlmClient;
use crate::memory::Conversation;
use crate::tools::{catalog, ToolCall, ToolDeclaration};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Quill, an assistant connected to the user's Google Workspace. \
You can send emails, create calendar events and create Google Docs by calling the provided functions. \
Call a function only when the user clearly asks for that action; otherwise answer in plain text. \
Use YYYY-MM-DD for dates and 24-hour HH:MM for times.";

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 至少一个工具提议（按模型给出的顺序）
    ToolCalls(Vec<ToolCall>),
    /// 文本回复；None 表示模型既没给文本也没给工具调用
    Reply(Option<String>),
}

/// Planner：持有 LLM、system prompt 与工具目录
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    tools: Vec<ToolDeclaration>,
    max_context_turns: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            tools: catalog(),
            max_context_turns: 0,
        }
    }

    /// 发送给 LLM 的最近 Turn 数上限（0 表示全部）
    pub fn with_max_context_turns(mut self, max: usize) -> Self {
        self.max_context_turns = max;
        self
    }

    pub fn tools(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    pub async fn plan(&self, history: &Conversation) -> Result<PlannerOutput, PlannerError> {
        let contents = history.planner_context(self.max_context_turns);
        let system = format!(
            "{}\nToday is {}.",
            self.system_prompt,
            chrono::Local::now().format("%A, %Y-%m-%d")
        );
        let reply = self.llm.generate(&system, &contents, &self.tools).await?;

        if reply.tool_calls.is_empty() {
            Ok(PlannerOutput::Reply(reply.text))
        } else {
            Ok(PlannerOutput::ToolCalls(reply.tool_calls))
        }
    }
}
