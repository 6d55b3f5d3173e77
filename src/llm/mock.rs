//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序返回预置的回复；队列耗尽后回显最后一条 user 消息，便于本地跑通对话流程。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmReply};
use crate::memory::{PlannerRole, PlannerTurn};
use crate::tools::{ToolCall, ToolDeclaration};

/// Mock 客户端：预置回复队列 + 调用计数 + 最近一次收到的上下文
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<LlmReply, LlmError>>>,
    calls: AtomicUsize,
    last_contents: Mutex<Vec<PlannerTurn>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: LlmReply) -> Self {
        self.push(Ok(reply));
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_reply(LlmReply::text(text))
    }

    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.with_reply(LlmReply::tool_calls(vec![ToolCall {
            name: name.to_string(),
            args,
        }]))
    }

    pub fn with_error(self, err: LlmError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn push(&self, reply: Result<LlmReply, LlmError>) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(reply);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_contents(&self) -> Vec<PlannerTurn> {
        self.last_contents
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        _system: &str,
        contents: &[PlannerTurn],
        _tools: &[ToolDeclaration],
    ) -> Result<LlmReply, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_contents.lock() {
            *last = contents.to_vec();
        }

        let scripted = self.script.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(reply) = scripted {
            return reply;
        }

        let last_user = contents
            .iter()
            .rev()
            .find(|t| t.role == PlannerRole::User)
            .map(|t| t.text.as_str())
            .unwrap_or("(no input)");
        Ok(LlmReply::text(format!("Echo from Mock: {last_user}")))
    }

    fn model(&self) -> &str {
        "mock"
    }
}
