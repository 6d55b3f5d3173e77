//! 错误类型
//!
//! 每层一个枚举：Planner（可恢复为 assistant Turn）、校验（暂存前拒绝）、执行器（外部 API 非 2xx 等）、
//! Feed（聚合失败）、会话前置条件。没有任何错误会终止进程；每条错误路径都落到一条可见 Turn 或 notice。

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ToolName;

/// Planner 调用失败（网络 / 配额 / 响应格式）
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// 工具提议未通过目录校验
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("{0} arguments must be an object")]
    NotAnObject(ToolName),

    #[error("{tool} is missing required field '{field}'")]
    MissingField { tool: ToolName, field: &'static str },

    #[error("{tool} field '{field}' must be {expected}")]
    WrongType {
        tool: ToolName,
        field: &'static str,
        expected: &'static str,
    },

    #[error("{tool} field '{field}' must be {expected}, got '{value}'")]
    InvalidFormat {
        tool: ToolName,
        field: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// 外部账户 API 返回非 2xx
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("HTTP {status}: {message}")]
pub struct ExternalApiError {
    pub status: u16,
    pub message: String,
}

impl ExternalApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 从响应体中提取 `error.message`，取不到时用截断后的原文
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    "Google API request failed".to_string()
                } else {
                    truncate(body, 300)
                }
            });
        Self { status, message }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, 401 | 403)
    }

    /// 5xx 与 429 可重试
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || (500..=599).contains(&self.status)
    }
}

/// Workspace 请求失败（执行器与 Feed 共用）
#[derive(Error, Debug, Clone)]
pub enum WorkspaceError {
    #[error("{0}")]
    Api(#[from] ExternalApiError),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl WorkspaceError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, WorkspaceError::Api(e) if e.is_auth_failure())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            WorkspaceError::Api(e) => e.is_retryable(),
            WorkspaceError::Transport(_) => true,
            WorkspaceError::Decode(_) => false,
        }
    }
}

/// 执行器错误
#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    #[error("{tool} failed: {source}")]
    Workspace {
        tool: ToolName,
        #[source]
        source: WorkspaceError,
    },

    #[error("{0} timed out")]
    Timeout(ToolName),
}

impl ExecutorError {
    pub fn tool(&self) -> ToolName {
        match self {
            ExecutorError::Workspace { tool, .. } | ExecutorError::Timeout(tool) => *tool,
        }
    }

    /// 401/403：凭证失效
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ExecutorError::Workspace { source, .. } if source.is_auth_failure())
    }
}

/// Feed 聚合失败（任一子请求失败即整体失败）
#[derive(Error, Debug, Clone)]
#[error("feed {source_name} fetch failed: {source}")]
pub struct FeedError {
    pub source_name: &'static str,
    #[source]
    pub source: WorkspaceError,
}

/// 会话操作的前置条件不满足
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("not signed in")]
    SignedOut,

    #[error("another request is still in flight")]
    Busy,

    #[error("a confirmation is already pending; approve or cancel it first")]
    ConfirmationPending,

    #[error("no action is awaiting confirmation")]
    NoPendingAction,

    #[error("unknown feed item '{0}'")]
    UnknownFeedItem(String),
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
