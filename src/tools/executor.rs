//! 动作执行器
//!
//! 对已确认的 PendingAction 做穷尽 match 分派到 WorkspaceClient，整次分派施加超时；每次分派输出结构化审计日志（JSON）。
//! 重试在 WorkspaceClient 内按单个请求进行（见 RetryPolicy）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{ExecutorError, WorkspaceError};
use crate::tools::PendingAction;
use crate::workspace::{Credential, RetryPolicy, WorkspaceClient};

/// 执行器：无状态，仅持有客户端与超时
pub struct ActionExecutor {
    workspace: WorkspaceClient,
    timeout: Duration,
}

impl ActionExecutor {
    pub fn new(workspace: WorkspaceClient, timeout_secs: u64) -> Self {
        Self {
            workspace,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.workspace = self.workspace.with_retry(retry);
        self
    }

    /// 执行动作，返回外部 API 的响应体
    pub async fn execute(&self, action: &PendingAction, credential: &Credential) -> Result<Value, ExecutorError> {
        let tool = action.tool_name();
        let start = Instant::now();

        let result = match timeout(self.timeout, self.dispatch(action, credential)).await {
            Err(_) => Err(ExecutorError::Timeout(tool)),
            Ok(Ok(body)) => Ok(body),
            Ok(Err(source)) => Err(ExecutorError::Workspace { tool, source }),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ExecutorError::Timeout(_)) => "timeout",
            Err(e) if e.is_auth_failure() => "unauthorized",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "tool": tool.as_str(),
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(action),
        });
        tracing::info!(audit = %audit.to_string(), "action");

        result
    }

    async fn dispatch(&self, action: &PendingAction, credential: &Credential) -> Result<Value, WorkspaceError> {
        match action {
            PendingAction::SendEmail(args) => self.workspace.send_email(args, credential).await,
            PendingAction::CreateCalendarEvent(args) => {
                self.workspace.create_calendar_event(args, credential).await
            }
            PendingAction::CreateGoogleDoc(args) => self.workspace.create_document(args, credential).await,
        }
    }
}

fn args_preview(action: &PendingAction) -> String {
    let s = serde_json::to_value(action)
        .map(|v| v["arguments"].to_string())
        .unwrap_or_default();
    crate::core::error::truncate(&s, 200)
}
