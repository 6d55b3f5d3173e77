//! 状态投影：UiState
//!
//! 前端只持有轻量的 UiState（阶段、历史、待确认预览、Feed、锁、提示）；完整状态在 Session 内，由运行时投影后发布。

use serde::Serialize;

use crate::core::Session;
use crate::memory::Turn;
use crate::tools::ToolName;
use crate::workspace::FeedItem;

/// 会话阶段（UI 投影用）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    #[default]
    SignedOut,
    Idle,
    Thinking,
    AwaitingConfirmation,
    Executing,
    LoadingFeed,
}

/// 待确认动作的展示信息
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingPreview {
    pub tool: ToolName,
    pub confirm_label: String,
    pub details: String,
}

/// UI 看到的「投影」状态
#[derive(Clone, Debug, Default, Serialize)]
pub struct UiState {
    pub phase: SessionPhase,
    pub history: Vec<Turn>,
    pub pending: Option<PendingPreview>,
    pub feed: Vec<FeedItem>,
    pub input_locked: bool,
    /// 最近一次操作的提示（前置条件不满足、会话被重置前的失败文案等）
    pub notice: Option<String>,
}

impl UiState {
    /// 从会话投影；`in_flight` 为运行时正在进行的长操作（Thinking / LoadingFeed / Executing）
    pub fn project(session: &Session, in_flight: Option<SessionPhase>, notice: Option<String>) -> Self {
        let phase = in_flight.unwrap_or_else(|| {
            if !session.is_signed_in() {
                SessionPhase::SignedOut
            } else if session.is_busy() {
                SessionPhase::Executing
            } else if session.pending().is_some() {
                SessionPhase::AwaitingConfirmation
            } else {
                SessionPhase::Idle
            }
        });
        let input_locked = !matches!(phase, SessionPhase::Idle);

        Self {
            phase,
            history: session.history().turns().to_vec(),
            pending: session.pending().map(|action| PendingPreview {
                tool: action.tool_name(),
                confirm_label: action.confirm_label().to_string(),
                details: action.preview(),
            }),
            feed: session.feed().to_vec(),
            input_locked,
            notice,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::recovery::InvalidateOn;
    use crate::core::session::testing::session_with;
    use crate::llm::MockLlmClient;
    use crate::workspace::testing::RecordingTransport;
    use crate::workspace::Credential;

    #[tokio::test]
    async fn test_projection_phases() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call(
            "create_google_doc",
            serde_json::json!({"title": "Notes", "content": "hello"}),
        ));
        let mut session = session_with(llm, Arc::new(RecordingTransport::new()), InvalidateOn::AnyError);

        let ui = UiState::project(&session, None, None);
        assert_eq!(ui.phase, SessionPhase::SignedOut);
        assert!(ui.input_locked);

        session.sign_in(Credential::new("t"));
        let ui = UiState::project(&session, None, None);
        assert_eq!(ui.phase, SessionPhase::Idle);
        assert!(!ui.input_locked);

        session.submit_user_message("make a doc").await.unwrap();
        let ui = UiState::project(&session, None, None);
        assert_eq!(ui.phase, SessionPhase::AwaitingConfirmation);
        let pending = ui.pending.unwrap();
        assert_eq!(pending.confirm_label, "Create Document");
        assert!(pending.details.contains("hello"));

        let ui = UiState::project(&session, Some(SessionPhase::Executing), Some("x".into()));
        assert_eq!(ui.phase, SessionPhase::Executing);
        assert_eq!(ui.notice.as_deref(), Some("x"));
    }
}
