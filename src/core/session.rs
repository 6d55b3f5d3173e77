//! 会话聚合：对话历史、唯一的待确认槽位、busy 标记、凭证与 Feed
//!
//! 所有修改都经由 `&mut self` 方法，借用规则保证同一时刻只有一个 Planner / Executor 调用在进行。
//! 每条错误路径都会落到一条可见 Turn（或返回给调用方的 notice），并清理 pending / busy。

use std::sync::Arc;

use crate::core::recovery::{RecoveryAction, RecoveryEngine};
use crate::core::{ExecutorError, SessionError, ValidationError};
use crate::memory::{Conversation, Turn};
use crate::planner::{Planner, PlannerOutput};
use crate::tools::{ActionExecutor, PendingAction, ToolName};
use crate::workspace::{Credential, FeedAggregator, FeedItem, TokenRevoker};

/// 会话中出现的固定文案
pub mod messages {
    use crate::tools::ToolName;

    pub const SIGNED_OUT_GREETING: &str = "Hello! Please sign in to connect your Google Workspace.";
    pub const SIGNED_IN_GREETING: &str =
        "Successfully connected! How can I help you with your Google Workspace today?";
    pub const LOGGED_OUT: &str = "You have been logged out. Please sign in to connect your Google Workspace.";
    pub const PROPOSAL_ACK: &str = "I can do that. Please review the details before I proceed.";
    pub const EMPTY_REPLY_FALLBACK: &str = "I'm sorry, I couldn't process that.";
    pub const PLANNER_ERROR: &str = "There was an error communicating with the AI. Please check your API key.";
    pub const ACTION_CANCELLED: &str = "Action cancelled.";
    pub const EXECUTION_FAILED: &str =
        "Error: Could not execute the action. Your session may have expired. Please try signing in again.";
    pub const FEED_FAILED: &str =
        "Could not load activity feed. Your session might have expired. Please sign in again.";
    pub const MISSING_CLIENT_ID: &str =
        "Configuration needed: set auth.client_id (or QUILL__AUTH__CLIENT_ID) for sign-in to work.";

    pub fn success(tool: ToolName) -> &'static str {
        match tool {
            ToolName::SendEmail => "Email sent successfully.",
            ToolName::CreateCalendarEvent => "Calendar event created successfully.",
            ToolName::CreateGoogleDoc => "Google Doc created successfully.",
        }
    }

    pub fn validation_failed(reason: impl std::fmt::Display) -> String {
        format!("I couldn't prepare that action: {reason}")
    }

    pub fn recoverable_failure(error: impl std::fmt::Display) -> String {
        format!("Error: Could not execute the action ({error}). Please try again.")
    }
}

/// submit_user_message 的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 空白输入，什么也没发生
    Ignored,
    Replied,
    /// 提议已校验并进入待确认槽位
    ActionProposed(ToolName),
    ProposalRejected(ValidationError),
    PlannerFailed,
}

/// decide_pending 的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Cancelled,
    Completed(ToolName),
    /// `session_reset` 为 true 时历史已被重置，`message` 是重置前追加的失败文案
    Failed { message: String, session_reset: bool },
}

/// refresh_feed 的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedRefresh {
    Loaded(usize),
    /// 拉取失败，会话已重置；附带失败文案
    Failed(String),
}

/// 已从待确认槽位取出、正在执行的动作
#[derive(Debug)]
pub struct Dispatch {
    pub action: PendingAction,
    pub credential: Credential,
}

/// 会话依赖的协作者
pub struct SessionServices {
    pub planner: Planner,
    pub executor: ActionExecutor,
    pub feed: FeedAggregator,
    pub revoker: Arc<dyn TokenRevoker>,
    pub recovery: RecoveryEngine,
}

pub struct Session {
    history: Conversation,
    pending: Option<PendingAction>,
    busy: bool,
    credential: Option<Credential>,
    feed: Vec<FeedItem>,
    services: SessionServices,
}

impl Session {
    /// 未登录状态：历史只有一条问候
    pub fn new(services: SessionServices) -> Self {
        Self {
            history: Conversation::starting_with(Turn::assistant(messages::SIGNED_OUT_GREETING)),
            pending: None,
            busy: false,
            credential: None,
            feed: Vec::new(),
            services,
        }
    }

    pub fn history(&self) -> &Conversation {
        &self.history
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_signed_in(&self) -> bool {
        self.credential.is_some()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn feed(&self) -> &[FeedItem] {
        &self.feed
    }

    /// 未配置 client id 时在未登录历史里追加提示
    pub fn notice_missing_client_id(&mut self) {
        if !self.is_signed_in() {
            self.history.push(Turn::system(messages::MISSING_CLIENT_ID));
        }
    }

    /// 登录：整体替换会话状态
    pub fn sign_in(&mut self, credential: Credential) {
        tracing::info!(scopes = ?credential.scopes(), "Signed in");
        self.credential = Some(credential);
        self.pending = None;
        self.busy = false;
        self.feed.clear();
        self.history.reset_to(Turn::assistant(messages::SIGNED_IN_GREETING));
    }

    /// 登出：尽力吊销 token，然后重置会话
    pub async fn logout(&mut self) {
        if let Some(credential) = &self.credential {
            if let Err(e) = self.services.revoker.revoke(credential).await {
                tracing::warn!(error = %e, "Token revoke failed");
            }
        }
        self.reset();
        tracing::info!("Logged out");
    }

    /// 用户消息 -> Planner -> 回复 / 提议
    pub async fn submit_user_message(&mut self, text: &str) -> Result<SubmitOutcome, SessionError> {
        if text.trim().is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }
        if !self.is_signed_in() {
            return Err(SessionError::SignedOut);
        }
        if self.busy {
            return Err(SessionError::Busy);
        }
        if self.pending.is_some() {
            return Err(SessionError::ConfirmationPending);
        }

        self.history.push(Turn::user(text));
        self.busy = true;
        let planned = self.services.planner.plan(&self.history).await;
        let outcome = match planned {
            Ok(PlannerOutput::ToolCalls(calls)) => {
                if calls.len() > 1 {
                    tracing::warn!(
                        discarded = ?calls[1..].iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                        "Planner proposed several tool calls; keeping only the first"
                    );
                }
                // ToolCalls 保证非空
                match calls.first().map(PendingAction::from_tool_call) {
                    Some(Ok(action)) => {
                        let tool = action.tool_name();
                        tracing::info!(tool = %tool, "Action staged for confirmation");
                        self.history
                            .push(Turn::proposal(messages::PROPOSAL_ACK, action.clone()));
                        self.pending = Some(action);
                        SubmitOutcome::ActionProposed(tool)
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Rejected tool proposal");
                        self.history
                            .push(Turn::assistant(messages::validation_failed(&e)));
                        SubmitOutcome::ProposalRejected(e)
                    }
                    None => {
                        self.history
                            .push(Turn::assistant(messages::EMPTY_REPLY_FALLBACK));
                        SubmitOutcome::Replied
                    }
                }
            }
            Ok(PlannerOutput::Reply(text)) => {
                let content = text
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| messages::EMPTY_REPLY_FALLBACK.to_string());
                self.history.push(Turn::assistant(content));
                SubmitOutcome::Replied
            }
            Err(e) => {
                tracing::error!(error = %e, "Planner failed");
                self.history.push(Turn::assistant(messages::PLANNER_ERROR));
                SubmitOutcome::PlannerFailed
            }
        };
        self.busy = false;
        Ok(outcome)
    }

    /// 对待确认动作做出决定；批准时执行器调用前槽位已被清空
    pub async fn decide_pending(&mut self, approve: bool) -> Result<DecisionOutcome, SessionError> {
        if !approve {
            return self.cancel_pending();
        }
        let dispatch = self.begin_dispatch()?;
        let result = self
            .services
            .executor
            .execute(&dispatch.action, &dispatch.credential)
            .await
            .map(|_| ());
        Ok(self.complete_dispatch(dispatch, result))
    }

    fn cancel_pending(&mut self) -> Result<DecisionOutcome, SessionError> {
        let action = self.pending.take().ok_or(SessionError::NoPendingAction)?;
        tracing::info!(tool = %action.tool_name(), "Action cancelled");
        self.history.push(Turn::system(messages::ACTION_CANCELLED));
        Ok(DecisionOutcome::Cancelled)
    }

    /// 取出待确认动作并置 busy
    pub fn begin_dispatch(&mut self) -> Result<Dispatch, SessionError> {
        if self.pending.is_none() {
            return Err(SessionError::NoPendingAction);
        }
        let credential = self.credential.clone().ok_or(SessionError::SignedOut)?;
        let action = self.pending.take().ok_or(SessionError::NoPendingAction)?;
        self.busy = true;
        tracing::info!(tool = %action.tool_name(), "Dispatching approved action");
        Ok(Dispatch { action, credential })
    }

    /// 根据执行结果追加 Turn；失败时按恢复策略决定是否重置会话
    pub fn complete_dispatch(&mut self, dispatch: Dispatch, result: Result<(), ExecutorError>) -> DecisionOutcome {
        self.busy = false;
        let tool = dispatch.action.tool_name();
        match result {
            Ok(()) => {
                self.history.push(Turn::system(messages::success(tool)));
                DecisionOutcome::Completed(tool)
            }
            Err(e) => {
                tracing::error!(tool = %tool, error = %e, "Action failed");
                match self.services.recovery.handle(&e) {
                    RecoveryAction::InvalidateSession => {
                        self.history.push(Turn::system(messages::EXECUTION_FAILED));
                        self.reset();
                        DecisionOutcome::Failed {
                            message: messages::EXECUTION_FAILED.to_string(),
                            session_reset: true,
                        }
                    }
                    RecoveryAction::Report(reason) => {
                        let message = messages::recoverable_failure(reason);
                        self.history.push(Turn::system(message.clone()));
                        DecisionOutcome::Failed {
                            message,
                            session_reset: false,
                        }
                    }
                }
            }
        }
    }

    /// 重新拉取 Feed；失败时重置会话
    pub async fn refresh_feed(&mut self) -> Result<FeedRefresh, SessionError> {
        let Some(credential) = &self.credential else {
            return Err(SessionError::SignedOut);
        };
        match self.services.feed.get_feed(credential).await {
            Ok(items) => {
                let count = items.len();
                self.feed = items;
                Ok(FeedRefresh::Loaded(count))
            }
            Err(e) => {
                tracing::error!(error = %e, "Feed refresh failed");
                self.history.push(Turn::system(messages::FEED_FAILED));
                self.reset();
                Ok(FeedRefresh::Failed(messages::FEED_FAILED.to_string()))
            }
        }
    }

    /// 以 Feed 条目的 prompt 发起一轮对话
    pub async fn select_feed_item(&mut self, id: &str) -> Result<SubmitOutcome, SessionError> {
        let prompt = self
            .feed
            .iter()
            .find(|item| item.id == id)
            .map(FeedItem::prompt)
            .ok_or_else(|| SessionError::UnknownFeedItem(id.to_string()))?;
        self.submit_user_message(&prompt).await
    }

    fn reset(&mut self) {
        self.credential = None;
        self.pending = None;
        self.busy = false;
        self.feed.clear();
        self.history.reset_to(Turn::assistant(messages::LOGGED_OUT));
    }
}


#[cfg(test)]
mod tests {
    use super::testing::session_with;
    use super::*;
    use crate::core::recovery::InvalidateOn;
    use crate::core::{ExternalApiError, WorkspaceError};
    use crate::llm::{LlmError, LlmReply, MockLlmClient};
    use crate::memory::Author;
    use crate::tools::ToolCall;
    use crate::workspace::testing::RecordingTransport;
    use serde_json::json;

    fn email_args() -> serde_json::Value {
        json!({"to": "bob@x.com", "subject": "Lunch", "body": "..."})
    }

    fn signed_in(llm: Arc<MockLlmClient>, transport: Arc<RecordingTransport>) -> Session {
        let mut s = session_with(llm, transport, InvalidateOn::AnyError);
        s.sign_in(Credential::new("token"));
        s
    }

    #[tokio::test]
    async fn test_whitespace_submit_is_noop() {
        let llm = Arc::new(MockLlmClient::new());
        let mut s = signed_in(llm.clone(), Arc::new(RecordingTransport::new()));
        assert_eq!(s.submit_user_message("").await.unwrap(), SubmitOutcome::Ignored);
        assert_eq!(s.submit_user_message("  \n\t").await.unwrap(), SubmitOutcome::Ignored);
        assert_eq!(s.history().len(), 1);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_requires_sign_in() {
        let llm = Arc::new(MockLlmClient::new());
        let mut s = session_with(llm.clone(), Arc::new(RecordingTransport::new()), InvalidateOn::AnyError);
        assert_eq!(s.submit_user_message("hi").await, Err(SessionError::SignedOut));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_text_reply_appends_one_assistant_turn() {
        let llm = Arc::new(MockLlmClient::new().with_text("Sure, here you go."));
        let mut s = signed_in(llm, Arc::new(RecordingTransport::new()));
        assert_eq!(s.submit_user_message("hello").await.unwrap(), SubmitOutcome::Replied);

        let turns = s.history().turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].author, Author::User);
        assert_eq!(turns[2].author, Author::Assistant);
        assert_eq!(turns[2].content, "Sure, here you go.");
        assert!(s.pending().is_none());
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn test_empty_reply_uses_fallback() {
        let llm = Arc::new(MockLlmClient::new().with_reply(LlmReply::default()));
        let mut s = signed_in(llm, Arc::new(RecordingTransport::new()));
        s.submit_user_message("hello").await.unwrap();
        assert_eq!(s.history().last().unwrap().content, messages::EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn test_planner_error_becomes_turn() {
        let llm = Arc::new(MockLlmClient::new().with_error(LlmError::Network("down".into())));
        let mut s = signed_in(llm, Arc::new(RecordingTransport::new()));
        assert_eq!(s.submit_user_message("hello").await.unwrap(), SubmitOutcome::PlannerFailed);
        let last = s.history().last().unwrap();
        assert_eq!(last.author, Author::Assistant);
        assert_eq!(last.content, messages::PLANNER_ERROR);
        assert!(s.pending().is_none());
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn test_scenario_a_email_round_trip() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call("send_email", email_args()));
        let transport = Arc::new(RecordingTransport::new().route("/messages/send", Ok(json!({"id": "sent-1"}))));
        let mut s = signed_in(llm, transport.clone());

        let outcome = s.submit_user_message("email bob@x.com about lunch").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::ActionProposed(ToolName::SendEmail));
        let ack = s.history().last().unwrap();
        assert_eq!(ack.content, messages::PROPOSAL_ACK);
        assert_eq!(
            ack.pending_action.as_ref().map(PendingAction::tool_name),
            Some(ToolName::SendEmail)
        );
        assert!(s.pending().is_some());

        let decision = s.decide_pending(true).await.unwrap();
        assert_eq!(decision, DecisionOutcome::Completed(ToolName::SendEmail));
        let reqs = transport.recorded();
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].url.ends_with("/gmail/v1/users/me/messages/send"));
        let last = s.history().last().unwrap();
        assert_eq!(last.author, Author::System);
        assert_eq!(last.content, "Email sent successfully.");
        assert!(s.pending().is_none());
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn test_scenario_b_unauthorized_resets_session() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call("send_email", email_args()));
        let transport = Arc::new(RecordingTransport::new().route(
            "/messages/send",
            Err(WorkspaceError::Api(ExternalApiError::new(401, "invalid credentials"))),
        ));
        let mut s = signed_in(llm, transport);
        s.submit_user_message("email bob").await.unwrap();

        match s.decide_pending(true).await.unwrap() {
            DecisionOutcome::Failed {
                message,
                session_reset,
            } => {
                assert!(message.starts_with("Error:"));
                assert!(session_reset);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!s.is_signed_in());
        assert!(s.feed().is_empty());
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history().turns()[0].content, messages::LOGGED_OUT);
        assert!(s.pending().is_none());
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn test_auth_policy_keeps_session_on_server_error() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call("send_email", email_args()));
        let transport = Arc::new(RecordingTransport::new().route(
            "/messages/send",
            Err(WorkspaceError::Api(ExternalApiError::new(500, "backend error"))),
        ));
        let mut s = session_with(llm, transport, InvalidateOn::AuthError);
        s.sign_in(Credential::new("token"));
        s.submit_user_message("email bob").await.unwrap();

        let decision = s.decide_pending(true).await.unwrap();
        assert!(matches!(decision, DecisionOutcome::Failed { session_reset: false, .. }));
        assert!(s.is_signed_in());
        assert!(s.history().last().unwrap().content.starts_with("Error: Could not execute the action ("));
    }

    #[tokio::test]
    async fn test_reject_clears_pending_without_executor_call() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call("send_email", email_args()));
        let transport = Arc::new(RecordingTransport::new());
        let mut s = signed_in(llm, transport.clone());
        s.submit_user_message("email bob").await.unwrap();

        assert_eq!(s.decide_pending(false).await.unwrap(), DecisionOutcome::Cancelled);
        assert!(s.pending().is_none());
        assert_eq!(s.history().last().unwrap().content, "Action cancelled.");
        assert!(transport.recorded().is_empty());
        assert_eq!(s.decide_pending(false).await, Err(SessionError::NoPendingAction));
    }

    #[tokio::test]
    async fn test_pending_cleared_before_executor_returns() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call("send_email", email_args()));
        let mut s = signed_in(llm, Arc::new(RecordingTransport::new()));
        s.submit_user_message("email bob").await.unwrap();

        let dispatch = s.begin_dispatch().unwrap();
        assert!(s.pending().is_none());
        assert!(s.is_busy());
        assert_eq!(s.decide_pending(true).await, Err(SessionError::NoPendingAction));
        assert_eq!(s.submit_user_message("again").await, Err(SessionError::Busy));

        let outcome = s.complete_dispatch(dispatch, Ok(()));
        assert_eq!(outcome, DecisionOutcome::Completed(ToolName::SendEmail));
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn test_submit_while_confirmation_pending_rejected() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call("send_email", email_args()));
        let mut s = signed_in(llm.clone(), Arc::new(RecordingTransport::new()));
        s.submit_user_message("email bob").await.unwrap();
        let len = s.history().len();
        assert_eq!(
            s.submit_user_message("actually, wait").await,
            Err(SessionError::ConfirmationPending)
        );
        assert_eq!(s.history().len(), len);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_multiple_proposals_keep_first() {
        let llm = Arc::new(MockLlmClient::new().with_reply(LlmReply::tool_calls(vec![
            ToolCall {
                name: "create_google_doc".into(),
                args: json!({"title": "Notes"}),
            },
            ToolCall {
                name: "send_email".into(),
                args: email_args(),
            },
        ])));
        let mut s = signed_in(llm, Arc::new(RecordingTransport::new()));
        let outcome = s.submit_user_message("do both").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::ActionProposed(ToolName::CreateGoogleDoc));
        assert_eq!(s.pending().map(PendingAction::tool_name), Some(ToolName::CreateGoogleDoc));
        assert_eq!(s.history().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_proposal_not_staged() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call("send_email", json!({"to": "bob@x.com"})));
        let mut s = signed_in(llm, Arc::new(RecordingTransport::new()));
        let outcome = s.submit_user_message("email bob").await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::ProposalRejected(_)));
        assert!(s.pending().is_none());
        assert!(s
            .history()
            .last()
            .unwrap()
            .content
            .starts_with("I couldn't prepare that action:"));
    }

    #[tokio::test]
    async fn test_feed_failure_resets_session() {
        let llm = Arc::new(MockLlmClient::new());
        let transport = Arc::new(RecordingTransport::new().route(
            "/calendar/v3/",
            Err(WorkspaceError::Api(ExternalApiError::new(401, "expired"))),
        ));
        let mut s = signed_in(llm, transport);
        assert_eq!(
            s.refresh_feed().await.unwrap(),
            FeedRefresh::Failed(messages::FEED_FAILED.to_string())
        );
        assert!(!s.is_signed_in());
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.refresh_feed().await, Err(SessionError::SignedOut));
    }

    #[tokio::test]
    async fn test_select_feed_item_submits_prompt() {
        let llm = Arc::new(MockLlmClient::new().with_text("It is about Q3."));
        let transport = Arc::new(RecordingTransport::new().route(
            "/drive/v3/files",
            Ok(json!({"files": [{"id": "f1", "name": "Roadmap"}]})),
        ));
        let mut s = signed_in(llm, transport);
        assert_eq!(s.refresh_feed().await.unwrap(), FeedRefresh::Loaded(1));

        s.select_feed_item("f1").await.unwrap();
        let user_turn = &s.history().turns()[1];
        assert_eq!(
            user_turn.content,
            "Tell me more about \"Roadmap\". Context: About the document named \"Roadmap\" with ID f1"
        );
        assert_eq!(
            s.select_feed_item("missing").await,
            Err(SessionError::UnknownFeedItem("missing".into()))
        );
    }

    #[tokio::test]
    async fn test_logout_and_sign_in_replace_state() {
        let llm = Arc::new(MockLlmClient::new().with_tool_call("send_email", email_args()));
        let mut s = signed_in(llm, Arc::new(RecordingTransport::new()));
        s.submit_user_message("email bob").await.unwrap();

        s.logout().await;
        assert!(!s.is_signed_in());
        assert!(s.pending().is_none());
        assert_eq!(s.history().turns()[0].content, messages::LOGGED_OUT);

        s.sign_in(Credential::new("fresh"));
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history().turns()[0].content, messages::SIGNED_IN_GREETING);
    }

    #[test]
    fn test_missing_client_id_notice_only_when_signed_out() {
        let mut s = session_with(
            Arc::new(MockLlmClient::new()),
            Arc::new(RecordingTransport::new()),
            InvalidateOn::AnyError,
        );
        s.notice_missing_client_id();
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.history().last().unwrap().author, Author::System);
    }
}
