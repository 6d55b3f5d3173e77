//! 会话运行时：主控循环
//!
//! 负责：加载配置、创建 LLM / Planner / Executor / Feed 聚合器、建立 cmd/state 两个通道，
//! 并在唯一的后台任务中逐条消费命令、驱动 Session、发布 UiState 投影。命令严格串行处理。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{load_config, AppConfig};
use crate::core::session::{DecisionOutcome, FeedRefresh, SessionServices};
use crate::core::{RecoveryEngine, Session, SessionError, SessionPhase, SessionSupervisor, UiState};
use crate::llm::{create_deepseek_client, GeminiClient, LlmClient, LlmError, MockLlmClient, OpenAiClient, GEMINI_FLASH};
use crate::planner::{Planner, DEFAULT_SYSTEM_PROMPT};
use crate::tools::ActionExecutor;
use crate::workspace::{
    Credential, FeedAggregator, FeedLimits, GoogleRevoker, HttpTransport, RetryPolicy, WorkspaceClient,
    WorkspaceEndpoints,
};

/// 从前端发往会话运行时的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 用拿到的 access token 登录（随后自动刷新 Feed）
    SignIn(Credential),
    SignOut,
    RefreshFeed,
    /// 提交用户输入
    Submit(String),
    /// 以 Feed 条目发起对话
    SelectFeedItem(String),
    /// 批准待确认动作
    Approve,
    /// 取消待确认动作
    Reject,
    Quit,
}

fn env_key(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| std::env::var(n).ok())
        .filter(|k| !k.trim().is_empty())
}

/// 根据配置与环境变量选择 LLM 后端（Gemini / OpenAI 兼容 / DeepSeek / Mock）
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request;
    let model = cfg.llm.model.as_deref();
    let base = cfg.llm.base_url.as_deref();

    let built: Option<Result<Arc<dyn LlmClient>, LlmError>> = match provider.as_str() {
        "gemini" => env_key(&["GEMINI_API_KEY", "API_KEY"]).map(|key| {
            GeminiClient::new(base, model.unwrap_or(GEMINI_FLASH), &key, timeout)
                .map(|c| Arc::new(c) as Arc<dyn LlmClient>)
        }),
        "openai" => env_key(&["OPENAI_API_KEY"]).map(|key| {
            OpenAiClient::new(base, model.unwrap_or("gpt-4o-mini"), &key, timeout)
                .map(|c| Arc::new(c) as Arc<dyn LlmClient>)
        }),
        // 只有 OpenAI Key 时也走 DeepSeek 兼容端点
        "deepseek" => env_key(&["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]).map(|key| {
            create_deepseek_client(model, &key, timeout).map(|c| Arc::new(c) as Arc<dyn LlmClient>)
        }),
        other => {
            tracing::warn!("Unknown LLM provider '{}'", other);
            None
        }
    };

    match built {
        Some(Ok(client)) => {
            tracing::info!("Using {} LLM ({})", provider, client.model());
            client
        }
        Some(Err(e)) => {
            tracing::warn!("Failed to build {} client ({}), using Mock LLM", provider, e);
            Arc::new(MockLlmClient::new())
        }
        None => {
            tracing::warn!("No API key set for provider '{}', using Mock LLM", provider);
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 按配置组装 Session（真实 HTTP 传输）
pub fn build_session(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> anyhow::Result<Session> {
    let ws = &cfg.workspace;
    let transport = Arc::new(HttpTransport::new(ws.request_timeout_secs)?);
    let endpoints = WorkspaceEndpoints {
        api_base: ws.api_base.clone(),
        docs_api_base: ws.docs_api_base.clone(),
        timezone: ws.timezone.clone(),
    };

    let executor = ActionExecutor::new(WorkspaceClient::new(transport.clone(), endpoints), ws.request_timeout_secs)
        .with_retry(RetryPolicy {
            max_retries: ws.retry.max_retries,
            base_delay: Duration::from_millis(ws.retry.base_delay_ms),
        });
    let feed = FeedAggregator::new(
        transport.clone(),
        ws.api_base.clone(),
        FeedLimits {
            max_emails: cfg.feed.max_emails,
            max_events: cfg.feed.max_events,
            max_files: cfg.feed.max_files,
        },
    );
    let revoker = Arc::new(GoogleRevoker::new(
        transport.client().clone(),
        cfg.auth.revoke_url.as_deref(),
    ));
    let system_prompt = cfg
        .llm
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let planner = Planner::new(llm, system_prompt).with_max_context_turns(cfg.app.max_history_turns);

    let mut session = Session::new(SessionServices {
        planner,
        executor,
        feed,
        revoker,
        recovery: RecoveryEngine::new(cfg.session.invalidate_on),
    });
    if cfg.auth.client_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
        session.notice_missing_client_id();
    }
    Ok(session)
}

/// 创建会话运行时：返回命令发送端与状态接收端；Ctrl+C 会停止后台任务
pub async fn create_session_runtime(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(mpsc::UnboundedSender<Command>, watch::Receiver<UiState>)> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let llm = create_llm_from_config(&cfg);
    let session = build_session(&cfg, llm)?;
    let supervisor = SessionSupervisor::new();
    supervisor.cancel_on_ctrl_c();

    let (cmd_tx, state_rx, _handle) = spawn_session(session, supervisor);
    Ok((cmd_tx, state_rx))
}

/// 在后台任务中运行已组装好的 Session
pub fn spawn_session(
    mut session: Session,
    supervisor: SessionSupervisor,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>, JoinHandle<()>) {
    // 两通道：前端 -> Core 命令；Core -> 前端状态快照
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(UiState::project(&session, None, None));
    let cancel = supervisor.cancel_token();

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };  // cmd_tx 已关闭
                    if matches!(cmd, Command::Quit) {
                        supervisor.cancel();
                        break;
                    }
                    handle_command(&mut session, cmd, &state_tx).await;
                }
            }
        }
        tracing::info!("Session runtime stopped");
    });

    (cmd_tx, state_rx, handle)
}

fn publish(state_tx: &watch::Sender<UiState>, session: &Session, in_flight: Option<SessionPhase>, notice: Option<String>) {
    let _ = state_tx.send(UiState::project(session, in_flight, notice));
}

fn precondition_notice(err: SessionError) -> Option<String> {
    tracing::warn!(error = %err, "Command rejected");
    Some(err.to_string())
}

/// 只有真正会调用 Planner 的命令才发布 Thinking
fn starts_planning(session: &Session, cmd: &Command) -> bool {
    let ready = session.is_signed_in() && session.pending().is_none();
    match cmd {
        Command::Submit(text) => ready && !text.trim().is_empty(),
        Command::SelectFeedItem(id) => ready && session.feed().iter().any(|item| &item.id == id),
        _ => false,
    }
}

async fn handle_command(session: &mut Session, cmd: Command, state_tx: &watch::Sender<UiState>) {
    let planning = starts_planning(session, &cmd);
    match cmd {
        Command::SignIn(credential) => {
            session.sign_in(credential);
            refresh_feed(session, state_tx).await;
        }
        Command::SignOut => {
            session.logout().await;
            publish(state_tx, session, None, None);
        }
        Command::RefreshFeed => refresh_feed(session, state_tx).await,
        Command::Submit(text) => {
            if planning {
                publish(state_tx, session, Some(SessionPhase::Thinking), None);
            }
            let notice = session.submit_user_message(&text).await.err().and_then(precondition_notice);
            publish(state_tx, session, None, notice);
        }
        Command::SelectFeedItem(id) => {
            if planning {
                publish(state_tx, session, Some(SessionPhase::Thinking), None);
            }
            let notice = session.select_feed_item(&id).await.err().and_then(precondition_notice);
            publish(state_tx, session, None, notice);
        }
        Command::Approve => {
            if session.pending().is_some() {
                publish(state_tx, session, Some(SessionPhase::Executing), None);
            }
            let notice = match session.decide_pending(true).await {
                Ok(DecisionOutcome::Failed { message, .. }) => Some(message),
                Ok(_) => None,
                Err(e) => precondition_notice(e),
            };
            publish(state_tx, session, None, notice);
        }
        Command::Reject => {
            let notice = session.decide_pending(false).await.err().and_then(precondition_notice);
            publish(state_tx, session, None, notice);
        }
        // 在循环中处理
        Command::Quit => {}
    }
}

async fn refresh_feed(session: &mut Session, state_tx: &watch::Sender<UiState>) {
    if session.is_signed_in() {
        publish(state_tx, session, Some(SessionPhase::LoadingFeed), None);
    }
    let notice = match session.refresh_feed().await {
        Ok(FeedRefresh::Loaded(_)) => None,
        Ok(FeedRefresh::Failed(message)) => Some(message),
        Err(e) => precondition_notice(e),
    };
    publish(state_tx, session, None, notice);
}
