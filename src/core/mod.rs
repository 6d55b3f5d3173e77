//! 核心编排层：错误与恢复、会话聚合、状态投影、会话监管、主控循环

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session;
pub mod session_supervisor;
pub mod state;

pub use error::{
    ExecutorError, ExternalApiError, FeedError, PlannerError, SessionError, ValidationError, WorkspaceError,
};
pub use orchestrator::{build_session, create_session_runtime, spawn_session, Command};
pub use recovery::{InvalidateOn, RecoveryAction, RecoveryEngine};
pub use session::{DecisionOutcome, Dispatch, FeedRefresh, Session, SessionServices, SubmitOutcome};
pub use session_supervisor::SessionSupervisor;
pub use state::{PendingPreview, SessionPhase, UiState};
