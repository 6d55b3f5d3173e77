//! 错误恢复引擎
//!
//! 根据执行器错误与失效策略返回 RecoveryAction：整个会话作废（清凭证、清 Feed、重置历史），
//! 或仅向用户报告错误、保留会话。

use serde::{Deserialize, Serialize};

use crate::core::ExecutorError;

/// 哪些执行失败会让会话作废
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidateOn {
    /// 任何执行失败都视为凭证失效
    #[default]
    AnyError,
    /// 只有 401/403 才作废会话
    AuthError,
}

/// 执行失败后的处理动作
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    InvalidateSession,
    /// 保留会话，附带给用户的错误描述
    Report(String),
}

#[derive(Debug, Default)]
pub struct RecoveryEngine {
    policy: InvalidateOn,
}

impl RecoveryEngine {
    pub fn new(policy: InvalidateOn) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> InvalidateOn {
        self.policy
    }

    pub fn handle(&self, err: &ExecutorError) -> RecoveryAction {
        match self.policy {
            InvalidateOn::AnyError => RecoveryAction::InvalidateSession,
            InvalidateOn::AuthError if err.is_auth_failure() => RecoveryAction::InvalidateSession,
            InvalidateOn::AuthError => RecoveryAction::Report(err.to_string()),
        }
    }
}
