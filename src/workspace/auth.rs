//! 凭证与登出吊销
//!
//! Credential 只在会话内存活，不落盘、不修改；替换只发生在重新登录时。
//! 交互式授权不在本 crate 内，调用方拿到 access token 后构造 Credential。

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;

use crate::core::{ExternalApiError, WorkspaceError};

pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// OAuth scope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    MailModify,
    Calendar,
    Drive,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::MailModify, Scope::Calendar, Scope::Drive];

    pub fn url(&self) -> &'static str {
        match self {
            Scope::MailModify => "https://www.googleapis.com/auth/gmail.modify",
            Scope::Calendar => "https://www.googleapis.com/auth/calendar",
            Scope::Drive => "https://www.googleapis.com/auth/drive",
        }
    }

    /// 授权请求里的空格分隔 scope 串
    pub fn request_string() -> String {
        Scope::ALL
            .iter()
            .map(Scope::url)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 不透明的 Bearer 凭证
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    scopes: Vec<Scope>,
}

impl Credential {
    /// 默认携带全部三个 scope
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_scopes(token, Scope::ALL.to_vec())
    }

    pub fn with_scopes(token: impl Into<String>, scopes: Vec<Scope>) -> Self {
        Self {
            token: token.into(),
            scopes,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// 登出时吊销 token
#[async_trait]
pub trait TokenRevoker: Send + Sync {
    async fn revoke(&self, credential: &Credential) -> Result<(), WorkspaceError>;
}

/// 调用 Google OAuth2 revoke 端点
pub struct GoogleRevoker {
    client: Client,
    revoke_url: String,
}

impl GoogleRevoker {
    pub fn new(client: Client, revoke_url: Option<&str>) -> Self {
        Self {
            client,
            revoke_url: revoke_url.unwrap_or(GOOGLE_REVOKE_URL).to_string(),
        }
    }
}

#[async_trait]
impl TokenRevoker for GoogleRevoker {
    async fn revoke(&self, credential: &Credential) -> Result<(), WorkspaceError> {
        // token 只放在表单体里；错误信息不带 URL
        let resp = self
            .client
            .post(&self.revoke_url)
            .form(&[("token", credential.token())])
            .send()
            .await
            .map_err(|e| WorkspaceError::Transport(e.without_url().to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ExternalApiError::from_body(status.as_u16(), &body).into())
    }
}

/// 不做任何事的吊销器（离线运行 / 测试）
#[derive(Debug, Default)]
pub struct NoopRevoker;

#[async_trait]
impl TokenRevoker for NoopRevoker {
    async fn revoke(&self, _credential: &Credential) -> Result<(), WorkspaceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let cred = Credential::new("ya29.secret-token");
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_revoke_failure_does_not_leak_token() {
        let revoker = GoogleRevoker::new(Client::new(), Some("http://127.0.0.1:1/revoke"));
        let err = revoker
            .revoke(&Credential::new("ya29.SECRET"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Transport(_)));
        let text = err.to_string();
        assert!(!text.contains("SECRET"), "token leaked: {text}");
        assert!(!format!("{err:?}").contains("SECRET"));
    }

    #[test]
    fn test_default_scopes() {
        let cred = Credential::new("t");
        assert!(cred.has_scope(Scope::MailModify));
        assert!(cred.has_scope(Scope::Calendar));
        assert!(cred.has_scope(Scope::Drive));
        assert!(Scope::request_string().contains("gmail.modify"));
    }
}
