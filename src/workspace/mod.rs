//! Workspace 账户 API：请求构造、传输、写操作与 Feed 读取
//!
//! 所有调用都带 `Authorization: Bearer <token>` 与 `Content-Type: application/json`，非 2xx 统一转为
//! ExternalApiError。传输层是 trait，方便测试时记录请求而不触网。

pub mod auth;
pub mod calendar;
pub mod docs;
pub mod feed;
pub mod mail;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::core::{ExternalApiError, WorkspaceError};
use crate::tools::{DocArgs, EmailArgs, EventArgs};

pub use auth::{Credential, GoogleRevoker, NoopRevoker, Scope, TokenRevoker};
pub use feed::{FeedAggregator, FeedItem, FeedKind, FeedLimits};

pub const GOOGLE_API_BASE: &str = "https://www.googleapis.com";
pub const GOOGLE_DOCS_API_BASE: &str = "https://docs.googleapis.com";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// 一次 Workspace API 请求（URL 已含查询参数）
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// 拼接带查询参数的 URL
pub(crate) fn url_with_query(base: &str, params: &[(&str, &str)]) -> Result<String, WorkspaceError> {
    reqwest::Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| WorkspaceError::Transport(format!("invalid url {base}: {e}")))
}

/// 传输层：发送请求并返回 JSON 响应体（空响应体为 Null）
#[async_trait]
pub trait WorkspaceTransport: Send + Sync {
    async fn send(&self, request: ApiRequest, credential: &Credential) -> Result<Value, WorkspaceError>;
}

/// 基于 reqwest 的传输层
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64) -> Result<Self, WorkspaceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WorkspaceError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl WorkspaceTransport for HttpTransport {
    async fn send(&self, request: ApiRequest, credential: &Credential) -> Result<Value, WorkspaceError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        let mut builder = builder
            .bearer_auth(credential.token())
            .header("Content-Type", "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| WorkspaceError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| WorkspaceError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = %status, url = %request.url, "Workspace API error");
            return Err(ExternalApiError::from_body(status.as_u16(), &text).into());
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| WorkspaceError::Decode(e.to_string()))
    }
}

/// 单个请求的重试策略；max_retries = 0 表示不重试
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// 5xx / 429 可重试；传输错误只对 GET 重试（POST 可能已送达）；401/403 永不重试
    fn allows(&self, request: &ApiRequest, err: &WorkspaceError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match err {
            WorkspaceError::Transport(_) => request.method == HttpMethod::Get,
            other => other.is_retryable(),
        }
    }
}

/// API 根地址与事件时区
#[derive(Clone, Debug)]
pub struct WorkspaceEndpoints {
    pub api_base: String,
    pub docs_api_base: String,
    pub timezone: String,
}

impl Default for WorkspaceEndpoints {
    fn default() -> Self {
        Self {
            api_base: GOOGLE_API_BASE.to_string(),
            docs_api_base: GOOGLE_DOCS_API_BASE.to_string(),
            timezone: calendar::DEFAULT_TIMEZONE.to_string(),
        }
    }
}

/// 写操作客户端：每个方法是一次（或固定的一小串）认证请求，不保存状态。
///
/// 重试按单个请求进行：多步操作中已成功的步骤不会重放。
#[derive(Clone)]
pub struct WorkspaceClient {
    transport: Arc<dyn WorkspaceTransport>,
    endpoints: WorkspaceEndpoints,
    retry: RetryPolicy,
}

impl WorkspaceClient {
    pub fn new(transport: Arc<dyn WorkspaceTransport>, endpoints: WorkspaceEndpoints) -> Self {
        Self {
            transport,
            endpoints,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoints(&self) -> &WorkspaceEndpoints {
        &self.endpoints
    }

    pub fn transport(&self) -> Arc<dyn WorkspaceTransport> {
        self.transport.clone()
    }

    pub async fn send_email(&self, args: &EmailArgs, credential: &Credential) -> Result<Value, WorkspaceError> {
        self.send(mail::send_request(&self.endpoints.api_base, args), credential)
            .await
    }

    pub async fn create_calendar_event(
        &self,
        args: &EventArgs,
        credential: &Credential,
    ) -> Result<Value, WorkspaceError> {
        let request = calendar::create_request(&self.endpoints.api_base, args, &self.endpoints.timezone)?;
        self.send(request, credential).await
    }

    /// 先按标题创建文档；content 非空时再用 batchUpdate 写入正文
    pub async fn create_document(&self, args: &DocArgs, credential: &Credential) -> Result<Value, WorkspaceError> {
        let base = &self.endpoints.docs_api_base;
        let created = self.send(docs::create_request(base, args), credential).await?;

        let Some(content) = args.content.as_deref().filter(|c| !c.is_empty()) else {
            return Ok(created);
        };
        let document_id = created["documentId"].as_str().ok_or_else(|| {
            WorkspaceError::Decode("create document response has no documentId".to_string())
        })?;
        self.send(docs::insert_text_request(base, document_id, content), credential)
            .await?;
        Ok(created)
    }

    async fn send(&self, request: ApiRequest, credential: &Credential) -> Result<Value, WorkspaceError> {
        let mut attempt = 0u32;
        loop {
            match self.transport.send(request.clone(), credential).await {
                Err(e) if self.retry.allows(&request, &e, attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(url = %request.url, attempt = attempt + 1, error = %e, "Retrying after {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 记录请求的传输层，按 URL 片段返回预置响应

    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingTransport {
        pub requests: Mutex<Vec<ApiRequest>>,
        routes: Mutex<Vec<(String, Result<Value, WorkspaceError>)>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// URL 包含 `fragment` 的请求返回 `response`；后注册的优先
        pub fn route(self, fragment: &str, response: Result<Value, WorkspaceError>) -> Self {
            self.routes
                .lock()
                .unwrap()
                .push((fragment.to_string(), response));
            self
        }

        pub fn recorded(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkspaceTransport for RecordingTransport {
        async fn send(&self, request: ApiRequest, _credential: &Credential) -> Result<Value, WorkspaceError> {
            let url = request.url.clone();
            self.requests.lock().unwrap().push(request);
            let routes = self.routes.lock().unwrap();
            routes
                .iter()
                .rev()
                .find(|(fragment, _)| url.contains(fragment.as_str()))
                .map(|(_, resp)| resp.clone())
                .unwrap_or(Ok(Value::Null))
        }
    }
}
