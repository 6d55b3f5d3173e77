//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `QUILL__*` 覆盖（双下划线表示嵌套，如 `QUILL__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::InvalidateOn;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub workspace: WorkspaceSection,
    pub feed: FeedSection,
    pub auth: AuthSection,
    pub session: SessionSection,
}

/// [app] 段：应用名、发送给 Planner 的历史轮数
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// Planner 上下文窗口（Turn 数，0 表示全部）；存储的历史不裁剪
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_history_turns: default_max_history_turns(),
        }
    }
}

fn default_max_history_turns() -> usize {
    0
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：gemini / openai / deepseek；实际选择还取决于哪个 API Key 存在
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 未设置时用各后端的默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 覆盖内置 system prompt
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            system_prompt: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [workspace] 段：API 根地址、事件时区、请求超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_docs_api_base")]
    pub docs_api_base: String,
    /// 新建日程使用的固定时区
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_workspace_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            docs_api_base: default_docs_api_base(),
            timezone: default_timezone(),
            request_timeout_secs: default_workspace_timeout_secs(),
            retry: RetrySection::default(),
        }
    }
}

fn default_api_base() -> String {
    crate::workspace::GOOGLE_API_BASE.to_string()
}

fn default_docs_api_base() -> String {
    crate::workspace::GOOGLE_DOCS_API_BASE.to_string()
}

fn default_timezone() -> String {
    crate::workspace::calendar::DEFAULT_TIMEZONE.to_string()
}

fn default_workspace_timeout_secs() -> u64 {
    30
}

/// [workspace.retry] 段：仅对 5xx / 429 / 传输错误生效
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    500
}

/// [feed] 段：每路拉取条数
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSection {
    #[serde(default = "default_max_emails")]
    pub max_emails: u32,
    #[serde(default = "default_max_events")]
    pub max_events: u32,
    #[serde(default = "default_max_files")]
    pub max_files: u32,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            max_emails: default_max_emails(),
            max_events: default_max_events(),
            max_files: default_max_files(),
        }
    }
}

fn default_max_emails() -> u32 {
    5
}

fn default_max_events() -> u32 {
    2
}

fn default_max_files() -> u32 {
    3
}

/// [auth] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    /// OAuth client id；未设置时未登录界面会提示配置
    pub client_id: Option<String>,
    pub revoke_url: Option<String>,
}

/// [session] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSection {
    /// 执行失败时何时作废会话：any_error（默认）/ auth_error
    #[serde(default)]
    pub invalidate_on: InvalidateOn,
}

/// 从 config 目录加载配置，环境变量 QUILL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 QUILL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("QUILL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
