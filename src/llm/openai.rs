//! OpenAI 兼容 API 客户端
//!
//! 调用任意 OpenAI 兼容端点的 /chat/completions（可配置 base_url）；支持 OpenAI、DeepSeek、自建代理等。
//! 工具目录以 `tools: [{type: function, function: {...}}]` 发送，`tool_calls[].function.arguments` 为 JSON 字符串。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmError, LlmReply};
use crate::memory::{PlannerRole, PlannerTurn};
use crate::tools::{ToolCall, ToolDeclaration};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// DeepSeek 提供与 OpenAI 完全兼容的 API 接口
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(LlmError::from_reqwest)?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

/// 创建 DeepSeek 客户端（模型默认 deepseek-chat）
pub fn create_deepseek_client(
    model: Option<&str>,
    api_key: &str,
    timeout_secs: u64,
) -> Result<OpenAiClient, LlmError> {
    OpenAiClient::new(
        Some(DEEPSEEK_BASE_URL),
        model.unwrap_or(DEEPSEEK_CHAT),
        api_key,
        timeout_secs,
    )
}

pub(crate) fn build_request(
    model: &str,
    system: &str,
    contents: &[PlannerTurn],
    tools: &[ToolDeclaration],
) -> Value {
    let mut messages = Vec::with_capacity(contents.len() + 1);
    if !system.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for t in contents {
        let role = match t.role {
            PlannerRole::User => "user",
            PlannerRole::Model => "assistant",
        };
        messages.push(json!({ "role": role, "content": t.text }));
    }

    let mut body = json!({ "model": model, "messages": messages });
    if !tools.is_empty() {
        let tools: Vec<Value> = tools
            .iter()
            .map(|t| json!({ "type": "function", "function": t }))
            .collect();
        body["tools"] = json!(tools);
    }
    body
}

pub(crate) fn parse_response(data: &Value) -> Result<LlmReply, LlmError> {
    let message = &data["choices"]
        .get(0)
        .ok_or_else(|| LlmError::MalformedResponse("no choices in response".to_string()))?
        ["message"];

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for tc in calls {
            let raw = tc["function"]["arguments"].as_str().unwrap_or("{}");
            let args = serde_json::from_str::<Value>(raw).map_err(|e| {
                LlmError::MalformedResponse(format!("tool arguments are not JSON: {e}"))
            })?;
            tool_calls.push(ToolCall {
                name: tc["function"]["name"].as_str().unwrap_or("").trim().to_string(),
                args,
            });
        }
    }

    let text = message["content"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);
    Ok(LlmReply { text, tool_calls })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        system: &str,
        contents: &[PlannerTurn],
        tools: &[ToolDeclaration],
    ) -> Result<LlmReply, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = build_request(&self.model, system, contents, tools);
        tracing::info!(model = %self.model, url = %url, tools = tools.len(), "Calling LLM API");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(LlmError::from_reqwest)?;
        if !status.is_success() {
            tracing::error!(status = %status, "Provider API error");
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message: crate::core::error::truncate(&text, 300),
            });
        }

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        parse_response(&data)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::catalog;

    #[test]
    fn test_build_request_wraps_tools_as_functions() {
        let contents = vec![PlannerTurn {
            role: PlannerRole::Model,
            text: "Hello".into(),
        }];
        let body = build_request("gpt-4o-mini", "sys", &contents, &catalog());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "send_email");
    }

    #[test]
    fn test_parse_tool_call_arguments_string() {
        let data = json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "create_google_doc", "arguments": "{\"title\":\"Plan\"}" }
                }]
            }}]
        });
        let reply = parse_response(&data).unwrap();
        assert_eq!(reply.tool_calls[0].name, "create_google_doc");
        assert_eq!(reply.tool_calls[0].args["title"], "Plan");
        assert!(reply.text.is_none());
    }

    #[test]
    fn test_parse_rejects_non_json_arguments() {
        let data = json!({
            "choices": [{ "message": {
                "tool_calls": [{ "function": { "name": "send_email", "arguments": "to=bob" } }]
            }}]
        });
        assert!(matches!(
            parse_response(&data),
            Err(LlmError::MalformedResponse(_))
        ));
    }
}
