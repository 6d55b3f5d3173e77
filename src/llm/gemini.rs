//! Gemini generateContent 客户端
//!
//! 对话映射为 contents（role: user / model），工具目录映射为 functionDeclarations；
//! 响应中的 functionCall part 按出现顺序收集为 ToolCall，text part 拼接为回复。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmError, LlmReply};
use crate::memory::{PlannerRole, PlannerTurn};
use crate::tools::{ToolCall, ToolDeclaration};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_FLASH: &str = "gemini-2.5-flash";

pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
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
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

/// 构造 generateContent 请求体
pub(crate) fn build_request(
    system: &str,
    contents: &[PlannerTurn],
    tools: &[ToolDeclaration],
) -> Value {
    let contents: Vec<Value> = contents
        .iter()
        .map(|t| {
            let role = match t.role {
                PlannerRole::User => "user",
                PlannerRole::Model => "model",
            };
            json!({ "role": role, "parts": [{ "text": t.text }] })
        })
        .collect();

    let mut body = json!({ "contents": contents });
    if !system.trim().is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    if !tools.is_empty() {
        body["tools"] = json!([{ "functionDeclarations": tools }]);
    }
    body
}

/// 解析 generateContent 响应：取第一个 candidate
pub(crate) fn parse_response(data: &Value) -> Result<LlmReply, LlmError> {
    let candidate = data["candidates"].get(0).ok_or_else(|| {
        let reason = data["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates");
        LlmError::MalformedResponse(reason.to_string())
    })?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            // thinking 模型的 thought part 不作为回复
            if part["thought"].as_bool().unwrap_or(false) {
                continue;
            }
            if let Some(t) = part["text"].as_str() {
                text.push_str(t);
            }
            if let Some(fc) = part.get("functionCall") {
                tool_calls.push(ToolCall {
                    name: fc["name"].as_str().unwrap_or("").trim().to_string(),
                    args: fc.get("args").cloned().unwrap_or(Value::Null),
                });
            }
        }
    }

    Ok(LlmReply {
        text: if text.trim().is_empty() { None } else { Some(text) },
        tool_calls,
    })
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        system: &str,
        contents: &[PlannerTurn],
        tools: &[ToolDeclaration],
    ) -> Result<LlmReply, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = build_request(system, contents, tools);
        tracing::info!(model = %self.model, turns = contents.len(), tools = tools.len(), "Calling Gemini");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(LlmError::from_reqwest)?;
        if !status.is_success() {
            tracing::error!(status = %status, "Gemini API error");
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
    fn test_build_request_maps_roles_and_tools() {
        let contents = vec![
            PlannerTurn {
                role: PlannerRole::Model,
                text: "Hi".into(),
            },
            PlannerTurn {
                role: PlannerRole::User,
                text: "email bob".into(),
            },
        ];
        let body = build_request("be helpful", &contents, &catalog());
        assert_eq!(body["contents"][0]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "email bob");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be helpful");
        let decls = body["tools"][0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[0]["name"], "send_email");
    }

    #[test]
    fn test_parse_function_calls_in_order() {
        let data = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "functionCall": { "name": "send_email", "args": { "to": "a@x.com" } } },
                    { "functionCall": { "name": "create_google_doc", "args": { "title": "T" } } }
                ]}
            }]
        });
        let reply = parse_response(&data).unwrap();
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].name, "send_email");
        assert_eq!(reply.tool_calls[0].args["to"], "a@x.com");
        assert!(reply.text.is_none());
    }

    #[test]
    fn test_parse_text_skips_thoughts() {
        let data = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "Sure, here you go." }
                ]}
            }]
        });
        let reply = parse_response(&data).unwrap();
        assert_eq!(reply.text.as_deref(), Some("Sure, here you go."));
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let data = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_response(&data).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(ref r) if r == "SAFETY"));
    }
}
