//! Gmail 发信：拼 MIME 文本后 base64url 编码
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

use super::ApiRequest;
use crate::tools::EmailArgs;

/// 原始 MIME 报文（HTML 正文）
pub fn mime_message(args: &EmailArgs) -> String {
    [
        format!("To: {}", header_value(&args.to)),
        format!("Subject: {}", header_value(&args.subject)),
        "Content-Type: text/html; charset=utf-8".to_string(),
        String::new(),
        args.body.clone(),
    ]
    .join("\n")
}

/// 头部值折成一行
fn header_value(raw: &str) -> String {
    raw.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn encode_raw(mime: &str) -> String {
    URL_SAFE_NO_PAD.encode(mime.as_bytes())
}

pub fn send_request(api_base: &str, args: &EmailArgs) -> ApiRequest {
    ApiRequest::post(
        format!("{}/gmail/v1/users/me/messages/send", api_base.trim_end_matches('/')),
        json!({ "raw": encode_raw(&mime_message(args)) }),
    )
}
