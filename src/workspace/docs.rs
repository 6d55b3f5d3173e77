//! Docs 建文档：先建空文档，再按需插入正文
use serde_json::{json, Value};

use super::ApiRequest;
use crate::tools::DocArgs;

pub fn create_request(docs_base: &str, args: &DocArgs) -> ApiRequest {
    ApiRequest::post(
        format!("{}/v1/documents", docs_base.trim_end_matches('/')),
        json!({ "title": args.title }),
    )
}

/// 在文档开头（index 1）插入文本
pub fn insert_text_request(docs_base: &str, document_id: &str, text: &str) -> ApiRequest {
    ApiRequest::post(
        format!(
            "{}/v1/documents/{}:batchUpdate",
            docs_base.trim_end_matches('/'),
            document_id
        ),
        insert_text_body(text),
    )
}

fn insert_text_body(text: &str) -> Value {
    json!({
        "requests": [
            { "insertText": { "location": { "index": 1 }, "text": text } }
        ]
    })
}
