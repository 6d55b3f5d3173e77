//! 工具目录：固定的三种有副作用操作
//!
//! Planner 只能从这里提议工具；提议在进入待确认槽位之前由 `PendingAction::from_tool_call` 校验。
//! 工具按和类型分派（PendingAction），新增工具时编译器会要求补全所有 match。

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ValidationError;

/// 日期格式（YYYY-MM-DD）
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// 时间格式（HH:MM）
pub const TIME_FORMAT: &str = "%H:%M";

/// 工具名（封闭枚举）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SendEmail,
    CreateCalendarEvent,
    CreateGoogleDoc,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::SendEmail,
        ToolName::CreateCalendarEvent,
        ToolName::CreateGoogleDoc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SendEmail => "send_email",
            ToolName::CreateCalendarEvent => "create_calendar_event",
            ToolName::CreateGoogleDoc => "create_google_doc",
        }
    }

    /// 工具描述（供 LLM 理解功能）
    pub fn description(&self) -> &'static str {
        match self {
            ToolName::SendEmail => "Sends an email to a recipient.",
            ToolName::CreateCalendarEvent => "Creates a new event in the user's calendar.",
            ToolName::CreateGoogleDoc => "Creates a new Google Doc.",
        }
    }

    /// 参数 JSON Schema（string / array-of-string，外加 required 集合）
    pub fn parameters_schema(&self) -> Value {
        match self {
            ToolName::SendEmail => serde_json::json!({
                "type": "object",
                "properties": {
                    "to": { "type": "string", "description": "The recipient's email address." },
                    "subject": { "type": "string", "description": "The subject of the email." },
                    "body": { "type": "string", "description": "The body content of the email." }
                },
                "required": ["to", "subject", "body"]
            }),
            ToolName::CreateCalendarEvent => serde_json::json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "The title of the event." },
                    "date": { "type": "string", "description": "The date of the event (e.g., '2024-08-15')." },
                    "time": { "type": "string", "description": "The time of the event (e.g., '14:30')." },
                    "attendees": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "A list of attendee email addresses."
                    }
                },
                "required": ["title", "date", "time"]
            }),
            ToolName::CreateGoogleDoc => serde_json::json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "The title of the document." },
                    "content": { "type": "string", "description": "The initial content of the document." }
                },
                "required": ["title"]
            }),
        }
    }

    /// 确认按钮文案
    pub fn confirm_label(&self) -> &'static str {
        match self {
            ToolName::SendEmail => "Send Email",
            ToolName::CreateCalendarEvent => "Create Event",
            ToolName::CreateGoogleDoc => "Create Document",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ValidationError::UnknownTool(s.to_string()))
    }
}

/// 发给 LLM 的工具声明
#[derive(Clone, Debug, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 完整目录声明
pub fn catalog() -> Vec<ToolDeclaration> {
    ToolName::ALL
        .iter()
        .map(|t| ToolDeclaration {
            name: t.as_str().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect()
}

/// LLM 返回的原始工具调用（未校验）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailArgs {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventArgs {
    pub title: String,
    /// YYYY-MM-DD
    pub date: String,
    /// HH:MM
    pub time: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocArgs {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// 待确认动作：已校验的工具调用
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool_name", content = "arguments", rename_all = "snake_case")]
pub enum PendingAction {
    SendEmail(EmailArgs),
    CreateCalendarEvent(EventArgs),
    CreateGoogleDoc(DocArgs),
}

impl PendingAction {
    pub fn tool_name(&self) -> ToolName {
        match self {
            PendingAction::SendEmail(_) => ToolName::SendEmail,
            PendingAction::CreateCalendarEvent(_) => ToolName::CreateCalendarEvent,
            PendingAction::CreateGoogleDoc(_) => ToolName::CreateGoogleDoc,
        }
    }

    /// 按目录 schema 校验 LLM 的工具调用；缺少必填字段、类型不符、日期时间格式错误都会被拒绝
    pub fn from_tool_call(call: &ToolCall) -> Result<Self, ValidationError> {
        let tool: ToolName = call.name.parse()?;
        let args = match &call.args {
            Value::Object(map) => map,
            Value::Null => {
                return Err(ValidationError::MissingField {
                    tool,
                    field: first_required(tool),
                })
            }
            _ => return Err(ValidationError::NotAnObject(tool)),
        };
        let fields = ArgReader { tool, args };

        let action = match tool {
            ToolName::SendEmail => PendingAction::SendEmail(EmailArgs {
                to: fields.header_line("to")?,
                subject: fields.header_line("subject")?,
                body: fields.required("body")?,
            }),
            ToolName::CreateCalendarEvent => {
                let date = fields.required("date")?;
                NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| {
                    ValidationError::InvalidFormat {
                        tool,
                        field: "date",
                        expected: "YYYY-MM-DD",
                        value: date.clone(),
                    }
                })?;
                let time = fields.required("time")?;
                NaiveTime::parse_from_str(&time, TIME_FORMAT).map_err(|_| {
                    ValidationError::InvalidFormat {
                        tool,
                        field: "time",
                        expected: "HH:MM",
                        value: time.clone(),
                    }
                })?;
                PendingAction::CreateCalendarEvent(EventArgs {
                    title: fields.required("title")?,
                    date,
                    time,
                    attendees: fields.string_list("attendees")?,
                })
            }
            ToolName::CreateGoogleDoc => PendingAction::CreateGoogleDoc(DocArgs {
                title: fields.required("title")?,
                content: fields.optional("content")?,
            }),
        };
        Ok(action)
    }

    /// 确认界面的文字预览
    pub fn preview(&self) -> String {
        match self {
            PendingAction::SendEmail(a) => format!(
                "Confirm Email\nTo: {}\nSubject: {}\n\n{}",
                a.to, a.subject, a.body
            ),
            PendingAction::CreateCalendarEvent(a) => {
                let mut out = format!(
                    "Confirm Calendar Event\nTitle: {}\nDate: {}\nTime: {}",
                    a.title, a.date, a.time
                );
                if !a.attendees.is_empty() {
                    out.push_str(&format!("\nAttendees: {}", a.attendees.join(", ")));
                }
                out
            }
            PendingAction::CreateGoogleDoc(a) => {
                let content = a
                    .content
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .unwrap_or("(No initial content)");
                format!(
                    "Confirm Google Doc Creation\nTitle: {}\n\nInitial Content:\n{}",
                    a.title, content
                )
            }
        }
    }

    pub fn confirm_label(&self) -> &'static str {
        self.tool_name().confirm_label()
    }
}

fn first_required(tool: ToolName) -> &'static str {
    match tool {
        ToolName::SendEmail => "to",
        ToolName::CreateCalendarEvent | ToolName::CreateGoogleDoc => "title",
    }
}

/// 从 JSON 参数对象中按字段取值
struct ArgReader<'a> {
    tool: ToolName,
    args: &'a serde_json::Map<String, Value>,
}

impl ArgReader<'_> {
    fn required(&self, field: &'static str) -> Result<String, ValidationError> {
        match self.optional(field)? {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ValidationError::MissingField {
                tool: self.tool,
                field,
            }),
        }
    }

    /// 写入 MIME 头的字段不能含换行
    fn header_line(&self, field: &'static str) -> Result<String, ValidationError> {
        let value = self.required(field)?;
        if value.contains(['\r', '\n']) {
            return Err(ValidationError::InvalidFormat {
                tool: self.tool,
                field,
                expected: "a single line",
                value: value.escape_debug().to_string(),
            });
        }
        Ok(value)
    }

    fn optional(&self, field: &'static str) -> Result<Option<String>, ValidationError> {
        match self.args.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ValidationError::WrongType {
                tool: self.tool,
                field,
                expected: "string",
            }),
        }
    }

    fn string_list(&self, field: &'static str) -> Result<Vec<String>, ValidationError> {
        let wrong_type = || ValidationError::WrongType {
            tool: self.tool,
            field,
            expected: "array of string",
        };
        match self.args.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(wrong_type))
                .collect(),
            Some(_) => Err(wrong_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_catalog_has_three_tools_with_required_sets() {
        let tools = catalog();
        assert_eq!(tools.len(), 3);
        let event = tools
            .iter()
            .find(|t| t.name == "create_calendar_event")
            .unwrap();
        assert_eq!(event.parameters["required"], json!(["title", "date", "time"]));
        assert_eq!(event.parameters["properties"]["attendees"]["type"], "array");
    }

    #[test]
    fn test_valid_email_call() {
        let action = PendingAction::from_tool_call(&call(
            "send_email",
            json!({"to": "bob@x.com", "subject": "Lunch", "body": "Noon?"}),
        ))
        .unwrap();
        assert_eq!(action.tool_name(), ToolName::SendEmail);
        assert_eq!(action.confirm_label(), "Send Email");
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let err = PendingAction::from_tool_call(&call(
            "send_email",
            json!({"to": "bob@x.com", "subject": "Lunch"}),
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MissingField { field: "body", .. }
        ));
    }

    #[test]
    fn test_blank_required_field_rejected() {
        let err = PendingAction::from_tool_call(&call("create_google_doc", json!({"title": "  "})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { field: "title", .. }));
    }

    #[test]
    fn test_email_header_fields_reject_line_breaks() {
        let err = PendingAction::from_tool_call(&call(
            "send_email",
            json!({"to": "bob@x.com", "subject": "Hi\r\nBcc: eve@x.com", "body": "..."}),
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidFormat { field: "subject", .. }
        ));

        let err = PendingAction::from_tool_call(&call(
            "send_email",
            json!({"to": "bob@x.com\nBcc: eve@x.com", "subject": "Hi", "body": "line one\nline two"}),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { field: "to", .. }));

        // 正文允许多行
        assert!(PendingAction::from_tool_call(&call(
            "send_email",
            json!({"to": "bob@x.com", "subject": "Hi", "body": "line one\nline two"}),
        ))
        .is_ok());
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let err = PendingAction::from_tool_call(&call("delete_everything", json!({}))).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownTool(_)));
    }

    #[test]
    fn test_event_attendees_and_format() {
        let action = PendingAction::from_tool_call(&call(
            "create_calendar_event",
            json!({"title": "Sync", "date": "2024-08-15", "time": "14:30", "attendees": ["a@x.com"]}),
        ))
        .unwrap();
        match action {
            PendingAction::CreateCalendarEvent(a) => assert_eq!(a.attendees, vec!["a@x.com"]),
            other => panic!("unexpected {other:?}"),
        }

        let err = PendingAction::from_tool_call(&call(
            "create_calendar_event",
            json!({"title": "Sync", "date": "15/08/2024", "time": "14:30"}),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { field: "date", .. }));

        let err = PendingAction::from_tool_call(&call(
            "create_calendar_event",
            json!({"title": "Sync", "date": "2024-08-15", "time": "14:30", "attendees": "a@x.com"}),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { field: "attendees", .. }));
    }

    #[test]
    fn test_doc_preview_without_content() {
        let action = PendingAction::CreateGoogleDoc(DocArgs {
            title: "Notes".to_string(),
            content: None,
        });
        assert!(action.preview().contains("(No initial content)"));
    }

    #[test]
    fn test_pending_action_serde_shape() {
        let action = PendingAction::SendEmail(EmailArgs {
            to: "a@x.com".into(),
            subject: "s".into(),
            body: "b".into(),
        });
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["tool_name"], "send_email");
        assert_eq!(v["arguments"]["to"], "a@x.com");
    }
}
