//! Calendar 建事件：固定 1 小时时长，使用配置的时区
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Value};

use super::ApiRequest;
use crate::core::WorkspaceError;
use crate::tools::{EventArgs, DATE_FORMAT, TIME_FORMAT};

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 解析 `date` + `time` 为本地（不带偏移）开始时间
pub fn event_start(args: &EventArgs) -> Result<NaiveDateTime, WorkspaceError> {
    let date = NaiveDate::parse_from_str(&args.date, DATE_FORMAT)
        .map_err(|e| WorkspaceError::Decode(format!("invalid event date '{}': {e}", args.date)))?;
    let time = NaiveTime::parse_from_str(&args.time, TIME_FORMAT)
        .map_err(|e| WorkspaceError::Decode(format!("invalid event time '{}': {e}", args.time)))?;
    Ok(date.and_time(time))
}

pub fn event_body(args: &EventArgs, timezone: &str) -> Result<Value, WorkspaceError> {
    let start = event_start(args)?;
    let end = start + Duration::hours(1);

    let mut body = json!({
        "summary": args.title,
        "start": { "dateTime": start.format(DATETIME_FORMAT).to_string(), "timeZone": timezone },
        "end": { "dateTime": end.format(DATETIME_FORMAT).to_string(), "timeZone": timezone },
    });
    if !args.attendees.is_empty() {
        body["attendees"] = args
            .attendees
            .iter()
            .map(|email| json!({ "email": email }))
            .collect();
    }
    Ok(body)
}

pub fn create_request(api_base: &str, args: &EventArgs, timezone: &str) -> Result<ApiRequest, WorkspaceError> {
    Ok(ApiRequest::post(
        format!("{}/calendar/v3/calendars/primary/events", api_base.trim_end_matches('/')),
        event_body(args, timezone)?,
    ))
}
