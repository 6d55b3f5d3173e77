//! 活动 Feed：最近邮件、即将到来的日程、最近修改的文件
//!
//! 三路请求并发执行，任一失败则整体失败（FeedError）。合并顺序为 [events, emails, files]，
//! 再做稳定排序把日程放在最前。列表字段缺失视为空列表。

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Local, NaiveDate, SecondsFormat, TimeZone, Utc};
use futures_util::future::try_join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{url_with_query, ApiRequest, Credential, WorkspaceTransport};
use crate::core::{FeedError, WorkspaceError};

const EMAIL_QUERY: &str = "-category:promotions -category:social";
const FILE_FIELDS: &str = "files(id,name,modifiedTime,lastModifyingUser(displayName))";

/// Feed 条目类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Email,
    Event,
    Document,
}

/// 一条 Feed 条目（每次刷新整体重建）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub kind: FeedKind,
    pub title: String,
    pub snippet: String,
    /// 选中条目时附在提问后的上下文
    pub context: String,
    /// 相对时间，如 "in 2 hours" / "3 days ago" / "Recently"
    pub timestamp: String,
}

impl FeedItem {
    /// 选中条目时提交的对话开场白
    pub fn prompt(&self) -> String {
        format!("Tell me more about \"{}\". Context: {}", self.title, self.context)
    }
}

/// 每路拉取的条数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedLimits {
    pub max_emails: u32,
    pub max_events: u32,
    pub max_files: u32,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            max_emails: 5,
            max_events: 2,
            max_files: 3,
        }
    }
}

pub struct FeedAggregator {
    transport: Arc<dyn WorkspaceTransport>,
    api_base: String,
    limits: FeedLimits,
}

impl FeedAggregator {
    pub fn new(transport: Arc<dyn WorkspaceTransport>, api_base: impl Into<String>, limits: FeedLimits) -> Self {
        Self {
            transport,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            limits,
        }
    }

    pub async fn get_feed(&self, credential: &Credential) -> Result<Vec<FeedItem>, FeedError> {
        let now = Utc::now();
        let (emails, events, files) = tokio::try_join!(
            self.recent_emails(credential, now),
            self.upcoming_events(credential, now),
            self.recent_files(credential, now),
        )?;

        let mut items: Vec<FeedItem> = events.into_iter().chain(emails).chain(files).collect();
        items.sort_by_key(|item| item.kind != FeedKind::Event);
        tracing::info!(count = items.len(), "Feed refreshed");
        Ok(items)
    }

    async fn recent_emails(&self, credential: &Credential, now: DateTime<Utc>) -> Result<Vec<FeedItem>, FeedError> {
        let fail = |source| FeedError {
            source_name: "gmail",
            source,
        };
        let max = self.limits.max_emails.to_string();
        let url = url_with_query(
            &format!("{}/gmail/v1/users/me/messages", self.api_base),
            &[("maxResults", max.as_str()), ("q", EMAIL_QUERY)],
        )
        .map_err(fail)?;
        let list = self
            .transport
            .send(ApiRequest::get(url), credential)
            .await
            .map_err(fail)?;

        let ids: Vec<String> = list_entries(&list, "messages")
            .iter()
            .filter_map(|m| m["id"].as_str().map(str::to_string))
            .collect();

        let details = try_join_all(ids.iter().map(|id| async move {
            let url = url_with_query(
                &format!("{}/gmail/v1/users/me/messages/{}", self.api_base, id),
                &[("format", "metadata")],
            )?;
            let detail = self.transport.send(ApiRequest::get(url), credential).await?;
            Ok::<_, WorkspaceError>(detail)
        }))
        .await
        .map_err(fail)?;

        Ok(details.iter().map(|d| email_item(d, now)).collect())
    }

    async fn upcoming_events(&self, credential: &Credential, now: DateTime<Utc>) -> Result<Vec<FeedItem>, FeedError> {
        let fail = |source| FeedError {
            source_name: "calendar",
            source,
        };
        let max = self.limits.max_events.to_string();
        let time_min = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let url = url_with_query(
            &format!("{}/calendar/v3/calendars/primary/events", self.api_base),
            &[
                ("maxResults", max.as_str()),
                ("timeMin", time_min.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ],
        )
        .map_err(fail)?;
        let resp = self
            .transport
            .send(ApiRequest::get(url), credential)
            .await
            .map_err(fail)?;

        Ok(list_entries(&resp, "items")
            .iter()
            .map(|e| event_item(e, now))
            .collect())
    }

    async fn recent_files(&self, credential: &Credential, now: DateTime<Utc>) -> Result<Vec<FeedItem>, FeedError> {
        let fail = |source| FeedError {
            source_name: "drive",
            source,
        };
        let max = self.limits.max_files.to_string();
        let url = url_with_query(
            &format!("{}/drive/v3/files", self.api_base),
            &[
                ("pageSize", max.as_str()),
                ("orderBy", "modifiedTime desc"),
                ("fields", FILE_FIELDS),
            ],
        )
        .map_err(fail)?;
        let resp = self
            .transport
            .send(ApiRequest::get(url), credential)
            .await
            .map_err(fail)?;

        Ok(list_entries(&resp, "files")
            .iter()
            .map(|f| file_item(f, now))
            .collect())
    }
}

fn list_entries<'a>(resp: &'a Value, key: &str) -> &'a [Value] {
    resp[key].as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn header<'a>(detail: &'a Value, name: &str) -> Option<&'a str> {
    detail["payload"]["headers"]
        .as_array()?
        .iter()
        .find(|h| h["name"].as_str() == Some(name))
        .and_then(|h| h["value"].as_str())
}

static ANGLE_ADDR_RE: OnceLock<Regex> = OnceLock::new();

/// 去掉发件人里的 `<address>` 部分
pub fn display_sender(from: &str) -> String {
    let re = ANGLE_ADDR_RE.get_or_init(|| Regex::new(r"<.*?>").expect("static regex"));
    re.replace_all(from, "").trim().to_string()
}

fn email_item(detail: &Value, now: DateTime<Utc>) -> FeedItem {
    let id = detail["id"].as_str().unwrap_or_default().to_string();
    let subject = header(detail, "Subject").unwrap_or("No Subject").to_string();
    let from = header(detail, "From").unwrap_or("Unknown Sender");
    let timestamp = header(detail, "Date")
        .and_then(parse_mail_date)
        .map(|t| relative_time(t, now))
        .unwrap_or_else(|| "Recently".to_string());

    FeedItem {
        context: format!("Regarding email with ID {id} and subject \"{subject}\""),
        snippet: format!("From: {}", display_sender(from)),
        kind: FeedKind::Email,
        title: subject,
        timestamp,
        id,
    }
}

/// RFC 2822 日期头，容忍结尾的 "(UTC)" 之类注释
fn parse_mail_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = match raw.find('(') {
        Some(idx) => raw[..idx].trim(),
        None => raw.trim(),
    };
    DateTime::parse_from_rfc2822(trimmed)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn event_item(event: &Value, now: DateTime<Utc>) -> FeedItem {
    let id = event["id"].as_str().unwrap_or_default().to_string();
    let summary = event["summary"].as_str().unwrap_or("(No title)").to_string();

    let (snippet, start) = if let Some(dt) = event["start"]["dateTime"].as_str() {
        match DateTime::parse_from_rfc3339(dt) {
            Ok(t) => (
                t.with_timezone(&Local).format("%H:%M").to_string(),
                Some(t.with_timezone(&Utc)),
            ),
            Err(_) => (dt.to_string(), None),
        }
    } else {
        let start = event["start"]["date"]
            .as_str()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|d| Local.from_local_datetime(&d).earliest())
            .map(|t| t.with_timezone(&Utc));
        ("All day".to_string(), start)
    };

    FeedItem {
        context: format!("About my upcoming event \"{summary}\""),
        kind: FeedKind::Event,
        title: summary,
        timestamp: start
            .map(|t| relative_time(t, now))
            .unwrap_or_else(|| "Soon".to_string()),
        snippet,
        id,
    }
}

fn file_item(file: &Value, now: DateTime<Utc>) -> FeedItem {
    let id = file["id"].as_str().unwrap_or_default().to_string();
    let name = file["name"].as_str().unwrap_or("Untitled").to_string();
    let editor = file["lastModifyingUser"]["displayName"]
        .as_str()
        .unwrap_or("Unknown");
    let timestamp = file["modifiedTime"]
        .as_str()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| relative_time(t.with_timezone(&Utc), now))
        .unwrap_or_else(|| "Recently".to_string());

    FeedItem {
        snippet: format!("Last modified by {editor}"),
        context: format!("About the document named \"{name}\" with ID {id}"),
        kind: FeedKind::Document,
        title: name,
        timestamp,
        id,
    }
}

/// 相对时间描述（"3 minutes ago" / "in about 2 hours"）
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (then - now).num_seconds();
    let distance = distance_words(seconds.unsigned_abs());
    if seconds >= 0 {
        format!("in {distance}")
    } else {
        format!("{distance} ago")
    }
}

fn distance_words(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;
    const MONTH: u64 = 30 * DAY;
    const YEAR: u64 = 365 * DAY;

    let rounded = |unit: u64| (seconds + unit / 2) / unit;
    let plural = |n: u64, word: &str| {
        if n == 1 {
            format!("1 {word}")
        } else {
            format!("{n} {word}s")
        }
    };

    match seconds {
        s if s < 30 => "less than a minute".to_string(),
        s if s < 45 * MINUTE => plural(rounded(MINUTE).max(1), "minute"),
        s if s < 90 * MINUTE => "about 1 hour".to_string(),
        s if s < DAY => format!("about {}", plural(rounded(HOUR), "hour")),
        s if s < 42 * HOUR => "1 day".to_string(),
        s if s < MONTH => plural(rounded(DAY), "day"),
        s if s < 45 * DAY => "about 1 month".to_string(),
        s if s < 60 * DAY => "about 2 months".to_string(),
        s if s < YEAR => plural(seconds / MONTH, "month"),
        s => {
            let years = s / YEAR;
            let months = (s % YEAR) / MONTH;
            if months < 3 {
                format!("about {}", plural(years, "year"))
            } else if months < 9 {
                format!("over {}", plural(years, "year"))
            } else {
                format!("almost {}", plural(years + 1, "year"))
            }
        }
    }
}
