//! Quill - Workspace 助手
//!
//! 入口：初始化日志、创建会话运行时，并运行一个简单的行式 REPL。
//! token 来自 QUILL_ACCESS_TOKEN 或 `/login <token>`。

use anyhow::Context;
use quill::core::{create_session_runtime, Command, UiState};
use quill::memory::Author;
use quill::workspace::Credential;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use uuid::Uuid;

const HELP: &str = "Commands: /login <token>  /logout  /approve  /cancel  /feed  /open <id>  /quit  (anything else is sent to the assistant)";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quill::observability::init();

    let (cmd_tx, state_rx) = create_session_runtime(None)
        .await
        .context("Failed to create session runtime")?;

    tokio::spawn(render(state_rx));
    println!("{HELP}");

    if let Ok(token) = std::env::var("QUILL_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            let _ = cmd_tx.send(Command::SignIn(Credential::new(token.trim())));
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        let cmd = match line.split_once(' ').unwrap_or((line, "")) {
            ("/login", token) if !token.trim().is_empty() => Command::SignIn(Credential::new(token.trim())),
            ("/login", _) => {
                println!("usage: /login <access token>");
                continue;
            }
            ("/logout", _) => Command::SignOut,
            ("/approve", _) => Command::Approve,
            ("/cancel", _) => Command::Reject,
            ("/feed", _) => Command::RefreshFeed,
            ("/open", id) => Command::SelectFeedItem(id.trim().to_string()),
            ("/quit", _) => Command::Quit,
            ("/help", _) => {
                println!("{HELP}");
                continue;
            }
            _ => Command::Submit(line.to_string()),
        };
        let quit = matches!(cmd, Command::Quit);
        if cmd_tx.send(cmd).is_err() || quit {
            break;
        }
    }

    Ok(())
}

/// 打印新增的 Turn、待确认预览、Feed 与提示
async fn render(mut state_rx: watch::Receiver<UiState>) {
    let mut printed: Vec<Uuid> = Vec::new();
    let mut last_feed_len = 0usize;
    let mut shown_pending: Option<String> = None;
    loop {
        let state = state_rx.borrow_and_update().clone();

        // 历史被整体重置时从头打印
        let continues = state
            .history
            .iter()
            .zip(printed.iter())
            .all(|(turn, id)| turn.id == *id);
        if !continues || state.history.len() < printed.len() {
            printed.clear();
        }
        for turn in state.history.iter().skip(printed.len()) {
            let who = match turn.author {
                Author::User => "you",
                Author::Assistant => "quill",
                Author::System => "system",
            };
            println!("[{who}] {}", turn.content);
            printed.push(turn.id);
        }

        let pending_details = state.pending.as_ref().map(|p| p.details.clone());
        if pending_details != shown_pending {
            if let Some(pending) = &state.pending {
                println!("----\n{}\n---- /approve to {} · /cancel", pending.details, pending.confirm_label);
            }
            shown_pending = pending_details;
        }
        if state.feed.len() != last_feed_len {
            for item in &state.feed {
                println!("  • [{}] {} — {} ({})", item.id, item.title, item.snippet, item.timestamp);
            }
            last_feed_len = state.feed.len();
        }
        if let Some(notice) = &state.notice {
            println!("! {notice}");
        }

        if state_rx.changed().await.is_err() {
            break;
        }
    }
}
