//! 对话历史：只追加的 Turn 序列
//!
//! Turn 一旦追加即不可变；序列不重排、不删除，唯一例外是会话整体重置（登录 / 登出 / 会话失效）。
//! System Turn 只给用户看，映射为 Planner 输入时会被过滤掉。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::PendingAction;

/// Turn 作者
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    /// 用户输入
    User,
    /// 模型回复或工具提议
    Assistant,
    /// 编排层生成的状态 / 结果通知，不回传给 Planner
    System,
}

/// 单条 Turn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub author: Author,
    pub content: String,
    /// 仅出现在提出工具调用的 assistant Turn 上
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn new(author: Author, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            content: content.into(),
            pending_action: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Author::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Author::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Author::System, content)
    }

    /// 带工具提议的 assistant Turn
    pub fn proposal(content: impl Into<String>, action: PendingAction) -> Self {
        Self {
            pending_action: Some(action),
            ..Self::new(Author::Assistant, content)
        }
    }
}

/// Planner 侧的角色（assistant 映射为 model）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerRole {
    User,
    Model,
}

/// 发给 Planner 的一条上下文
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannerTurn {
    pub role: PlannerRole,
    pub text: String,
}

/// 对话历史：只提供追加与整体重置
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以单条 Turn 开始的新历史
    pub fn starting_with(turn: Turn) -> Self {
        Self { turns: vec![turn] }
    }

    pub fn push(&mut self, turn: Turn) {
        tracing::debug!(author = ?turn.author, len = turn.content.len(), "turn appended");
        self.turns.push(turn);
    }

    /// 整体替换为单条 Turn（会话重置）
    pub fn reset_to(&mut self, turn: Turn) {
        self.turns = vec![turn];
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 映射为 Planner 输入：丢弃 System Turn，assistant -> model；
    /// max_turns 限制发送的最近条数（0 表示不限）
    pub fn planner_context(&self, max_turns: usize) -> Vec<PlannerTurn> {
        let mapped: Vec<PlannerTurn> = self
            .turns
            .iter()
            .filter_map(|t| {
                let role = match t.author {
                    Author::User => PlannerRole::User,
                    Author::Assistant => PlannerRole::Model,
                    Author::System => return None,
                };
                Some(PlannerTurn {
                    role,
                    text: t.content.clone(),
                })
            })
            .collect();
        if max_turns > 0 && mapped.len() > max_turns {
            mapped[mapped.len() - max_turns..].to_vec()
        } else {
            mapped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_context_drops_system_turns() {
        let mut conv = Conversation::starting_with(Turn::assistant("hello"));
        conv.push(Turn::user("email bob"));
        conv.push(Turn::system("Action cancelled."));
        conv.push(Turn::assistant("ok"));

        let ctx = conv.planner_context(0);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[0].role, PlannerRole::Model);
        assert_eq!(ctx[1].role, PlannerRole::User);
        assert_eq!(ctx[1].text, "email bob");
        assert!(ctx.iter().all(|t| t.text != "Action cancelled."));
    }

    #[test]
    fn test_planner_context_window_keeps_latest() {
        let mut conv = Conversation::new();
        for i in 0..6 {
            conv.push(Turn::user(format!("m{i}")));
        }
        let ctx = conv.planner_context(2);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].text, "m4");
        assert_eq!(ctx[1].text, "m5");
        // 存储的历史不剪枝
        assert_eq!(conv.len(), 6);
    }

    #[test]
    fn test_reset_to_single_turn() {
        let mut conv = Conversation::starting_with(Turn::assistant("a"));
        conv.push(Turn::user("b"));
        conv.reset_to(Turn::assistant("bye"));
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.last().map(|t| t.content.as_str()), Some("bye"));
    }
}
