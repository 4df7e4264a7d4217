//! 人机交互层：展示信息、报告错误、确认 / 重做 / 中止、升级提问
//!
//! 循环只依赖 UserInteraction trait；console 为终端实现，scripted 为按脚本应答的实现（测试与无人值守回放）。

pub mod console;
pub mod scripted;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::AgentError;

pub use console::ConsoleInteraction;
pub use scripted::{ScriptedInteraction, UiEvent};

/// 人对提案的选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Confirm,
    Redo,
    Abort,
}

impl Choice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::Confirm => "confirm",
            Choice::Redo => "redo",
            Choice::Abort => "abort",
        }
    }

    /// 解析用户输入（c / confirm / y、r / redo、a / abort / q）
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "c" | "confirm" | "y" | "yes" => Some(Choice::Confirm),
            "r" | "redo" => Some(Choice::Redo),
            "a" | "abort" | "q" | "quit" => Some(Choice::Abort),
            _ => None,
        }
    }
}

/// 一次确认的结果；feedback 仅在 redo 时有意义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub choice: Choice,
    pub feedback: Option<String>,
}

impl Confirmation {
    pub fn confirm() -> Self {
        Self {
            choice: Choice::Confirm,
            feedback: None,
        }
    }

    pub fn redo(feedback: impl Into<String>) -> Self {
        Self {
            choice: Choice::Redo,
            feedback: Some(feedback.into()),
        }
    }

    pub fn abort() -> Self {
        Self {
            choice: Choice::Abort,
            feedback: None,
        }
    }
}

/// 人机交互面：对循环而言均为阻塞调用；展示与报错为发后即忘，不影响控制流
#[async_trait]
pub trait UserInteraction: Send + Sync {
    async fn show_information(&self, body: &str, title: &str);

    async fn report_error(&self, summary: &str, title: &str, detail: Option<&str>);

    async fn get_confirmation(&self, body: &str, prompt: &str) -> Confirmation;

    async fn escalate(&self, question: &str, context: &str) -> String;
}

/// 以错误自身的标题与描述报告
pub async fn report_agent_error(ui: &dyn UserInteraction, summary: &str, err: &AgentError) {
    ui.report_error(summary, err.title(), Some(&err.to_string()))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_parse() {
        assert_eq!(Choice::parse(" C "), Some(Choice::Confirm));
        assert_eq!(Choice::parse("redo"), Some(Choice::Redo));
        assert_eq!(Choice::parse("q"), Some(Choice::Abort));
        assert_eq!(Choice::parse("maybe"), None);
    }
}
