//! 按脚本应答的交互面
//!
//! 依次弹出预置的确认结果与回答，并记录每一次调用；脚本耗尽时确认视为 abort、回答为空串。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ui::{Confirmation, UserInteraction};

/// 交互面收到的一次调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Information {
        title: String,
        body: String,
    },
    Error {
        summary: String,
        title: String,
        detail: Option<String>,
    },
    Confirmation {
        body: String,
        prompt: String,
    },
    Escalation {
        question: String,
        context: String,
    },
}

#[derive(Debug, Default)]
pub struct ScriptedInteraction {
    confirmations: Mutex<VecDeque<Confirmation>>,
    answers: Mutex<VecDeque<String>>,
    events: Mutex<Vec<UiEvent>>,
}

impl ScriptedInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一次确认结果
    pub fn then(self, confirmation: Confirmation) -> Self {
        if let Ok(mut q) = self.confirmations.lock() {
            q.push_back(confirmation);
        }
        self
    }

    pub fn then_confirm(self) -> Self {
        self.then(Confirmation::confirm())
    }

    pub fn then_redo(self, feedback: impl Into<String>) -> Self {
        self.then(Confirmation::redo(feedback))
    }

    pub fn then_abort(self) -> Self {
        self.then(Confirmation::abort())
    }

    /// 追加一条 escalate 回答
    pub fn with_answer(self, answer: impl Into<String>) -> Self {
        if let Ok(mut q) = self.answers.lock() {
            q.push_back(answer.into());
        }
        self
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<UiEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, UiEvent::Error { .. }))
            .collect()
    }

    /// 被要求确认的次数
    pub fn confirmations_requested(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, UiEvent::Confirmation { .. }))
            .count()
    }

    fn record(&self, event: UiEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl UserInteraction for ScriptedInteraction {
    async fn show_information(&self, body: &str, title: &str) {
        self.record(UiEvent::Information {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    async fn report_error(&self, summary: &str, title: &str, detail: Option<&str>) {
        self.record(UiEvent::Error {
            summary: summary.to_string(),
            title: title.to_string(),
            detail: detail.map(str::to_string),
        });
    }

    async fn get_confirmation(&self, body: &str, prompt: &str) -> Confirmation {
        self.record(UiEvent::Confirmation {
            body: body.to_string(),
            prompt: prompt.to_string(),
        });
        self.confirmations
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(Confirmation::abort)
    }

    async fn escalate(&self, question: &str, context: &str) -> String {
        self.record(UiEvent::Escalation {
            question: question.to_string(),
            context: context.to_string(),
        });
        self.answers
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::Choice;

    #[tokio::test]
    async fn test_script_plays_in_order_then_aborts() {
        let ui = ScriptedInteraction::new().then_redo("more detail").then_confirm();
        assert_eq!(ui.get_confirmation("b", "p").await.choice, Choice::Redo);
        assert_eq!(ui.get_confirmation("b", "p").await, Confirmation::confirm());
        assert_eq!(ui.get_confirmation("b", "p").await, Confirmation::abort());
        assert_eq!(ui.confirmations_requested(), 3);
    }

    #[tokio::test]
    async fn test_records_errors_and_escalations() {
        let ui = ScriptedInteraction::new().with_answer("add 1 and 2");
        ui.report_error("boom", "Execution Error", Some("detail")).await;
        assert_eq!(ui.escalate("What?", "").await, "add 1 and 2");
        assert_eq!(ui.escalate("What?", "").await, "");
        assert_eq!(ui.errors().len(), 1);
        assert_eq!(ui.events().len(), 3);
        assert!(matches!(&ui.events()[2], UiEvent::Escalation { question, .. } if question == "What?"));
    }
}
