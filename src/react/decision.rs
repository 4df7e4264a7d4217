//! DecisionMaker：请求模型 -> 解析 -> 交人确认；redo 时带上累计反馈重新请求
//!
//! 重做是显式循环而非递归，反馈按轮次累积在 feedback_log 中并随确认结果一同返回。
//! 每轮提示都从当前账本重新渲染，再依次附上已有反馈。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::TimedLlm;
use crate::memory::{ExecutionHistory, StepPayload};
use crate::react::contract::{parse_decision, Decision};
use crate::react::prompt::{decision_redo_prompt, PromptTemplate};
use crate::tools::ToolRegistry;
use crate::ui::{report_agent_error, Choice, UserInteraction};

/// 一次决策的结果
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    /// 人已确认；feedback_log 为确认前各轮 redo 的反馈
    Confirmed {
        decision: Decision,
        feedback_log: Vec<String>,
    },
    Aborted,
    Failed(AgentError),
}

pub struct DecisionMaker {
    llm: TimedLlm,
    registry: Arc<ToolRegistry>,
    ui: Arc<dyn UserInteraction>,
    track_history: bool,
}

impl DecisionMaker {
    pub fn new(llm: TimedLlm, registry: Arc<ToolRegistry>, ui: Arc<dyn UserInteraction>) -> Self {
        Self {
            llm,
            registry,
            ui,
            track_history: true,
        }
    }

    /// 关闭后不再写 llm_response / user_confirmation / feedback / error 步骤
    pub fn with_history_tracking(mut self, enabled: bool) -> Self {
        self.track_history = enabled;
        self
    }

    fn trace(&self, history: &mut ExecutionHistory, payload: StepPayload) {
        if !self.track_history {
            return;
        }
        if let Err(e) = history.add_step(payload) {
            tracing::warn!("decision trace not recorded: {}", e);
        }
    }

    fn build_prompt(
        &self,
        template: &PromptTemplate,
        history: &ExecutionHistory,
        feedback_log: &[String],
    ) -> String {
        feedback_log.iter().fold(
            template.render(&self.registry, history),
            |prompt, feedback| decision_redo_prompt(&prompt, feedback),
        )
    }

    async fn fail(
        &self,
        summary: &str,
        err: AgentError,
        history: &mut ExecutionHistory,
    ) -> DecisionOutcome {
        tracing::warn!(kind = err.kind(), "{}: {}", summary, err);
        report_agent_error(self.ui.as_ref(), summary, &err).await;
        self.trace(history, StepPayload::error(&err));
        DecisionOutcome::Failed(err)
    }

    /// 产生下一步决策，直到人确认或中止，或出现不可恢复的错误
    pub async fn decide(
        &self,
        template: &PromptTemplate,
        history: &mut ExecutionHistory,
    ) -> DecisionOutcome {
        let mut feedback_log: Vec<String> = Vec::new();

        loop {
            let round = feedback_log.len() + 1;
            tracing::debug!(round, "{}", history.status_report(true));
            let prompt = self.build_prompt(template, history, &feedback_log);

            let raw = match self.llm.generate(&prompt).await {
                Ok(raw) => raw,
                Err(e) => return self.fail("Error in decision making", e, history).await,
            };
            tracing::debug!(round, response = %raw, "LLM response");
            self.trace(
                history,
                StepPayload::LlmResponse {
                    content: raw.trim().to_string(),
                },
            );

            let decision = match parse_decision(&raw, &self.registry) {
                Ok(d) => d,
                Err(e) => {
                    let summary = match &e {
                        AgentError::UnknownTool(name) => format!("Unknown tool: {}", name),
                        AgentError::UnexpectedResponseType(_) => "Invalid response type".to_string(),
                        _ => "Failed to parse LLM response".to_string(),
                    };
                    return self.fail(&summary, e, history).await;
                }
            };

            let message = decision.display();
            tracing::info!(round, "proposed decision:\n{}", message);
            let confirmation = self
                .ui
                .get_confirmation(&message, decision.confirmation_prompt())
                .await;
            self.trace(
                history,
                StepPayload::UserConfirmation {
                    choice: confirmation.choice,
                    feedback: confirmation.feedback.clone(),
                    message,
                },
            );

            match confirmation.choice {
                Choice::Confirm => {
                    tracing::info!(round, "User confirmed decision");
                    return DecisionOutcome::Confirmed {
                        decision,
                        feedback_log,
                    };
                }
                Choice::Abort => {
                    tracing::info!(round, "User aborted execution");
                    return DecisionOutcome::Aborted;
                }
                Choice::Redo => {
                    let feedback = confirmation.feedback.unwrap_or_default();
                    tracing::info!(round, "User requested revision with feedback: {}", feedback);
                    self.trace(
                        history,
                        StepPayload::Feedback {
                            content: feedback.clone(),
                        },
                    );
                    feedback_log.push(feedback);
                }
            }
        }
    }
}
