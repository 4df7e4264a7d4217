//! Planner：执行前一次性生成计划，走与决策相同的确认 / 重做 / 中止协议
//!
//! 重做时在原规划提示后追加修改意见，不重放执行账本；确认的计划写入账本一次。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::TimedLlm;
use crate::memory::ExecutionHistory;
use crate::react::contract::{parse_plan, Plan};
use crate::react::prompt::{plan_prompt, plan_redo_prompt};
use crate::ui::{report_agent_error, Choice, UserInteraction};

const PLAN_REVIEW_PROMPT: &str =
    "Please review the proposed plan. You can confirm to proceed, provide feedback to revise, or abort.";

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Confirmed { plan: Plan, feedback_log: Vec<String> },
    Aborted,
    Failed(AgentError),
}

pub struct Planner {
    llm: TimedLlm,
    ui: Arc<dyn UserInteraction>,
}

impl Planner {
    pub fn new(llm: TimedLlm, ui: Arc<dyn UserInteraction>) -> Self {
        Self { llm, ui }
    }

    async fn fail(&self, err: AgentError) -> PlanOutcome {
        tracing::error!(kind = err.kind(), "Error generating plan: {}", err);
        report_agent_error(self.ui.as_ref(), "Failed to generate plan", &err).await;
        PlanOutcome::Failed(err)
    }

    /// 生成并确认计划；确认后写入 history.plan
    pub async fn plan(&self, system_prompt: &str, history: &mut ExecutionHistory) -> PlanOutcome {
        tracing::info!("Generating initial plan...");
        let base = plan_prompt(system_prompt, history.user_query());
        let mut feedback_log: Vec<String> = Vec::new();

        loop {
            let round = feedback_log.len() + 1;
            let prompt = feedback_log
                .iter()
                .fold(base.clone(), |p, feedback| plan_redo_prompt(&p, feedback));

            let raw = match self.llm.generate(&prompt).await {
                Ok(raw) => raw,
                Err(e) => return self.fail(e).await,
            };
            tracing::debug!(round, response = %raw, "Plan response");

            let plan = match parse_plan(&raw) {
                Ok(plan) => plan,
                Err(e) => return self.fail(e).await,
            };

            let confirmation = self
                .ui
                .get_confirmation(&plan.display(), PLAN_REVIEW_PROMPT)
                .await;
            match confirmation.choice {
                Choice::Confirm => {
                    tracing::info!(round, steps = plan.steps.len(), "Plan confirmed by user");
                    if let Err(e) = history.set_plan(plan.clone()) {
                        return self.fail(e).await;
                    }
                    return PlanOutcome::Confirmed { plan, feedback_log };
                }
                Choice::Redo => {
                    let feedback = confirmation.feedback.unwrap_or_default();
                    tracing::info!(round, "User requested plan revision with feedback: {}", feedback);
                    feedback_log.push(feedback);
                }
                Choice::Abort => {
                    tracing::info!("Plan aborted by user");
                    self.ui
                        .show_information("Operation aborted by user", "Abort")
                        .await;
                    return PlanOutcome::Aborted;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::ui::{ScriptedInteraction, UiEvent};
    use std::time::Duration;

    const PLAN_ONE: &str = r#"```json
{"llm_response_type":"plan","steps":[{"step_number":1,"description":"add","reasoning":"need sum","expected_tool":"add"}]}
```"#;
    const PLAN_TWO: &str = r#"{"response_type":"plan","steps":[{"step_number":1,"description":"add","reasoning":"r"},{"step_number":2,"description":"answer","reasoning":"r"}]}"#;

    fn planner(responses: &[&str], ui: Arc<ScriptedInteraction>) -> (Planner, Arc<ScriptedLlmClient>) {
        let client = Arc::new(ScriptedLlmClient::new(
            responses.iter().map(|s| s.to_string()).collect(),
        ));
        let llm = TimedLlm::new(client.clone(), Duration::from_secs(5));
        (Planner::new(llm, ui), client)
    }

    #[tokio::test]
    async fn test_confirmed_plan_is_written_once() {
        let ui = Arc::new(ScriptedInteraction::new().then_confirm());
        let (planner, client) = planner(&[PLAN_ONE], ui);
        let mut history = ExecutionHistory::new("add 3 and 4");
        let outcome = planner.plan("SYSTEM", &mut history).await;
        assert!(matches!(outcome, PlanOutcome::Confirmed { .. }));
        assert!(history.has_plan());
        assert_eq!(history.step_count(), 0);
        assert_eq!(
            client.prompts()[0],
            "SYSTEM\n\nPlease generate a plan for the following query: add 3 and 4"
        );
    }

    #[tokio::test]
    async fn test_redo_appends_feedback_to_planning_prompt() {
        let ui = Arc::new(ScriptedInteraction::new().then_redo("two steps").then_confirm());
        let (planner, client) = planner(&[PLAN_ONE, PLAN_TWO], ui);
        let mut history = ExecutionHistory::new("q");
        match planner.plan("SYSTEM", &mut history).await {
            PlanOutcome::Confirmed { plan, feedback_log } => {
                assert_eq!(plan.steps.len(), 2);
                assert_eq!(feedback_log, vec!["two steps".to_string()]);
            }
            other => panic!("Expected confirmed plan, got {:?}", other),
        }
        let prompts = client.prompts();
        assert!(prompts[1].starts_with(&prompts[0]));
        assert!(prompts[1].contains("Revision Request Feedback: two steps"));
    }

    #[tokio::test]
    async fn test_abort_leaves_history_untouched() {
        let ui = Arc::new(ScriptedInteraction::new().then_abort());
        let (planner, _) = planner(&[PLAN_ONE], ui.clone());
        let mut history = ExecutionHistory::new("q");
        assert_eq!(planner.plan("S", &mut history).await, PlanOutcome::Aborted);
        assert!(!history.has_plan());
        assert!(ui
            .events()
            .iter()
            .any(|e| matches!(e, UiEvent::Information { title, .. } if title == "Abort")));
    }

    #[tokio::test]
    async fn test_decision_shape_is_unexpected_for_plan() {
        let ui = Arc::new(ScriptedInteraction::new());
        let (planner, _) = planner(
            &[r#"{"response_type":"final_answer","result":1,"summary":"s"}"#],
            ui.clone(),
        );
        let mut history = ExecutionHistory::new("q");
        assert!(matches!(
            planner.plan("S", &mut history).await,
            PlanOutcome::Failed(AgentError::UnexpectedResponseType(_))
        ));
        assert_eq!(ui.errors().len(), 1);
    }
}
