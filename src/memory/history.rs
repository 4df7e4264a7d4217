//! 执行账本：单次任务运行的计划、步骤与最终答案
//!
//! 只追加：步骤编号由追加时的位置推导（1 起始），不单独存储；
//! 一旦写入最终答案，运行即终止，后续 add_step 会被拒绝。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::AgentError;
use crate::react::contract::{FinalAnswer, Plan};
use crate::tools::ToolInvocationResult;
use crate::ui::Choice;

/// 步骤类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ToolCall,
    Feedback,
    LlmResponse,
    Error,
    UserConfirmation,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ToolCall => "tool_call",
            StepKind::Feedback => "feedback",
            StepKind::LlmResponse => "llm_response",
            StepKind::Error => "error",
            StepKind::UserConfirmation => "user_confirmation",
        }
    }
}

/// 一次工具调用的记录（参数为绑定前的原始值）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub parameters: serde_json::Value,
    pub reasoning: Option<String>,
    pub reasoning_tag: Option<String>,
    pub result: ToolInvocationResult,
}

/// 步骤内容（按 kind 打标签）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    ToolCall(ToolCallRecord),
    Feedback {
        content: String,
    },
    LlmResponse {
        content: String,
    },
    Error {
        error_type: String,
        error_message: String,
    },
    UserConfirmation {
        choice: Choice,
        feedback: Option<String>,
        message: String,
    },
}

impl StepPayload {
    pub fn kind(&self) -> StepKind {
        match self {
            StepPayload::ToolCall(_) => StepKind::ToolCall,
            StepPayload::Feedback { .. } => StepKind::Feedback,
            StepPayload::LlmResponse { .. } => StepKind::LlmResponse,
            StepPayload::Error { .. } => StepKind::Error,
            StepPayload::UserConfirmation { .. } => StepKind::UserConfirmation,
        }
    }

    pub fn error(err: &AgentError) -> Self {
        StepPayload::Error {
            error_type: err.kind().to_string(),
            error_message: err.to_string(),
        }
    }

    /// 单行摘要，用于 prompt 与状态输出
    fn summary(&self) -> String {
        match self {
            StepPayload::ToolCall(call) => format!(
                "{}({}) -> {} | reasoning: {}",
                call.tool,
                call.parameters,
                call.result,
                call.reasoning.as_deref().unwrap_or("-")
            ),
            StepPayload::Feedback { content } => format!("user feedback: {}", content),
            StepPayload::LlmResponse { content } => format!("model said: {}", content),
            StepPayload::Error {
                error_type,
                error_message,
            } => format!("{}: {}", error_type, error_message),
            StepPayload::UserConfirmation { choice, feedback, .. } => match feedback {
                Some(f) => format!("user chose {} ({})", choice.as_str(), f),
                None => format!("user chose {}", choice.as_str()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    #[serde(flatten)]
    pub payload: StepPayload,
    pub recorded_at: DateTime<Utc>,
}

impl Step {
    pub fn kind(&self) -> StepKind {
        self.payload.kind()
    }
}

/// 执行摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub has_plan: bool,
    pub total_steps: usize,
    pub has_final_answer: bool,
    pub user_query: String,
}

#[derive(Serialize)]
struct NumberedStep<'a> {
    step_number: usize,
    #[serde(flatten)]
    step: &'a Step,
}

#[derive(Serialize)]
struct LedgerView<'a> {
    user_query: &'a str,
    plan: Option<&'a Plan>,
    steps: Vec<NumberedStep<'a>>,
    final_answer: Option<&'a FinalAnswer>,
}

/// 单次运行的执行账本，由循环独占持有与修改
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    user_query: String,
    plan: Option<Plan>,
    steps: Vec<Step>,
    final_answer: Option<FinalAnswer>,
}

impl ExecutionHistory {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            plan: None,
            steps: Vec::new(),
            final_answer: None,
        }
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn has_plan(&self) -> bool {
        self.plan.is_some()
    }

    /// 写入已确认的计划；只能在第一步之前写入一次
    pub fn set_plan(&mut self, plan: Plan) -> Result<(), AgentError> {
        if self.plan.is_some() || !self.steps.is_empty() {
            return Err(AgentError::PlanAlreadySet);
        }
        self.plan = Some(plan);
        Ok(())
    }

    /// 追加一步，返回其编号；已有最终答案时拒绝
    pub fn add_step(&mut self, payload: StepPayload) -> Result<usize, AgentError> {
        if self.final_answer.is_some() {
            tracing::warn!(kind = payload.kind().as_str(), "step rejected: run already has a final answer");
            return Err(AgentError::HistoryFinalized);
        }
        self.steps.push(Step {
            payload,
            recorded_at: Utc::now(),
        });
        Ok(self.steps.len())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// (步骤编号, 步骤)，编号 1 起始
    pub fn numbered_steps(&self) -> impl Iterator<Item = (usize, &Step)> {
        self.steps.iter().enumerate().map(|(i, s)| (i + 1, s))
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// 下一次 add_step 将得到的编号
    pub fn next_step_number(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn count_of(&self, kind: StepKind) -> usize {
        self.steps.iter().filter(|s| s.kind() == kind).count()
    }

    pub fn final_answer(&self) -> Option<&FinalAnswer> {
        self.final_answer.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.final_answer.is_some()
    }

    pub fn set_final_answer(&mut self, answer: FinalAnswer) -> Result<(), AgentError> {
        if self.final_answer.is_some() {
            return Err(AgentError::HistoryFinalized);
        }
        self.final_answer = Some(answer);
        Ok(())
    }

    /// 清空计划、步骤与最终答案；user_query 在构造时确定，保留
    pub fn clear(&mut self) {
        self.plan = None;
        self.steps.clear();
        self.final_answer = None;
    }

    pub fn execution_summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            has_plan: self.has_plan(),
            total_steps: self.step_count(),
            has_final_answer: self.final_answer.is_some(),
            user_query: self.user_query.clone(),
        }
    }

    /// 状态报告：摘要或逐步详情
    pub fn status_report(&self, detailed: bool) -> String {
        let mut s = format!(
            "Query: {}\nPlan: {}\nSteps: {}\nFinal answer: {}\n",
            self.user_query,
            if self.has_plan() { "yes" } else { "no" },
            self.step_count(),
            if self.is_terminal() { "yes" } else { "no" },
        );
        if detailed {
            for (n, step) in self.numbered_steps() {
                s.push_str(&format!(
                    "  #{} [{}] {} ({})\n",
                    n,
                    step.kind().as_str(),
                    step.payload.summary(),
                    step.recorded_at.format("%H:%M:%S")
                ));
            }
        }
        s
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let view = LedgerView {
            user_query: &self.user_query,
            plan: self.plan.as_ref(),
            steps: self
                .numbered_steps()
                .map(|(step_number, step)| NumberedStep { step_number, step })
                .collect(),
            final_answer: self.final_answer.as_ref(),
        };
        serde_json::to_string_pretty(&view)
    }

    /// 构建供 prompt 使用的片段（Query / Plan / Steps so far / Final Answer）
    pub fn to_prompt_section(&self) -> String {
        let mut s = format!("## User Query\n{}\n\n", self.user_query);
        if let Some(plan) = &self.plan {
            s.push_str("## Confirmed Plan\n");
            for step in &plan.steps {
                s.push_str(&format!(
                    "{}. {} (tool: {})\n",
                    step.step_number,
                    step.description,
                    step.expected_tool.as_deref().unwrap_or("none")
                ));
            }
            s.push('\n');
        }
        s.push_str("## Steps so far\n");
        if self.steps.is_empty() {
            s.push_str("(none)\n");
        }
        for (n, step) in self.numbered_steps() {
            s.push_str(&format!(
                "{}. [{}] {}\n",
                n,
                step.kind().as_str(),
                step.payload.summary()
            ));
        }
        if let Some(answer) = &self.final_answer {
            s.push_str(&format!("\n## Final Answer\n{}\n", answer.result));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::contract::PlanStep;

    fn feedback(text: &str) -> StepPayload {
        StepPayload::Feedback {
            content: text.to_string(),
        }
    }

    fn tool_step(result: &str) -> StepPayload {
        StepPayload::ToolCall(ToolCallRecord {
            tool: "add".into(),
            parameters: serde_json::json!(["3", "4"]),
            reasoning: Some("sum".into()),
            reasoning_tag: None,
            result: ToolInvocationResult::Text(result.into()),
        })
    }

    #[test]
    fn test_step_numbers_follow_position() {
        let mut h = ExecutionHistory::new("q");
        assert_eq!(h.next_step_number(), 1);
        assert_eq!(h.add_step(feedback("a")).unwrap(), 1);
        assert_eq!(h.add_step(tool_step("7")).unwrap(), 2);
        assert_eq!(h.step_count(), 2);
        let numbers: Vec<usize> = h.numbered_steps().map(|(n, _)| n).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(h.last_step().unwrap().kind(), StepKind::ToolCall);
    }

    #[test]
    fn test_step_count_resets_on_clear() {
        let mut h = ExecutionHistory::new("q");
        for i in 0..3 {
            h.add_step(feedback(&i.to_string())).unwrap();
        }
        assert_eq!(h.step_count(), 3);
        h.clear();
        assert_eq!(h.step_count(), 0);
        assert_eq!(h.user_query(), "q");
        h.add_step(feedback("again")).unwrap();
        assert_eq!(h.step_count(), 1);
    }

    #[test]
    fn test_no_steps_after_final_answer() {
        let mut h = ExecutionHistory::new("q");
        h.add_step(tool_step("7")).unwrap();
        h.set_final_answer(FinalAnswer {
            result: serde_json::json!(7),
            summary: Some("done".into()),
        })
        .unwrap();
        assert!(h.is_terminal());
        assert_eq!(h.add_step(feedback("late")), Err(AgentError::HistoryFinalized));
        assert_eq!(h.step_count(), 1);
        assert!(h
            .set_final_answer(FinalAnswer {
                result: serde_json::Value::Null,
                summary: None,
            })
            .is_err());
    }

    #[test]
    fn test_plan_set_once_before_steps() {
        let plan = Plan {
            steps: vec![PlanStep {
                step_number: 1,
                description: "add".into(),
                reasoning: "needed".into(),
                expected_tool: Some("add".into()),
            }],
        };
        let mut h = ExecutionHistory::new("q");
        h.set_plan(plan.clone()).unwrap();
        assert!(h.has_plan());
        assert_eq!(h.set_plan(plan.clone()), Err(AgentError::PlanAlreadySet));

        let mut late = ExecutionHistory::new("q");
        late.add_step(feedback("x")).unwrap();
        assert_eq!(late.set_plan(plan), Err(AgentError::PlanAlreadySet));
    }

    #[test]
    fn test_summary_and_json() {
        let mut h = ExecutionHistory::new("add 3 and 4");
        h.add_step(tool_step("7")).unwrap();
        let summary = h.execution_summary();
        assert_eq!(
            summary,
            ExecutionSummary {
                has_plan: false,
                total_steps: 1,
                has_final_answer: false,
                user_query: "add 3 and 4".into(),
            }
        );

        let json: serde_json::Value = serde_json::from_str(&h.to_json().unwrap()).unwrap();
        assert_eq!(json["steps"][0]["step_number"], 1);
        assert_eq!(json["steps"][0]["kind"], "tool_call");
        assert_eq!(json["steps"][0]["result"], "7");
    }

    #[test]
    fn test_prompt_section_lists_steps() {
        let mut h = ExecutionHistory::new("add 3 and 4");
        let section = h.to_prompt_section();
        assert!(section.contains("(none)"));
        h.add_step(tool_step("7")).unwrap();
        let section = h.to_prompt_section();
        assert!(section.contains("## User Query\nadd 3 and 4"));
        assert!(section.contains("1. [tool_call] add"));
        assert!(section.contains("-> 7"));
        assert!(h.status_report(true).contains("#1 [tool_call]"));
    }
}
