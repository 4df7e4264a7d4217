//! Agent 主循环
//!
//! 渲染系统提示 -> Planner 得到确认的计划 -> 最多 max_iterations 轮 { DecisionMaker -> ActionExecutor }，
//! 直到最终答案、中止、错误、预算耗尽或取消。任何一轮都不会自动重试，唯一的重试通道是人发起的 redo。

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::{AgentError, RunContext};
use crate::memory::ExecutionHistory;
use crate::react::contract::{Decision, FinalAnswer};
use crate::react::{DecisionMaker, DecisionOutcome, PlanOutcome, Planner, PromptTemplate};
use crate::tools::ActionExecutor;
use crate::ui::{report_agent_error, UserInteraction};

/// 一次运行所需的组件（均为借用，可跨运行复用）
pub struct AgentSession<'a> {
    pub planner: &'a Planner,
    pub decision_maker: &'a DecisionMaker,
    pub executor: &'a ActionExecutor,
    pub ui: &'a dyn UserInteraction,
    pub template: &'a PromptTemplate,
    pub cancel_token: CancellationToken,
    pub max_iterations: usize,
}

impl<'a> AgentSession<'a> {
    pub fn new(
        planner: &'a Planner,
        decision_maker: &'a DecisionMaker,
        executor: &'a ActionExecutor,
        ui: &'a dyn UserInteraction,
        template: &'a PromptTemplate,
    ) -> Self {
        Self {
            planner,
            decision_maker,
            executor,
            ui,
            template,
            cancel_token: CancellationToken::new(),
            max_iterations: 10,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// 运行如何结束
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(FinalAnswer),
    /// 人在计划阶段中止
    PlanRejected,
    PlanFailed(AgentError),
    /// 人在决策阶段中止
    Aborted,
    Failed(AgentError),
    IterationLimitReached,
    Cancelled,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed(_) => "completed",
            RunOutcome::PlanRejected => "plan_rejected",
            RunOutcome::PlanFailed(_) => "plan_failed",
            RunOutcome::Aborted => "aborted",
            RunOutcome::Failed(_) => "failed",
            RunOutcome::IterationLimitReached => "iteration_limit_reached",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

/// 运行结果：结局 + 完整账本
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub history: ExecutionHistory,
    pub iterations: usize,
    pub elapsed_ms: i64,
}

/// 执行一次任务运行
pub async fn run_agent(session: &AgentSession<'_>, query: &str) -> RunReport {
    let mut ctx = RunContext::new(session.max_iterations);
    let span = tracing::info_span!("run", run_id = %ctx.run_id);
    let mut history = ExecutionHistory::new(query);

    let outcome = drive(session, &mut ctx, &mut history).instrument(span).await;
    tracing::info!(
        run_id = %ctx.run_id,
        outcome = outcome.label(),
        iterations = ctx.iteration(),
        steps = history.step_count(),
        "run finished"
    );

    RunReport {
        run_id: ctx.run_id,
        outcome,
        iterations: ctx.iteration(),
        elapsed_ms: ctx.elapsed_ms(),
        history,
    }
}

async fn cancelled(session: &AgentSession<'_>) -> RunOutcome {
    tracing::warn!("Cancelled by user");
    session
        .ui
        .show_information("Run cancelled by user", "Cancelled")
        .await;
    RunOutcome::Cancelled
}

async fn drive(
    session: &AgentSession<'_>,
    ctx: &mut RunContext,
    history: &mut ExecutionHistory,
) -> RunOutcome {
    let token = &session.cancel_token;
    tracing::info!(query = %history.user_query(), tools = session.executor.registry().len(), "Starting run");

    let system_prompt = session
        .template
        .render(session.executor.registry(), history);
    let plan = tokio::select! {
        biased;
        _ = token.cancelled() => return cancelled(session).await,
        outcome = session.planner.plan(&system_prompt, history) => outcome,
    };
    match plan {
        PlanOutcome::Confirmed { .. } => {
            tracing::info!("Starting execution with confirmed plan...");
        }
        PlanOutcome::Aborted => return RunOutcome::PlanRejected,
        PlanOutcome::Failed(e) => return RunOutcome::PlanFailed(e),
    }

    loop {
        if token.is_cancelled() {
            return cancelled(session).await;
        }
        if ctx.budget_exhausted() {
            let err = format!("Stopped after {} iterations without a final answer", ctx.max_iterations);
            tracing::warn!("{}", err);
            session
                .ui
                .report_error("Maximum iterations reached", "Execution Error", Some(&err))
                .await;
            return RunOutcome::IterationLimitReached;
        }
        let iteration = ctx.advance();
        tracing::info!(iteration, "--- Iteration {} ---", iteration);

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return cancelled(session).await,
            outcome = session.decision_maker.decide(session.template, history) => outcome,
        };

        match outcome {
            DecisionOutcome::Confirmed {
                decision: Decision::FunctionCall(call),
                ..
            } => {
                let executed = tokio::select! {
                    biased;
                    _ = token.cancelled() => return cancelled(session).await,
                    result = session.executor.execute(&call, history) => result,
                };
                if let Err(e) = executed {
                    return RunOutcome::Failed(e);
                }
            }
            DecisionOutcome::Confirmed {
                decision: Decision::FinalAnswer(answer),
                ..
            } => {
                if let Err(e) = history.set_final_answer(answer.clone()) {
                    report_agent_error(session.ui, "Could not record final answer", &e).await;
                    return RunOutcome::Failed(e);
                }
                tracing::info!(result = %answer.result, "=== Agent Execution Complete ===");
                return RunOutcome::Completed(answer);
            }
            DecisionOutcome::Aborted => return RunOutcome::Aborted,
            DecisionOutcome::Failed(e) => return RunOutcome::Failed(e),
        }
    }
}
