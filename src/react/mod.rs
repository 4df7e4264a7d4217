//! 决策层：响应契约、Prompt、Planner、DecisionMaker 与 Agent 主循环

pub mod contract;
pub mod decision;
pub mod loop_;
pub mod planner;
pub mod prompt;

pub use contract::{
    clean_response_text, parse_decision, parse_plan, response_format_schema, Decision, FinalAnswer,
    FunctionCall, Parameters, Plan, PlanStep,
};
pub use decision::{DecisionMaker, DecisionOutcome};
pub use loop_::{run_agent, AgentSession, RunOutcome, RunReport};
pub use planner::{PlanOutcome, Planner};
pub use prompt::{describe_tools, PromptTemplate};
