//! Agent 错误类型
//!
//! 覆盖一次任务运行中的全部失败：模型后端（超时 / 错误）、响应契约（格式 / 类型 / 未知工具）、
//! 参数绑定（数量 / 类型转换 / 数组）、工具调用与传输、账本状态、配置。

use std::time::Duration;

use thiserror::Error;

/// 任务运行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("LLM generation timed out after {0:?}")]
    BackendTimeout(Duration),

    #[error("LLM backend error: {0}")]
    BackendError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Not enough parameters provided for {tool}: required parameter '{parameter}' is missing")]
    ParameterCountError { tool: String, parameter: String },

    #[error("Failed to convert value '{value}' of '{parameter}' to type {expected}")]
    TypeCoercionError {
        parameter: String,
        expected: String,
        value: String,
    },

    #[error("Invalid array parameter '{parameter}': {value}")]
    InvalidArrayParameter { parameter: String, value: String },

    #[error("Tool {tool} failed: {reason}")]
    ToolInvocationFailure { tool: String, reason: String },

    #[error("Tool transport error: {0}")]
    Transport(String),

    #[error("Execution history already has a final answer")]
    HistoryFinalized,

    #[error("Execution history already has a plan")]
    PlanAlreadySet,

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 稳定的 snake_case 标签，用于账本 error 步骤与日志
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::BackendTimeout(_) => "backend_timeout",
            AgentError::BackendError(_) => "backend_error",
            AgentError::MalformedResponse(_) => "malformed_response",
            AgentError::UnexpectedResponseType(_) => "unexpected_response_type",
            AgentError::UnknownTool(_) => "unknown_tool",
            AgentError::ParameterCountError { .. } => "parameter_count_error",
            AgentError::TypeCoercionError { .. } => "type_coercion_error",
            AgentError::InvalidArrayParameter { .. } => "invalid_array_parameter",
            AgentError::ToolInvocationFailure { .. } => "tool_invocation_failure",
            AgentError::Transport(_) => "transport_error",
            AgentError::HistoryFinalized => "history_finalized",
            AgentError::PlanAlreadySet => "plan_already_set",
            AgentError::Config(_) => "config_error",
        }
    }

    /// 面向人的错误标题（report_error 的 title）
    pub fn title(&self) -> &'static str {
        match self {
            AgentError::BackendTimeout(_) | AgentError::BackendError(_) => "LLM Error",
            AgentError::MalformedResponse(_) => "Parse Error",
            AgentError::UnexpectedResponseType(_) => "Decision Error",
            AgentError::UnknownTool(_) => "Tool Error",
            AgentError::ParameterCountError { .. } => "Parameter Error",
            AgentError::TypeCoercionError { .. } | AgentError::InvalidArrayParameter { .. } => {
                "Type Error"
            }
            AgentError::ToolInvocationFailure { .. } | AgentError::Transport(_) => {
                "Execution Error"
            }
            AgentError::HistoryFinalized | AgentError::PlanAlreadySet => "History Error",
            AgentError::Config(_) => "Config Error",
        }
    }

    /// 是否属于参数绑定阶段（工具尚未被调用）
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            AgentError::ParameterCountError { .. }
                | AgentError::TypeCoercionError { .. }
                | AgentError::InvalidArrayParameter { .. }
        )
    }
}
