//! 记忆层：发给模型的消息与单次运行的执行账本

pub mod conversation;
pub mod history;

pub use conversation::{Message, Role};
pub use history::{
    ExecutionHistory, ExecutionSummary, Step, StepKind, StepPayload, ToolCallRecord,
};
