//! 核心层：错误类型与单次运行上下文

pub mod context;
pub mod error;

pub use context::RunContext;
pub use error::AgentError;
