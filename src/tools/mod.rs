pub mod executor;
pub mod local;
pub mod mcp;
pub mod params;
pub mod registry;

pub use executor::{normalize_result, ActionExecutor, ToolInvocationResult};
pub use local::{FnTool, LocalTool, LocalToolbox};
pub use mcp::McpStdioTransport;
pub use params::{bind_arguments, coerce_value};
pub use registry::{ParamType, Tool, ToolRegistry, ToolTransport};
