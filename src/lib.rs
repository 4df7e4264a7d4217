//! Pilot - 人在回路的 LLM 任务智能体
//!
//! 模块划分：
//! - **agent**: 运行时装配（LLM、MCP 工具提供方、Planner / DecisionMaker / ActionExecutor）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与单次运行上下文
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Scripted）
//! - **memory**: 执行账本与 LLM 消息
//! - **observability**: 日志初始化
//! - **react**: 响应契约、Prompt、Planner、DecisionMaker、主循环
//! - **tools**: 工具目录、参数绑定、执行器、stdio MCP 与进程内提供方
//! - **ui**: 人机交互面（终端 / 脚本）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod ui;

pub use agent::{create_agent_components, AgentComponents};
pub use core::AgentError;
pub use react::{RunOutcome, RunReport};
