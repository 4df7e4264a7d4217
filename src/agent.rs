//! Agent 运行时装配
//!
//! create_agent_components 按配置选择 LLM、启动 MCP 工具提供方并建立工具目录；
//! AgentComponents::assemble 接受现成的 LLM 与目录（测试与嵌入方使用）；
//! run_task 对单个任务跑一次完整循环，shutdown 关闭全部工具提供方。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_llm_from_config, LlmClient, TimedLlm};
use crate::react::{run_agent, AgentSession, DecisionMaker, Planner, PromptTemplate, RunReport};
use crate::tools::{ActionExecutor, McpStdioTransport, ToolRegistry, ToolTransport};
use crate::ui::UserInteraction;

/// 预构建的 Agent 组件，可跨多次运行复用
pub struct AgentComponents {
    pub planner: Planner,
    pub decision_maker: DecisionMaker,
    pub executor: ActionExecutor,
    pub ui: Arc<dyn UserInteraction>,
    pub template: PromptTemplate,
    pub max_iterations: usize,
    llm: TimedLlm,
    transports: Vec<Arc<McpStdioTransport>>,
}

impl AgentComponents {
    /// 用现成的 LLM 与工具目录装配组件
    pub fn assemble(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        ui: Arc<dyn UserInteraction>,
        template: PromptTemplate,
    ) -> Self {
        let timed = TimedLlm::new(llm, Duration::from_secs(cfg.llm.timeouts.request));
        let registry = Arc::new(registry);
        Self {
            planner: Planner::new(timed.clone(), ui.clone()),
            decision_maker: DecisionMaker::new(timed.clone(), registry.clone(), ui.clone())
                .with_history_tracking(cfg.app.track_decision_trace),
            executor: ActionExecutor::new(registry, ui.clone()),
            ui,
            template,
            max_iterations: cfg.app.max_iterations,
            llm: timed,
            transports: Vec::new(),
        }
    }

    /// 跑一次任务
    pub async fn run_task(&self, query: &str, cancel_token: CancellationToken) -> RunReport {
        let session = AgentSession::new(
            &self.planner,
            &self.decision_maker,
            &self.executor,
            self.ui.as_ref(),
            &self.template,
        )
        .with_cancel_token(cancel_token)
        .with_max_iterations(self.max_iterations);
        run_agent(&session, query).await
    }

    /// 后端累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.client().token_usage()
    }

    /// 关闭全部 MCP 工具提供方
    pub async fn shutdown(&self) {
        shutdown_all(&self.transports).await;
    }
}

async fn shutdown_all(transports: &[Arc<McpStdioTransport>]) {
    for transport in transports {
        transport.shutdown().await;
    }
}

/// 从配置创建 Agent 组件：选择 LLM、启动 [[mcp.servers]]、加载系统模板
///
/// 任一提供方启动或列工具失败时，已启动的提供方会被关闭后再返回错误。
pub async fn create_agent_components(
    cfg: &AppConfig,
    ui: Arc<dyn UserInteraction>,
) -> Result<AgentComponents, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    let template = PromptTemplate::load(cfg.prompts.system_path.as_deref())?;

    let mut transports: Vec<Arc<McpStdioTransport>> = Vec::new();
    let mut registry = ToolRegistry::new();
    for server in &cfg.mcp.servers {
        let connected = match McpStdioTransport::connect(server).await {
            Ok(t) => Arc::new(t),
            Err(e) => {
                shutdown_all(&transports).await;
                return Err(e);
            }
        };
        transports.push(connected.clone());
        let transport: Arc<dyn ToolTransport> = connected;
        if let Err(e) = registry.register_transport(transport).await {
            shutdown_all(&transports).await;
            return Err(e);
        }
    }
    if registry.is_empty() {
        tracing::warn!("No tools registered; the agent can only answer directly");
    }

    let mut components = AgentComponents::assemble(cfg, llm, registry, ui, template);
    components.transports = transports;
    Ok(components)
}
