//! Pilot - 人在回路的 LLM 任务智能体
//!
//! 入口：解析参数、初始化日志、加载配置、启动工具提供方，在终端上跑一次任务。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pilot::config::load_config;
use pilot::ui::{ConsoleInteraction, UserInteraction};
use pilot::{create_agent_components, observability, RunOutcome};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "pilot", version, about = "Human-in-the-loop LLM task agent")]
struct Cli {
    /// 任务描述；省略时使用 [app].default_query，再不行就在终端询问
    query: Option<String>,

    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, env = "PILOT_CONFIG")]
    config: Option<PathBuf>,

    /// 覆盖 [app].max_iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// 运行结束后把账本以 JSON 写入该文件
    #[arg(long)]
    history_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init();

    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    if let Some(n) = cli.max_iterations {
        cfg.app.max_iterations = n;
    }

    let ui: Arc<dyn UserInteraction> = Arc::new(ConsoleInteraction::new());
    ui.show_information(
        &format!("Initializing {}...", cfg.app.name.as_deref().unwrap_or("pilot")),
        "Startup",
    )
    .await;

    let components = create_agent_components(&cfg, ui.clone())
        .await
        .context("Failed to create agent")?;

    let query = match cli.query.or_else(|| cfg.app.default_query.clone()) {
        Some(q) => q,
        None => {
            ui.escalate("What task should the agent perform?", "No task was given on the command line.")
                .await
        }
    };
    if query.trim().is_empty() {
        components.shutdown().await;
        anyhow::bail!("No task given");
    }

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, cancelling run");
            ctrl_c_token.cancel();
        }
    });

    let report = components.run_task(&query, cancel_token).await;
    components.shutdown().await;

    match &report.outcome {
        RunOutcome::Completed(answer) => {
            let body = format!(
                "Final Result: {}\nSummary: {}",
                answer.result,
                answer.summary.as_deref().unwrap_or("None")
            );
            ui.show_information(&body, "Agent Execution Complete").await;
        }
        other => {
            tracing::info!(outcome = other.label(), "Run ended without a final answer");
        }
    }
    let (prompt_tokens, completion_tokens, total_tokens) = components.token_usage();
    tracing::info!(
        run_id = %report.run_id,
        iterations = report.iterations,
        elapsed_ms = report.elapsed_ms,
        prompt_tokens,
        completion_tokens,
        total_tokens,
        "{}",
        report.history.status_report(false)
    );

    if let Some(path) = cli.history_out {
        let json = report
            .history
            .to_json()
            .context("Failed to serialize history")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}
