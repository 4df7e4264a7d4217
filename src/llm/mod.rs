//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Scripted）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::ScriptedLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, TimedLlm};

/// 按配置与可用 Key 选择后端
///
/// 有 DEEPSEEK_API_KEY，或 provider 为 deepseek 且仅有 OPENAI_API_KEY 时走 DeepSeek 兼容端点；
/// provider 非 deepseek 且有 OPENAI_API_KEY 时走 OpenAI；都没有则报配置错误。
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    if provider != "deepseek" {
        if let Some(key) = &openai_key {
            let model = cfg
                .llm
                .openai
                .model
                .clone()
                .unwrap_or_else(|| cfg.llm.model.clone());
            tracing::info!("Using OpenAI LLM ({})", model);
            return Ok(Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &model,
                key,
            )));
        }
    }

    let key = match (deepseek_key, openai_key, provider.as_str()) {
        (Some(key), _, _) => key,
        (None, Some(key), "deepseek") => key,
        _ => {
            return Err(AgentError::Config(
                "no API key found: set DEEPSEEK_API_KEY or OPENAI_API_KEY".to_string(),
            ))
        }
    };
    let model = cfg
        .llm
        .deepseek
        .model
        .clone()
        .unwrap_or_else(|| cfg.llm.model.clone());
    tracing::info!("Using DeepSeek LLM ({})", model);
    Ok(Arc::new(create_deepseek_client(Some(&model), &key)))
}
