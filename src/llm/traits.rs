//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Scripted）实现 LlmClient；循环内统一经 TimedLlm 调用，
//! 以请求超时包裹每次生成，并把失败映射为 AgentError。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::memory::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 带超时的生成入口：单条 user 消息进，原始文本出
#[derive(Clone)]
pub struct TimedLlm {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl TimedLlm {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    /// 生成一次回复；超时 -> BackendTimeout，后端报错 -> BackendError
    pub async fn generate(&self, prompt: &str) -> Result<String, AgentError> {
        let messages = [Message::user(prompt)];
        match tokio::time::timeout(self.timeout, self.client.complete(&messages)).await {
            Ok(Ok(text)) => {
                let (prompt_tokens, completion_tokens, total) = self.client.token_usage();
                tracing::debug!(prompt_tokens, completion_tokens, total, "LLM call finished");
                Ok(text)
            }
            Ok(Err(e)) => Err(AgentError::BackendError(e)),
            Err(_) => Err(AgentError::BackendTimeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[tokio::test]
    async fn test_generate_passes_prompt_as_user_message() {
        let client = Arc::new(ScriptedLlmClient::new(vec!["hello".to_string()]));
        let llm = TimedLlm::new(client.clone(), Duration::from_secs(5));
        assert_eq!(llm.generate("say hi").await.unwrap(), "hello");
        assert_eq!(client.prompts(), vec!["say hi".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_and_backend_error() {
        let slow = Arc::new(
            ScriptedLlmClient::new(vec!["late".to_string()]).with_delay(Duration::from_millis(200)),
        );
        let llm = TimedLlm::new(slow, Duration::from_millis(20));
        let err = llm.generate("x").await.unwrap_err();
        assert_eq!(err, AgentError::BackendTimeout(Duration::from_millis(20)));
        assert_eq!(err.to_string(), "LLM generation timed out after 20ms");

        let empty = Arc::new(ScriptedLlmClient::new(Vec::new()));
        let llm = TimedLlm::new(empty, Duration::from_secs(1));
        assert!(matches!(llm.generate("x").await, Err(AgentError::BackendError(_))));
    }
}
