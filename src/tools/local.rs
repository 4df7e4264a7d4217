//! 进程内工具提供方
//!
//! 实现 LocalTool 的工具注册到 LocalToolbox 后，即可像远端提供方一样通过 ToolTransport 调用；
//! 每次调用的参数会被记录，便于嵌入方与测试检查绑定结果。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::{Tool, ToolTransport};

/// 进程内工具：名称、描述、参数 schema、异步执行（args 为有序 JSON 对象）
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema，properties 的顺序即位置参数顺序
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
        })
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String>;
}

type Handler = dyn Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync;

/// 由闭包构造的工具
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    handler: Box<Handler>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, schema: Value, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl LocalTool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        (self.handler)(&args)
    }
}

/// 进程内工具提供方
pub struct LocalToolbox {
    name: String,
    tools: Vec<Arc<dyn LocalTool>>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl LocalToolbox {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tool(mut self, tool: impl LocalTool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// 已发生的调用（工具名, 绑定后的参数）
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ToolTransport for LocalToolbox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, AgentError> {
        Ok(self
            .tools
            .iter()
            .map(|t| Tool::new(t.name(), t.description(), t.parameters_schema()))
            .collect())
    }

    async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((name.to_string(), arguments.clone()));
        }
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        tool.execute(arguments)
            .await
            .map_err(|reason| AgentError::ToolInvocationFailure {
                tool: name.to_string(),
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upper() -> FnTool {
        FnTool::new(
            "upper",
            "Uppercase text",
            json!({"properties": {"text": {"type": "string"}}}),
            |args| {
                let text = args.get("text").and_then(Value::as_str).ok_or("missing text")?;
                Ok(json!(text.to_uppercase()))
            },
        )
    }

    #[tokio::test]
    async fn test_list_and_call() {
        let toolbox = LocalToolbox::new("local").with_tool(upper());
        let tools = toolbox.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "upper");

        let mut args = Map::new();
        args.insert("text".into(), json!("hi"));
        assert_eq!(toolbox.call("upper", args).await.unwrap(), json!("HI"));
        assert_eq!(toolbox.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_maps_to_invocation_error() {
        let toolbox = LocalToolbox::new("local").with_tool(upper());
        let err = toolbox.call("upper", Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolInvocationFailure { .. }));
        let err = toolbox.call("lower", Map::new()).await.unwrap_err();
        assert_eq!(err, AgentError::UnknownTool("lower".into()));
    }
}
