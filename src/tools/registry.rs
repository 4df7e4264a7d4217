//! 工具目录与传输注册表
//!
//! Tool 是与传输无关的描述（名称、描述、input_schema）；ToolTransport 是可调用工具的远端会话
//! （list_tools / call）；ToolRegistry 按名称把 Tool 映射到其所属的传输，目录顺序即注册顺序。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 参数声明类型（input_schema.properties.*.type）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    Number,
    Array,
    String,
    /// 其它声明（boolean、object 等），按字符串原样传递
    Other(String),
}

impl ParamType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "array" => ParamType::Array,
            "string" => ParamType::String,
            other => ParamType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Array => "array",
            ParamType::String => "string",
            ParamType::Other(tag) => tag,
        }
    }
}

/// 工具描述：由外部注册表提供，运行期间只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", alias = "input_schema", default)]
    pub input_schema: Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }

    /// 按 schema 声明顺序返回 (参数名, 类型)；未声明 type 的参数视为 string
    pub fn parameters(&self) -> Vec<(String, ParamType)> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, info)| {
                        let tag = info.get("type").and_then(Value::as_str).unwrap_or("string");
                        (name.clone(), ParamType::from_tag(tag))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_declared_properties(&self) -> bool {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .is_some()
    }
}

/// 工具传输：一个工具提供方的会话
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// 提供方名称（用于日志）
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<Tool>, AgentError>;

    /// 以有序参数映射调用工具，返回原始结果（如 MCP 的 {"content": [...]}）
    async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, AgentError>;
}

struct Entry {
    tool: Tool,
    transport: Arc<dyn ToolTransport>,
}

/// 工具注册表：name -> (Tool, 传输)，目录按注册顺序
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册单个工具；同名工具已存在时跳过并返回 false
    pub fn register(&mut self, tool: Tool, transport: Arc<dyn ToolTransport>) -> bool {
        if self.index.contains_key(&tool.name) {
            tracing::warn!(
                tool = %tool.name,
                provider = transport.name(),
                "duplicate tool name, keeping the first registration"
            );
            return false;
        }
        self.index.insert(tool.name.clone(), self.entries.len());
        self.entries.push(Entry { tool, transport });
        true
    }

    /// 列出传输提供的全部工具并注册，返回新注册数量
    pub async fn register_transport(
        &mut self,
        transport: Arc<dyn ToolTransport>,
    ) -> Result<usize, AgentError> {
        let tools = transport.list_tools().await?;
        tracing::info!(provider = transport.name(), count = tools.len(), "tools listed");
        let mut added = 0;
        for tool in tools {
            if self.register(tool, transport.clone()) {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.entries[i].tool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn transport_for(&self, name: &str) -> Option<Arc<dyn ToolTransport>> {
        self.index.get(name).map(|&i| self.entries[i].transport.clone())
    }

    /// 目录（注册顺序）
    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.entries.iter().map(|e| &e.tool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::LocalToolbox;
    use serde_json::json;

    fn add_tool() -> Tool {
        Tool::new(
            "add",
            "Add two integers",
            json!({"type": "object", "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}}}),
        )
    }

    #[test]
    fn test_parameters_keep_schema_order() {
        let tool = Tool::new(
            "mix",
            "",
            json!({"properties": {"z": {"type": "array"}, "a": {"type": "number"}, "m": {}}}),
        );
        assert_eq!(
            tool.parameters(),
            vec![
                ("z".to_string(), ParamType::Array),
                ("a".to_string(), ParamType::Number),
                ("m".to_string(), ParamType::String),
            ]
        );
    }

    #[test]
    fn test_tool_deserializes_mcp_shape() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "add",
            "description": "Add",
            "inputSchema": {"properties": {"a": {"type": "integer"}}}
        }))
        .unwrap();
        assert_eq!(tool.parameters(), vec![("a".to_string(), ParamType::Integer)]);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let first: Arc<dyn ToolTransport> = Arc::new(LocalToolbox::new("first"));
        let second: Arc<dyn ToolTransport> = Arc::new(LocalToolbox::new("second"));
        let mut registry = ToolRegistry::new();
        assert!(registry.register(add_tool(), first));
        assert!(!registry.register(add_tool(), second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.transport_for("add").unwrap().name(), "first");
        assert!(registry.get("sub").is_none());
    }
}
