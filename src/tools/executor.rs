//! 动作执行器
//!
//! 对一个已确认的 FunctionCall：查工具与传输 -> 按 schema 顺序绑定参数 -> 调用 -> 归一化结果 -> 写入 tool_call 步骤。
//! 任何一步失败都不写步骤，错误原样返回由循环决定终止；每次调用都会告知交互面并输出一行 JSON 审计日志。

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::memory::{ExecutionHistory, StepPayload, ToolCallRecord};
use crate::react::contract::FunctionCall;
use crate::tools::{bind_arguments, ToolRegistry};
use crate::ui::{report_agent_error, UserInteraction};

/// 一次工具调用的归一化结果：单个字符串或按内容项拆分的字符串序列
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolInvocationResult {
    Text(String),
    Items(Vec<String>),
}

impl fmt::Display for ToolInvocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolInvocationResult::Text(text) => f.write_str(text),
            ToolInvocationResult::Items(items) => f.write_str(&items.join("\n")),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 归一化传输返回：有 content 数组时逐项取 text（无 text 字段则整体转字符串），否则整体转字符串
pub fn normalize_result(raw: &Value) -> ToolInvocationResult {
    match raw.get("content") {
        Some(Value::Array(items)) => ToolInvocationResult::Items(
            items
                .iter()
                .map(|item| {
                    item.get("text")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| value_text(item))
                })
                .collect(),
        ),
        Some(other) => ToolInvocationResult::Text(value_text(other)),
        None => ToolInvocationResult::Text(value_text(raw)),
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

/// 动作执行器：持有只读工具目录与交互面
pub struct ActionExecutor {
    registry: Arc<ToolRegistry>,
    ui: Arc<dyn UserInteraction>,
}

impl ActionExecutor {
    pub fn new(registry: Arc<ToolRegistry>, ui: Arc<dyn UserInteraction>) -> Self {
        Self { registry, ui }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一次函数调用并写入 tool_call 步骤
    pub async fn execute(
        &self,
        call: &FunctionCall,
        history: &mut ExecutionHistory,
    ) -> Result<ToolInvocationResult, AgentError> {
        self.ui
            .show_information(
                &format!(
                    "Executing tool: {}\nParameters: {}\nReasoning: {}",
                    call.tool_name,
                    call.parameters.to_value(),
                    call.reasoning_or_default()
                ),
                "Tool Execution",
            )
            .await;

        let outcome = match self.invoke(call).await {
            Ok(result) => self.record(call, result, history),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((result, step_number)) => {
                self.ui
                    .show_information(
                        &format!(
                            "Tool execution successful!\n\nResult: {}\n\nStep Details:\n- Function: {}\n- Reasoning: {}\n- Step Number: {}\n- Total Steps: {}",
                            result,
                            call.tool_name,
                            call.reasoning_or_default(),
                            step_number,
                            history.step_count()
                        ),
                        "Execution Success",
                    )
                    .await;
                Ok(result)
            }
            Err(e) => {
                tracing::error!(
                    tool = %call.tool_name,
                    kind = e.kind(),
                    binding_error = e.is_binding_error(),
                    "Error executing tool: {}",
                    e
                );
                report_agent_error(
                    self.ui.as_ref(),
                    &format!("Error executing tool: {}", call.tool_name),
                    &e,
                )
                .await;
                Err(e)
            }
        }
    }

    /// 绑定参数并调用传输，返回归一化结果
    async fn invoke(&self, call: &FunctionCall) -> Result<ToolInvocationResult, AgentError> {
        let tool = self
            .registry
            .get(&call.tool_name)
            .ok_or_else(|| AgentError::UnknownTool(call.tool_name.clone()))?;
        let transport = self
            .registry
            .transport_for(&call.tool_name)
            .ok_or_else(|| AgentError::Transport(format!("no session for tool {}", call.tool_name)))?;

        let arguments = bind_arguments(tool, &call.parameters)?;
        let preview = args_preview(&arguments);

        let start = Instant::now();
        let raw = transport.call(&call.tool_name, arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool_name,
            "provider": transport.name(),
            "ok": raw.is_ok(),
            "outcome": if raw.is_ok() { "ok" } else { "error" },
            "duration_ms": duration_ms,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        raw.map(|value| normalize_result(&value))
    }

    fn record(
        &self,
        call: &FunctionCall,
        result: ToolInvocationResult,
        history: &mut ExecutionHistory,
    ) -> Result<(ToolInvocationResult, usize), AgentError> {
        let step_number = history.add_step(StepPayload::ToolCall(ToolCallRecord {
            tool: call.tool_name.clone(),
            parameters: call.parameters.to_value(),
            reasoning: call.reasoning.clone(),
            reasoning_tag: call.reasoning_tag.clone(),
            result: result.clone(),
        }))?;
        Ok((result, step_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::contract::Parameters;
    use crate::tools::{FnTool, LocalToolbox, ToolTransport};
    use crate::ui::{ScriptedInteraction, UiEvent};
    use serde_json::json;

    async fn setup() -> (ActionExecutor, Arc<LocalToolbox>, Arc<ScriptedInteraction>) {
        let toolbox = Arc::new(
            LocalToolbox::new("math").with_tool(FnTool::new(
                "sum_list",
                "Sum integers",
                json!({"properties": {"xs": {"type": "array"}}}),
                |args| {
                    let xs = args["xs"].as_array().ok_or("xs must be an array")?;
                    let total: i64 = xs.iter().filter_map(Value::as_i64).sum();
                    Ok(json!({"content": [{"type": "text", "text": total.to_string()}]}))
                },
            )),
        );
        let mut registry = ToolRegistry::new();
        let transport: Arc<dyn ToolTransport> = toolbox.clone();
        registry.register_transport(transport).await.unwrap();
        let ui = Arc::new(ScriptedInteraction::new());
        let executor = ActionExecutor::new(Arc::new(registry), ui.clone());
        (executor, toolbox, ui)
    }

    fn call(parameters: Value) -> FunctionCall {
        FunctionCall {
            tool_name: "sum_list".into(),
            parameters: serde_json::from_value::<Parameters>(parameters).unwrap(),
            reasoning: Some("sum them".into()),
            reasoning_tag: Some("arithmetic".into()),
        }
    }

    #[test]
    fn test_normalize_result_shapes() {
        assert_eq!(
            normalize_result(&json!({"content": [{"type": "text", "text": "a"}, {"type": "image", "data": "x"}]})),
            ToolInvocationResult::Items(vec![
                "a".to_string(),
                r#"{"type":"image","data":"x"}"#.to_string()
            ])
        );
        assert_eq!(normalize_result(&json!("7")), ToolInvocationResult::Text("7".into()));
        assert_eq!(normalize_result(&json!(7)), ToolInvocationResult::Text("7".into()));
        assert_eq!(
            normalize_result(&json!({"content": "plain"})),
            ToolInvocationResult::Text("plain".into())
        );
    }

    #[tokio::test]
    async fn test_array_text_is_coerced_and_recorded() {
        let (executor, toolbox, ui) = setup().await;
        let mut history = ExecutionHistory::new("sum");
        let result = executor
            .execute(&call(json!({"xs": "[1, 2, 3]"})), &mut history)
            .await
            .unwrap();
        assert_eq!(result, ToolInvocationResult::Items(vec!["6".into()]));
        assert_eq!(toolbox.calls()[0].1["xs"], json!([1, 2, 3]));

        assert_eq!(history.step_count(), 1);
        match &history.steps()[0].payload {
            StepPayload::ToolCall(record) => {
                assert_eq!(record.parameters, json!({"xs": "[1, 2, 3]"}));
                assert_eq!(record.reasoning_tag.as_deref(), Some("arithmetic"));
            }
            other => panic!("Expected ToolCall, got {:?}", other),
        }
        assert!(ui.errors().is_empty());
        assert!(ui
            .events()
            .iter()
            .any(|e| matches!(e, UiEvent::Information { title, .. } if title == "Execution Success")));
    }

    #[tokio::test]
    async fn test_failure_appends_no_step_and_reports() {
        let (executor, toolbox, ui) = setup().await;
        let mut history = ExecutionHistory::new("sum");
        let err = executor
            .execute(&call(json!([{"not": "an array"}])), &mut history)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArrayParameter { .. }));
        assert_eq!(history.step_count(), 0);
        assert!(toolbox.calls().is_empty());
        assert_eq!(ui.errors().len(), 1);

        let err = executor.execute(&call(json!([])), &mut history).await.unwrap_err();
        assert!(matches!(err, AgentError::ParameterCountError { .. }));
        assert_eq!(history.step_count(), 0);
    }

    #[tokio::test]
    async fn test_positional_values_and_unknown_tool() {
        let (executor, _toolbox, _ui) = setup().await;
        let mut history = ExecutionHistory::new("sum");
        let result = executor
            .execute(&call(json!(["[1, 2]"])), &mut history)
            .await;
        assert_eq!(result, Ok(ToolInvocationResult::Items(vec!["3".into()])));

        let bad = FunctionCall {
            tool_name: "missing".into(),
            parameters: Parameters::default(),
            reasoning: None,
            reasoning_tag: None,
        };
        assert_eq!(
            executor.execute(&bad, &mut history).await,
            Err(AgentError::UnknownTool("missing".into()))
        );
        assert_eq!(history.step_count(), 1);
    }
}
