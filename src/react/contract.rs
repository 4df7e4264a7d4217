//! 响应契约：把模型原始文本解析为 Decision 或 Plan
//!
//! 流程：去掉首尾代码围栏并 trim -> 解析为 JSON 对象 -> 按判别字段（response_type，兼容 llm_response_type）分派。
//! - plan：steps 数组，每步 step_number / description / reasoning / 可选 expected_tool
//! - function_call：function.name / parameters（数组或对象）/ 可选 reasoning、reasoning_tag；name 必须在工具目录中
//! - final_answer：result / summary，缺失视为 null

use std::sync::OnceLock;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::ToolRegistry;

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    pub step_number: u32,
    pub description: String,
    pub reasoning: String,
    #[serde(default)]
    pub expected_tool: Option<String>,
}

/// 有序计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// 供人审阅的展示文本
    pub fn display(&self) -> String {
        let mut s = String::from("Proposed Plan:\n");
        for step in &self.steps {
            s.push_str(&format!(
                "\nStep {}:\n- Action: {}\n- Reasoning: {}\n- Tool: {}",
                step.step_number,
                step.description,
                step.reasoning,
                step.expected_tool.as_deref().unwrap_or("No tool specified")
            ));
        }
        s
    }
}

/// 工具调用参数：位置数组或（有序）对象，两者都按出现顺序取值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Parameters {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::Named(Map::new())
    }
}

impl Parameters {
    /// 按出现顺序返回原始值
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Parameters::Positional(values) => values.iter().collect(),
            Parameters::Named(map) => map.values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Parameters::Positional(values) => values.len(),
            Parameters::Named(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_value(&self) -> Value {
        match self {
            Parameters::Positional(values) => Value::Array(values.clone()),
            Parameters::Named(map) => Value::Object(map.clone()),
        }
    }
}

/// 已解析并确认工具存在的函数调用
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub tool_name: String,
    pub parameters: Parameters,
    pub reasoning: Option<String>,
    pub reasoning_tag: Option<String>,
}

impl FunctionCall {
    pub fn reasoning_or_default(&self) -> &str {
        self.reasoning.as_deref().unwrap_or("No reasoning provided")
    }
}

/// 最终答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub summary: Option<String>,
}

/// 一轮模型决策
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    FunctionCall(FunctionCall),
    FinalAnswer(FinalAnswer),
}

impl Decision {
    /// 供人确认的展示文本
    pub fn display(&self) -> String {
        match self {
            Decision::FunctionCall(call) => format!(
                "Proposed Next Step:\nTool: {}\nParameters: {}\nReasoning: {}",
                call.tool_name,
                call.parameters.to_value(),
                call.reasoning_or_default()
            ),
            Decision::FinalAnswer(answer) => format!(
                "Execution Complete\nResult: {}\nSummary: {}",
                answer.result,
                answer.summary.as_deref().unwrap_or("None")
            ),
        }
    }

    /// 确认提示语
    pub fn confirmation_prompt(&self) -> &'static str {
        match self {
            Decision::FunctionCall(_) => "Do you want to proceed with this step?",
            Decision::FinalAnswer(_) => "Is this final result acceptable?",
        }
    }
}

/// function_call 中的 function 对象
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct FunctionSpec {
    /// 工具名，必须是工具目录中的名称
    name: String,
    /// 参数值，按工具参数声明顺序给出
    #[serde(default)]
    parameters: Parameters,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reasoning_tag: Option<String>,
}

#[derive(Deserialize)]
struct FunctionCallBody {
    function: FunctionSpec,
}

#[derive(Deserialize)]
struct PlanBody {
    steps: Vec<PlanStep>,
}

/// 三种合法响应（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(tag = "response_type", rename_all = "snake_case")]
enum ResponseFormat {
    Plan {
        steps: Vec<PlanStep>,
    },
    FunctionCall {
        function: FunctionSpec,
    },
    FinalAnswer {
        result: Value,
        summary: String,
    },
}

/// 返回响应格式的 JSON Schema 字符串，可拼入 system prompt
pub fn response_format_schema() -> String {
    let schema = schema_for!(ResponseFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn leading_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```(?:[A-Za-z0-9_+-]*\r?\n)?").expect("static regex"))
}

/// 去掉一个开头围栏（可带语言标记）与一个结尾围栏，再 trim
pub fn clean_response_text(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = leading_fence().replace(trimmed, "");
    let open: &str = &without_open;
    let without_close = open.strip_suffix("```").unwrap_or(open);
    without_close.trim().to_string()
}

fn parse_object(text: &str) -> Result<Map<String, Value>, AgentError> {
    let cleaned = clean_response_text(text);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::MalformedResponse(format!(
            "expected a JSON object, got: {}",
            other
        ))),
        Err(e) => Err(AgentError::MalformedResponse(format!("{}: {}", e, cleaned))),
    }
}

/// 判别字段：response_type 优先，兼容 llm_response_type
fn discriminator(map: &Map<String, Value>) -> Option<&str> {
    map.get("response_type")
        .or_else(|| map.get("llm_response_type"))
        .and_then(Value::as_str)
}

fn malformed(e: serde_json::Error) -> AgentError {
    AgentError::MalformedResponse(e.to_string())
}

/// 解析计划响应；判别字段不是 plan 时返回 UnexpectedResponseType
pub fn parse_plan(text: &str) -> Result<Plan, AgentError> {
    let map = parse_object(text)?;
    match discriminator(&map) {
        Some("plan") => {
            let body: PlanBody = serde_json::from_value(Value::Object(map)).map_err(malformed)?;
            Ok(Plan { steps: body.steps })
        }
        other => Err(AgentError::UnexpectedResponseType(format!(
            "expected plan, got {}",
            other.unwrap_or("<missing>")
        ))),
    }
}

/// 解析决策响应（function_call / final_answer），并对照工具目录校验工具名
pub fn parse_decision(text: &str, registry: &ToolRegistry) -> Result<Decision, AgentError> {
    let map = parse_object(text)?;
    match discriminator(&map) {
        Some("function_call") => {
            let body: FunctionCallBody =
                serde_json::from_value(Value::Object(map)).map_err(malformed)?;
            let spec = body.function;
            if !registry.contains(&spec.name) {
                return Err(AgentError::UnknownTool(spec.name));
            }
            Ok(Decision::FunctionCall(FunctionCall {
                tool_name: spec.name,
                parameters: spec.parameters,
                reasoning: spec.reasoning,
                reasoning_tag: spec.reasoning_tag,
            }))
        }
        Some("final_answer") => {
            let answer: FinalAnswer =
                serde_json::from_value(Value::Object(map)).map_err(malformed)?;
            Ok(Decision::FinalAnswer(answer))
        }
        other => Err(AgentError::UnexpectedResponseType(
            other.unwrap_or("<missing>").to_string(),
        )),
    }
}
