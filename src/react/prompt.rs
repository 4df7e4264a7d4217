//! Prompt 构建：工具目录描述、系统模板渲染、规划与重做提示拼接

use std::path::Path;

use crate::core::AgentError;
use crate::memory::ExecutionHistory;
use crate::react::contract::response_format_schema;
use crate::tools::ToolRegistry;

const BUILTIN_TEMPLATE: &str = include_str!("../../config/prompts/system.txt");

/// 工具目录：每行 `序号. 名称(参数: 类型, ...) - 描述`
pub fn describe_tools(registry: &ToolRegistry) -> String {
    registry
        .tools()
        .enumerate()
        .map(|(i, tool)| {
            let params = if tool.has_declared_properties() {
                tool.parameters()
                    .iter()
                    .map(|(name, ty)| format!("{}: {}", name, ty.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ")
            } else {
                "no parameters".to_string()
            };
            format!(
                "{}. {}({}) - {}",
                i + 1,
                tool.name,
                params,
                tool.description.as_deref().unwrap_or("No description")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 规划提示：系统上下文 + 规划请求
pub fn plan_prompt(system_prompt: &str, query: &str) -> String {
    format!(
        "{}\n\nPlease generate a plan for the following query: {}",
        system_prompt, query
    )
}

/// 规划重做：在规划提示后附上修改意见
pub fn plan_redo_prompt(plan_prompt: &str, feedback: &str) -> String {
    format!(
        "{}\n\nRevision Request Feedback: {}\n\nYou need to consider the revision request feedback while generating the plan.",
        plan_prompt, feedback
    )
}

/// 决策重做：在决策提示后附上反馈
pub fn decision_redo_prompt(prompt: &str, feedback: &str) -> String {
    format!(
        "{}\n\nPrevious Feedback: {}\n\n. Refer to the context history and previous feedback to determine the next step.",
        prompt, feedback
    )
}

/// 系统模板，占位符：{tools_description} {execution_history} {user_query} {response_format}
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(BUILTIN_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, AgentError> {
        std::fs::read_to_string(path)
            .map(Self::new)
            .map_err(|e| AgentError::Config(format!("cannot read prompt {}: {}", path.display(), e)))
    }

    /// 显式路径必须可读；未给出时尝试 config/prompts/system.txt，再退回内置模板
    pub fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let found = ["config/prompts/system.txt", "../config/prompts/system.txt"]
            .into_iter()
            .find_map(|p| std::fs::read_to_string(p).ok());
        Ok(found.map(Self::new).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// 用工具目录与当前账本填充模板
    pub fn render(&self, registry: &ToolRegistry, history: &ExecutionHistory) -> String {
        self.template
            .replace("{tools_description}", &describe_tools(registry))
            .replace("{response_format}", &response_format_schema())
            .replace("{user_query}", history.user_query())
            .replace("{execution_history}", &history.to_prompt_section())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use crate::tools::{LocalToolbox, ToolTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> ToolRegistry {
        let transport: Arc<dyn ToolTransport> = Arc::new(LocalToolbox::new("local"));
        let mut registry = ToolRegistry::new();
        registry.register(
            Tool::new(
                "add",
                "Add two integers",
                json!({"properties": {"a": {"type": "integer"}, "b": {"type": "integer"}}}),
            ),
            transport.clone(),
        );
        registry.register(Tool::new("now", "Current time", json!({})), transport);
        registry
    }

    #[test]
    fn test_describe_tools() {
        assert_eq!(
            describe_tools(&registry()),
            "1. add(a: integer, b: integer) - Add two integers\n2. now(no parameters) - Current time"
        );
    }

    #[test]
    fn test_render_fills_placeholders() {
        let template = PromptTemplate::new("T:{tools_description}|Q:{user_query}|H:{execution_history}");
        let history = ExecutionHistory::new("add 3 and 4");
        let prompt = template.render(&registry(), &history);
        assert!(prompt.contains("1. add(a: integer, b: integer)"));
        assert!(prompt.contains("Q:add 3 and 4"));
        assert!(prompt.contains("## User Query"));
        assert!(!prompt.contains("{execution_history}"));
    }

    #[test]
    fn test_builtin_template_has_all_placeholders() {
        let template = PromptTemplate::default();
        for placeholder in [
            "{tools_description}",
            "{execution_history}",
            "{user_query}",
            "{response_format}",
        ] {
            assert!(template.as_str().contains(placeholder), "{}", placeholder);
        }
    }

    #[test]
    fn test_redo_prompts_append_feedback() {
        let plan = plan_prompt("SYS", "weigh the flour");
        assert!(plan.ends_with("following query: weigh the flour"));
        assert!(plan_redo_prompt(&plan, "fewer steps").contains("Revision Request Feedback: fewer steps"));
        assert!(decision_redo_prompt("P", "use grams not kg").contains("Previous Feedback: use grams not kg"));
    }

    #[test]
    fn test_missing_template_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PromptTemplate::load(Some(&dir.path().join("none.txt"))),
            Err(AgentError::Config(_))
        ));
    }
}
