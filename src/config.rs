//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PILOT__*` 覆盖（双下划线表示嵌套，如 `PILOT__LLM__PROVIDER=openai`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub prompts: PromptsSection,
    pub mcp: McpSection,
}

/// [app] 段：应用名、迭代上限、决策轨迹、默认任务
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 是否把模型原文、确认、反馈与错误写入账本
    #[serde(default = "default_track_decision_trace")]
    pub track_decision_trace: bool,
    /// 命令行未给出任务时使用
    pub default_query: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_iterations: default_max_iterations(),
            track_decision_trace: default_track_decision_trace(),
            default_query: None,
        }
    }
}

fn default_max_iterations() -> usize {
    10
}

fn default_track_decision_trace() -> bool {
    true
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；实际选择还取决于可用的 API Key
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

/// [llm.timeouts] 段：单次模型请求的等待上限（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [prompts] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    /// 系统 prompt 模板；未设置时依次尝试 config/prompts/system.txt 与内置模板
    pub system_path: Option<PathBuf>,
}

/// [mcp] 段：stdio 工具提供方列表
#[derive(Debug, Clone, Deserialize, Default)]
pub struct McpSection {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

/// [[mcp.servers]]：一个 stdio MCP 服务进程
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 PILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件必须存在）
/// 3. 最后叠加环境变量 PILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PILOT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_iterations, 10);
        assert!(cfg.app.track_decision_trace);
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert!(cfg.mcp.servers.is_empty());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
max_iterations = 3
track_decision_trace = false
default_query = "add 3 and 4"

[llm]
provider = "openai"

[llm.timeouts]
request = 5

[[mcp.servers]]
name = "math"
command = "python"
args = ["math_server.py"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.max_iterations, 3);
        assert!(!cfg.app.track_decision_trace);
        assert_eq!(cfg.app.default_query.as_deref(), Some("add 3 and 4"));
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.timeouts.request, 5);
        assert_eq!(cfg.mcp.servers.len(), 1);
        assert_eq!(cfg.mcp.servers[0].args, vec!["math_server.py".to_string()]);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(dir.path().join("nope.toml"))).is_err());
    }
}
