//! stdio MCP 工具提供方
//!
//! 启动服务进程，经 stdin/stdout 以换行分隔的 JSON-RPC 2.0 通信：
//! initialize + notifications/initialized 握手，tools/list 列出工具，tools/call 调用工具。
//! 单次运行内调用严格串行，请求与其响应在同一把锁内完成；非本请求的行（通知等）跳过。
//! shutdown 关闭 stdin 并有限等待退出，超时则 kill；进程句柄 kill_on_drop 兜底。

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::config::McpServerConfig;
use crate::core::AgentError;
use crate::tools::{Tool, ToolTransport};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

struct McpIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct McpStdioTransport {
    name: String,
    child: Mutex<Option<Child>>,
    io: Mutex<Option<McpIo>>,
    next_id: AtomicU64,
}

impl McpStdioTransport {
    /// 启动服务进程并完成握手
    pub async fn connect(config: &McpServerConfig) -> Result<Self, AgentError> {
        tracing::info!(
            server = %config.name,
            "Starting MCP server process: {} {:?}",
            config.command,
            config.args
        );
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            AgentError::Transport(format!("failed to spawn {}: {}", config.command, e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Transport("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Transport("failed to capture stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            let server = config.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server, "[stderr] {}", line);
                }
            });
        }

        let transport = Self {
            name: config.name.clone(),
            child: Mutex::new(Some(child)),
            io: Mutex::new(Some(McpIo {
                stdin,
                stdout: BufReader::new(stdout),
            })),
            next_id: AtomicU64::new(1),
        };
        if let Err(e) = transport.initialize().await {
            transport.shutdown().await;
            return Err(e);
        }
        Ok(transport)
    }

    async fn initialize(&self) -> Result<(), AgentError> {
        let result = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "pilot",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            )
            .await?;
        let server_info = result.get("serverInfo").cloned().unwrap_or(Value::Null);
        tracing::info!(
            server = %self.name,
            server_info = %server_info,
            "MCP session initialized"
        );
        self.notify("notifications/initialized").await
    }

    async fn write_message(io: &mut McpIo, message: &JsonRpcRequest<'_>) -> Result<(), AgentError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| AgentError::Transport(format!("failed to encode request: {}", e)))?;
        line.push('\n');
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::Transport(format!("failed to write: {}", e)))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| AgentError::Transport(format!("failed to flush: {}", e)))
    }

    async fn notify(&self, method: &str) -> Result<(), AgentError> {
        let mut guard = self.io.lock().await;
        let io = guard
            .as_mut()
            .ok_or_else(|| AgentError::Transport(format!("{} is shut down", self.name)))?;
        Self::write_message(
            io,
            &JsonRpcRequest {
                jsonrpc: "2.0",
                id: None,
                method,
                params: None,
            },
        )
        .await
    }

    /// 发送请求并读取同 id 的响应，返回 result
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, AgentError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.io.lock().await;
        let io = guard
            .as_mut()
            .ok_or_else(|| AgentError::Transport(format!("{} is shut down", self.name)))?;
        Self::write_message(
            io,
            &JsonRpcRequest {
                jsonrpc: "2.0",
                id: Some(id),
                method,
                params,
            },
        )
        .await?;

        loop {
            let mut line = String::new();
            let read = io
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| AgentError::Transport(format!("failed to read: {}", e)))?;
            if read == 0 {
                return Err(AgentError::Transport(format!(
                    "{} closed its stdout during {}",
                    self.name, method
                )));
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(_) => {
                    tracing::debug!(server = %self.name, "skipping non-JSON line: {}", line);
                    continue;
                }
            };
            if message.get("id").and_then(Value::as_u64) != Some(id) {
                tracing::debug!(server = %self.name, "skipping message: {}", line);
                continue;
            }
            if let Some(error) = message.get("error") {
                return Err(AgentError::Transport(format!(
                    "{} error {}: {}",
                    method,
                    error.get("code").cloned().unwrap_or(Value::Null),
                    error.get("message").and_then(Value::as_str).unwrap_or("unknown error")
                )));
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    /// 关闭会话：先关 stdin 让服务自行退出，超时再 kill
    pub async fn shutdown(&self) {
        self.io.lock().await.take();
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(server = %self.name, %status, "MCP server exited"),
            _ => {
                tracing::warn!(server = %self.name, "MCP server did not exit gracefully, killing");
                let _ = child.kill().await;
            }
        }
    }
}

#[async_trait]
impl ToolTransport for McpStdioTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, AgentError> {
        let result = self.request("tools/list", None).await?;
        let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(tools)
            .map_err(|e| AgentError::Transport(format!("invalid tools/list result: {}", e)))
    }

    async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        self.request(
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
        .map_err(|e| AgentError::ToolInvocationFailure {
            tool: name.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// 用 sh 模拟一个只会回答固定请求的 MCP 服务
    fn fake_server(script: &str) -> McpServerConfig {
        McpServerConfig {
            name: "fake".into(),
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: HashMap::new(),
            cwd: None,
        }
    }

    const HANDSHAKE: &str = r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"fake"}}}'; read line;"#;

    #[tokio::test]
    async fn test_list_and_call_over_stdio() {
        let script = format!(
            "{} {} {}",
            HANDSHAKE,
            r#"read line; echo '{"jsonrpc":"2.0","method":"notifications/progress"}'; echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"add","description":"Add","inputSchema":{"properties":{"a":{"type":"integer"},"b":{"type":"integer"}}}}]}}';"#,
            r#"read line; echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"7"}]}}';"#
        );
        let transport = McpStdioTransport::connect(&fake_server(&script)).await.unwrap();
        let tools = transport.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "add");

        let mut args = Map::new();
        args.insert("a".into(), json!(3));
        args.insert("b".into(), json!(4));
        let result = transport.call("add", args).await.unwrap();
        assert_eq!(result["content"][0]["text"], "7");
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_handshake_without_server_info() {
        let script = r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{}}'; read line; read line;"#;
        let transport = McpStdioTransport::connect(&fake_server(script)).await.unwrap();
        assert_eq!(transport.name(), "fake");
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_stdout_is_invocation_failure() {
        let transport = McpStdioTransport::connect(&fake_server(HANDSHAKE)).await.unwrap();
        let err = transport.call("add", Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolInvocationFailure { .. }));
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_is_transport_error() {
        let mut config = fake_server("");
        config.command = "/nonexistent/mcp-server".into();
        assert!(matches!(
            McpStdioTransport::connect(&config).await,
            Err(AgentError::Transport(_))
        ));
    }
}
