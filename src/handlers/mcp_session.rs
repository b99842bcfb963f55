//! Persistent stdio session with a child MCP server.
//!
//! The child is spawned lazily on the first call, handshaken once
//! (`initialize` + `notifications/initialized`) and then reused, so state
//! kept by the server (an open browser page, a warmed cache) survives
//! between tool calls. Any I/O failure or timeout tears the session down;
//! the next call starts a fresh child.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::HandlerError;

/// Protocol revision announced during the handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// A lazily started MCP server process.
pub struct McpSession {
    /// Label used in logs and error messages (e.g. "Playwright MCP").
    label: String,
    command: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    next_id: AtomicU64,
    io: Mutex<Option<SessionIo>>,
}

struct SessionIo {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl McpSession {
    pub fn new(label: &str, command: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            label: label.to_string(),
            command,
            args,
            timeout,
            next_id: AtomicU64::new(1),
            io: Mutex::new(None),
        }
    }

    /// Whether a child process is currently attached.
    pub async fn is_running(&self) -> bool {
        self.io.lock().await.is_some()
    }

    /// Invoke `tools/call` and return the JSON-RPC `result`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, HandlerError> {
        let mut guard = self.io.lock().await;

        if guard.is_none() {
            *guard = Some(self.start().await?);
        }

        let params = json!({"name": name, "arguments": arguments});
        let outcome = match guard.as_mut() {
            Some(io) => self.exchange(io, "tools/call", params).await,
            None => Err(HandlerError::Process(format!("{} session unavailable", self.label))),
        };

        // Protocol-level errors leave the stream in sync; anything else does not.
        if let Err(ref e) = outcome {
            if !matches!(e, HandlerError::Protocol(_)) {
                if let Some(mut io) = guard.take() {
                    log::warn!("{} session reset after error: {}", self.label, e);
                    let _ = io.child.start_kill();
                }
            }
        }
        outcome
    }

    /// Terminate the child, if any.
    pub async fn close(&self) {
        if let Some(mut io) = self.io.lock().await.take() {
            log::info!("Terminating {} process", self.label);
            drop(io.stdin);
            if tokio::time::timeout(Duration::from_secs(5), io.child.wait())
                .await
                .is_err()
            {
                log::warn!("{} process did not exit, killing", self.label);
                let _ = io.child.kill().await;
            }
        }
    }

    async fn start(&self) -> Result<SessionIo, HandlerError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HandlerError::Process(format!(
                    "Failed to start {} process '{}': {}",
                    self.label,
                    self.command.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HandlerError::Process(format!("{} stdin not captured", self.label)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HandlerError::Process(format!("{} stdout not captured", self.label)))?;

        let mut io = SessionIo {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let init = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "unified-mcp", "version": crate::VERSION},
        });
        self.exchange(&mut io, "initialize", init).await?;
        write_line(
            &mut io.stdin,
            &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await?;

        log::info!(
            "{} session started: {} {}",
            self.label,
            self.command.display(),
            self.args.join(" ")
        );
        Ok(io)
    }

    async fn exchange(
        &self,
        io: &mut SessionIo,
        method: &str,
        params: Value,
    ) -> Result<Value, HandlerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        log::debug!("{} -> {}", self.label, request);

        let round_trip = async {
            write_line(&mut io.stdin, &request).await?;
            loop {
                let line = io.stdout.next_line().await?.ok_or_else(|| {
                    HandlerError::Process(format!("{} closed its output", self.label))
                })?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let message: Value = match serde_json::from_str(line) {
                    Ok(v) => v,
                    Err(_) => {
                        log::debug!("{} non-JSON output skipped: {}", self.label, line);
                        continue;
                    }
                };
                if message.get("id").and_then(|v| v.as_u64()) != Some(id) {
                    continue;
                }
                if let Some(error) = message.get("error") {
                    return Err(HandlerError::Protocol(format!("{} error: {}", self.label, error)));
                }
                return Ok(message.get("result").cloned().unwrap_or_else(|| json!({})));
            }
        };

        tokio::time::timeout(self.timeout, round_trip)
            .await
            .map_err(|_| HandlerError::Timeout(self.timeout.as_millis() as u64))?
    }
}

async fn write_line(stdin: &mut ChildStdin, message: &Value) -> Result<(), HandlerError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    stdin.write_all(&bytes).await?;
    stdin.flush().await?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const FAKE_SERVER: &str = r#"
read init
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{}}}'
read initialized
read call
echo 'starting up'
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
echo '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"ok"}]}}'
read bad
echo '{"jsonrpc":"2.0","id":3,"error":{"code":-32602,"message":"bad params"}}'
cat > /dev/null
"#;

    fn fake_session(script: &str, timeout: Duration) -> McpSession {
        McpSession::new(
            "Fake MCP",
            PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), script.to_string()],
            timeout,
        )
    }

    #[tokio::test]
    async fn test_call_tool_skips_noise_and_matches_id() {
        let session = fake_session(FAKE_SERVER, Duration::from_secs(5));
        assert!(!session.is_running().await);

        let result = session.call_tool("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(result["content"][0]["text"], "ok");
        assert!(session.is_running().await);

        let err = session.call_tool("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::Protocol(ref m) if m.contains("bad params")));
        // Protocol errors keep the session alive.
        assert!(session.is_running().await);

        session.close().await;
        assert!(!session.is_running().await);
    }

    #[tokio::test]
    async fn test_silent_server_times_out_and_resets() {
        let session = fake_session("cat > /dev/null", Duration::from_millis(100));
        let err = session.call_tool("echo", json!({})).await.unwrap_err();
        assert_eq!(err, HandlerError::Timeout(100));
        assert!(!session.is_running().await);
    }

    #[tokio::test]
    async fn test_missing_binary_is_process_error() {
        let session = McpSession::new(
            "Fake MCP",
            PathBuf::from("/nonexistent/mcp-server"),
            vec![],
            Duration::from_secs(1),
        );
        let err = session.call_tool("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::Process(_)));
    }
}
