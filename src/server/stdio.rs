//! Line-delimited JSON-RPC loop.
//!
//! One JSON object per input line. Each request runs on its own task; a
//! single writer task owns the output stream, so responses never interleave
//! mid-line. Notifications get no response.

use std::io;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::protocol::{parse_message, CallToolResult, RpcError, RpcErrorCode, RpcRequest, RpcResponse};
use super::tools::{tool_definitions, GatewayTools};
use super::SERVER_NAME;
use crate::capabilities::Registry;
use crate::handlers::mcp_session::MCP_PROTOCOL_VERSION;

/// The outward MCP server.
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<Registry>,
    tools: GatewayTools,
}

impl McpServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        let tools = GatewayTools::new(Arc::clone(&registry));
        Self { registry, tools }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handle one parsed message. `None` for notifications.
    pub async fn handle_request(&self, request: RpcRequest) -> Option<RpcResponse> {
        let outcome = self.dispatch(&request.method, &request.params).await;
        let id = request.id?;
        Some(match outcome {
            Ok(result) => RpcResponse::success(id, result),
            Err(error) => RpcResponse::failure(id, error),
        })
    }

    async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": SERVER_NAME, "version": crate::VERSION},
            })),
            "ping" => Ok(json!({})),
            "tools/list" => {
                log::info!("list_tools called");
                Ok(json!({"tools": tool_definitions()}))
            }
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| RpcError::new(RpcErrorCode::InvalidParams, "tools/call requires 'name'"))?;
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                let output = self.tools.call(name, &arguments).await;
                serde_json::to_value(CallToolResult::text(output.text, output.is_error))
                    .map_err(|e| RpcError::new(RpcErrorCode::InternalError, e.to_string()))
            }
            m if m.starts_with("notifications/") => Ok(Value::Null),
            other => Err(RpcError::new(
                RpcErrorCode::MethodNotFound,
                format!("Method not found: {}", other),
            )),
        }
    }

    /// Serve until `reader` reaches EOF, then wait for in-flight requests and
    /// flush their responses.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let writer_task = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), io::Error>(())
        });

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_message(line) {
                Ok(request) => self.spawn_request(request, tx.clone()),
                Err(response) => {
                    log::warn!("Rejected input line: {:?}", response.error);
                    send(&tx, &response);
                }
            }
        }

        log::info!("Input closed; waiting for in-flight requests");
        drop(tx);
        match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }

    fn spawn_request(&self, request: RpcRequest, tx: mpsc::UnboundedSender<String>) {
        let server = self.clone();
        tokio::spawn(async move {
            let id = request.id.clone();
            let method = request.method.clone();
            let handled = tokio::spawn(async move { server.handle_request(request).await }).await;
            let response = match handled {
                Ok(response) => response,
                Err(e) => {
                    log::error!("Request '{}' aborted: {}", method, e);
                    id.map(|id| RpcResponse::failure(id, RpcError::from_code(RpcErrorCode::InternalError)))
                }
            };
            if let Some(response) = response {
                send(&tx, &response);
            }
        });
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &RpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).is_err() {
                log::warn!("Output closed; dropping response");
            }
        }
        Err(e) => log::error!("Failed to encode response: {}", e),
    }
}

/// Serve on process stdin/stdout until EOF or Ctrl-C.
pub async fn run_stdio(server: &McpServer) -> io::Result<()> {
    tokio::select! {
        result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Server shutdown requested");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{write_catalog, MockFactory};
    use std::collections::HashMap;
    use tokio::io::{duplex, AsyncReadExt};

    const CATALOG: &str = r#"
capabilities:
  code_understanding:
    enabled: true
    type: codanna
    source: capabilities/codanna
    tools: [search_code, find_symbol]
    description: Semantic code search
"#;

    async fn exchange(input: &str) -> Vec<Value> {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(dir.path(), CATALOG);
        let (factories, _) = MockFactory::table();
        let registry = Arc::new(Registry::with_factories(path, factories).unwrap());
        let server = McpServer::new(registry);

        let (mut client_in, server_in) = duplex(64 * 1024);
        let (server_out, mut client_out) = duplex(64 * 1024);

        client_in.write_all(input.as_bytes()).await.unwrap();
        drop(client_in);
        server.serve(server_in, server_out).await.unwrap();

        let mut output = String::new();
        client_out.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn by_id(responses: &[Value]) -> HashMap<String, Value> {
        responses
            .iter()
            .map(|r| (r["id"].to_string(), r.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_and_notification() {
        let responses = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 2);
        let responses = by_id(&responses);
        let init = &responses["1"]["result"];
        assert_eq!(init["serverInfo"]["name"], "unified-dynamic-mcp");
        assert_eq!(init["serverInfo"]["version"], "1.0.0");
        assert_eq!(init["capabilities"], json!({"tools": {}}));
        assert_eq!(responses["2"]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_tools_list_and_call() {
        let responses = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"execute_tool","arguments":{"tool_name":"search_code","arguments":{"query":"auth"}}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"execute_tool","arguments":{"tool_name":"ghost","arguments":{}}}}"#,
            "\n",
        ))
        .await;

        let responses = by_id(&responses);
        assert_eq!(responses["1"]["result"]["tools"].as_array().unwrap().len(), 7);

        let ok = &responses["2"]["result"];
        assert_eq!(ok["isError"], false);
        assert_eq!(ok["content"][0]["type"], "text");
        assert!(ok["content"][0]["text"].as_str().unwrap().contains("\"query\": \"auth\""));

        let failed = &responses["3"]["result"];
        assert_eq!(failed["isError"], true);
        assert!(failed["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error executing 'ghost'"));
    }

    #[tokio::test]
    async fn test_protocol_errors_keep_serving() {
        let responses = exchange(concat!(
            "this is not json\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"b","method":"tools/call","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"c","method":"ping"}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 4);
        let parse_error = responses
            .iter()
            .find(|r| r["id"].is_null())
            .unwrap();
        assert_eq!(parse_error["error"]["code"], -32700);

        let responses = by_id(&responses);
        assert_eq!(responses["\"a\""]["error"]["code"], -32601);
        assert_eq!(responses["\"b\""]["error"]["code"], -32602);
        assert_eq!(responses["\"c\""]["result"], json!({}));
    }
}
