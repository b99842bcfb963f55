//! Code understanding through the `codanna` CLI.
//!
//! | tool                   | codanna subcommand                     |
//! |------------------------|----------------------------------------|
//! | `search_code`          | `semantic_search_with_context`         |
//! | `get_call_graph`       | `get_calls` + `find_callers`           |
//! | `find_symbol`          | `find_symbol`                          |
//! | `find_implementations` | `search_symbols`                       |
//!
//! ## Options
//!
//! ```yaml
//! options:
//!   auto_index: true             # build .codanna/index when missing
//!   index_dirs: [src, lib, "."]  # directories handed to `codanna index`
//!   timeout_secs: 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::args::{f64_or, optional_str, required_str, scalar_text, u64_or, validate_tool_arguments};
use super::factory::{CapabilityType, HandlerFactory};
use super::process::{find_executable, run_command, DEFAULT_COMMAND_TIMEOUT};
use super::{success, CapabilityHandler, HandlerConfig, HandlerError};
use crate::discovery::ToolSchema;

const INSTALL_HINT: &str = "Install with: cargo install codanna --all-features";

/// Handler for Codanna code understanding tools.
pub struct CodannaHandler {
    codanna_path: Option<PathBuf>,
    project_root: PathBuf,
    auto_index: bool,
    index_dirs: Vec<String>,
    timeout: Duration,
}

impl CodannaHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        let project_root = config
            .option_str("project_root")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            codanna_path: None,
            project_root,
            auto_index: config.option_bool("auto_index").unwrap_or(true),
            index_dirs: config
                .option_str_list("index_dirs")
                .unwrap_or_else(|| vec!["src".into(), "lib".into(), ".".into()]),
            timeout: config
                .option_u64("timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
        }
    }

    fn binary(&self) -> Result<&Path, HandlerError> {
        self.codanna_path
            .as_deref()
            .ok_or_else(|| HandlerError::DependencyMissing(format!("codanna ({})", INSTALL_HINT)))
    }

    /// Directories from `index_dirs` that exist under the project root.
    fn existing_index_dirs(&self) -> Vec<String> {
        self.index_dirs
            .iter()
            .filter(|d| self.project_root.join(d).is_dir())
            .cloned()
            .collect()
    }

    async fn build_index(&self, binary: &Path) {
        log::info!("Running: codanna init");
        match run_command(binary, &["init".to_string()], &self.project_root, self.timeout).await {
            Ok(out) if !out.success => {
                log::error!("codanna init failed: {}", out.stderr);
                return;
            }
            Err(e) => {
                log::error!("codanna init failed: {}", e);
                return;
            }
            Ok(_) => {}
        }

        let dirs = self.existing_index_dirs();
        if dirs.is_empty() {
            log::warn!("No source directories found to index");
            return;
        }

        log::info!("Indexing directories: {}", dirs.join(", "));
        for dir in dirs {
            let args = vec!["index".to_string(), dir.clone()];
            match run_command(binary, &args, &self.project_root, self.timeout).await {
                Ok(out) if out.success => log::info!("Indexed {}", dir),
                Ok(out) => log::warn!("Failed to index {}: {}", dir, out.stderr),
                Err(e) => log::warn!("Failed to index {}: {}", dir, e),
            }
        }
    }

    /// `codanna mcp <subcommand> <args...> --json`, returning the `data` field.
    async fn run_mcp(&self, subcommand: &str, params: Vec<String>) -> Result<Value, HandlerError> {
        let binary = self.binary()?;
        let mut args = vec!["mcp".to_string(), subcommand.to_string()];
        args.extend(params);
        args.push("--json".to_string());

        let out = run_command(binary, &args, &self.project_root, self.timeout).await?;
        if !out.success {
            log::error!("Codanna command failed: {}", out.stderr);
            return Err(HandlerError::ExecutionFailed(format!("Codanna error: {}", out.stderr)));
        }

        let parsed: Value = serde_json::from_str(&out.stdout).map_err(|e| {
            let preview: String = out.stdout.chars().take(200).collect();
            log::error!("Invalid JSON from Codanna: {}", preview);
            HandlerError::Protocol(format!("Invalid JSON from Codanna: {}", e))
        })?;
        Ok(parsed.get("data").cloned().unwrap_or_else(|| json!([])))
    }

    async fn search_code(&self, args: &Value) -> Result<Value, HandlerError> {
        let query = required_str(args, "query")?;
        let mut params = vec![
            format!("query:{}", query),
            format!("limit:{}", u64_or(args, "limit", 5)),
            format!("threshold:{}", f64_or(args, "threshold", 0.7)),
        ];
        if let Some(lang) = optional_str(args, "lang") {
            params.push(format!("lang:{}", lang));
        }
        let results = self.run_mcp("semantic_search_with_context", params).await?;
        Ok(success("search_code", json!({"query": query, "results": results})))
    }

    async fn get_call_graph(&self, args: &Value) -> Result<Value, HandlerError> {
        let function_name = optional_str(args, "function_name");
        let symbol_id = args.get("symbol_id").and_then(scalar_text);
        let identifier = match (&symbol_id, function_name) {
            (Some(id), _) => format!("symbol_id:{}", id),
            (None, Some(name)) => name.to_string(),
            (None, None) => {
                return Err(HandlerError::InvalidArguments(
                    "Either function_name or symbol_id required".to_string(),
                ))
            }
        };

        let outgoing = self.run_mcp("get_calls", vec![identifier.clone()]).await?;
        let incoming = self.run_mcp("find_callers", vec![identifier.clone()]).await?;
        let function = function_name.map(String::from).unwrap_or(identifier);
        Ok(success(
            "get_call_graph",
            json!({"function": function, "outgoing_calls": outgoing, "incoming_calls": incoming}),
        ))
    }

    async fn find_symbol(&self, args: &Value) -> Result<Value, HandlerError> {
        let name = required_str(args, "name")?;
        let results = self.run_mcp("find_symbol", vec![name.to_string()]).await?;
        Ok(success("find_symbol", json!({"name": name, "results": results})))
    }

    async fn find_implementations(&self, args: &Value) -> Result<Value, HandlerError> {
        let query = required_str(args, "query")?;
        let kind = optional_str(args, "kind");
        let mut params = vec![
            format!("query:{}", query),
            format!("limit:{}", u64_or(args, "limit", 10)),
        ];
        if let Some(kind) = kind {
            params.push(format!("kind:{}", kind));
        }
        if let Some(module) = optional_str(args, "module") {
            params.push(format!("module:{}", module));
        }
        let results = self.run_mcp("search_symbols", params).await?;
        Ok(success(
            "find_implementations",
            json!({"query": query, "kind": kind, "results": results}),
        ))
    }
}

#[async_trait]
impl CapabilityHandler for CodannaHandler {
    async fn initialize(&mut self) -> Result<(), HandlerError> {
        let binary = find_executable("codanna").ok_or_else(|| {
            HandlerError::DependencyMissing(format!("Codanna not found. {}", INSTALL_HINT))
        })?;
        log::info!("Codanna found at: {}", binary.display());

        let index_path = self.project_root.join(".codanna").join("index");
        if index_path.exists() {
            log::info!("Codanna index found at {}", index_path.display());
        } else if self.auto_index {
            log::info!("Codanna index not found at {}. Auto-indexing...", index_path.display());
            self.build_index(&binary).await;
        } else {
            log::warn!(
                "Codanna index not found at {}. Run 'codanna init && codanna index src' or enable auto_index",
                index_path.display()
            );
        }

        self.codanna_path = Some(binary);
        Ok(())
    }

    async fn get_tool_schema(&self, tool_name: &str) -> Result<ToolSchema, HandlerError> {
        schema(tool_name)
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, HandlerError> {
        validate_tool_arguments(&schema(tool_name)?, arguments)?;
        match tool_name {
            "search_code" => self.search_code(arguments).await,
            "get_call_graph" => self.get_call_graph(arguments).await,
            "find_symbol" => self.find_symbol(arguments).await,
            "find_implementations" => self.find_implementations(arguments).await,
            other => Err(HandlerError::UnknownTool(other.to_string())),
        }
    }
}

fn schema(tool_name: &str) -> Result<ToolSchema, HandlerError> {
    let schema = match tool_name {
        "search_code" => ToolSchema::new(
            "search_code",
            "Search codebase using natural language queries. Returns semantically similar symbols \
             with full context including what calls them, what they call, and impact analysis.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural language search query (e.g., 'authentication logic', 'error handling')"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results (default: 5)",
                        "default": 5
                    },
                    "threshold": {
                        "type": "number",
                        "description": "Minimum similarity score 0-1 (default: 0.7)",
                        "default": 0.7
                    },
                    "lang": {
                        "type": "string",
                        "description": "Filter by language (e.g., 'rust', 'typescript', 'python')"
                    }
                },
                "required": ["query"]
            }),
        ),
        "get_call_graph" => ToolSchema::new(
            "get_call_graph",
            "Get complete call graph for a function. Shows both what the function calls \
             (outgoing) and what calls the function (incoming).",
            json!({
                "type": "object",
                "properties": {
                    "function_name": {
                        "type": "string",
                        "description": "Function name to analyze"
                    },
                    "symbol_id": {
                        "type": "integer",
                        "description": "Symbol ID for unambiguous lookup (preferred over name)"
                    }
                },
                "oneOf": [
                    {"required": ["function_name"]},
                    {"required": ["symbol_id"]}
                ]
            }),
        ),
        "find_symbol" => ToolSchema::new(
            "find_symbol",
            "Find a symbol by exact name. Returns symbol information including file path, \
             line number, kind, and signature. Sub-10ms lookup.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Exact symbol name to find"}
                },
                "required": ["name"]
            }),
        ),
        "find_implementations" => ToolSchema::new(
            "find_implementations",
            "Find implementations, classes, structs, or specific symbol kinds. \
             Uses fuzzy matching for flexible search.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query (supports fuzzy matching)"
                    },
                    "kind": {
                        "type": "string",
                        "description": "Filter by kind: Function, Struct, Class, Interface, Trait, etc."
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results (default: 10)",
                        "default": 10
                    },
                    "module": {"type": "string", "description": "Filter by module path"}
                },
                "required": ["query"]
            }),
        ),
        other => return Err(HandlerError::UnknownTool(other.to_string())),
    };
    Ok(schema)
}

/// Factory for [`CodannaHandler`].
pub struct CodannaHandlerFactory;

impl HandlerFactory for CodannaHandlerFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Box<dyn CapabilityHandler>, HandlerError> {
        Ok(Box::new(CodannaHandler::new(config)))
    }

    fn capability_type(&self) -> CapabilityType {
        CapabilityType::CodeSearch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(options: Value) -> HandlerConfig {
        let mut config = HandlerConfig {
            name: "code_understanding".into(),
            kind: "codanna".into(),
            ..Default::default()
        };
        if let Value::Object(map) = options {
            config.options = map.into_iter().collect();
        }
        config
    }

    #[tokio::test]
    async fn test_schemas_for_every_tool() {
        let handler = CodannaHandler::new(&config_with(json!({})));
        for tool in ["search_code", "get_call_graph", "find_symbol", "find_implementations"] {
            let schema = handler.get_tool_schema(tool).await.unwrap();
            assert_eq!(schema.name, tool);
            assert_eq!(schema.input_schema["type"], "object");
        }
        let search = handler.get_tool_schema("search_code").await.unwrap();
        assert_eq!(search.required_parameters(), vec!["query"]);
        assert!(matches!(
            handler.get_tool_schema("nope").await,
            Err(HandlerError::UnknownTool(_))
        ));
    }

    #[test]
    fn test_options_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let handler = CodannaHandler::new(&config_with(json!({
            "project_root": dir.path().to_str().unwrap(),
            "auto_index": false,
            "index_dirs": ["src", "lib"],
            "timeout_secs": 7
        })));
        assert!(!handler.auto_index);
        assert_eq!(handler.timeout, Duration::from_secs(7));
        assert_eq!(handler.existing_index_dirs(), vec!["src".to_string()]);

        let defaults = CodannaHandler::new(&config_with(json!({})));
        assert!(defaults.auto_index);
        assert_eq!(defaults.index_dirs, vec!["src", "lib", "."]);
    }

    #[tokio::test]
    async fn test_execute_validates_before_running() {
        let handler = CodannaHandler::new(&config_with(json!({})));
        let err = handler.execute("search_code", &json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArguments(_)));

        let err = handler.execute("get_call_graph", &json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArguments(ref m) if m.contains("symbol_id")));

        // Not initialized: the binary has not been located yet.
        let err = handler.execute("find_symbol", &json!({"name": "main"})).await.unwrap_err();
        assert!(matches!(err, HandlerError::DependencyMissing(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_mcp_parses_data_field() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("codanna");
        std::fs::write(
            &fake,
            "#!/bin/sh\necho '{\"status\":\"ok\",\"data\":[{\"name\":\"main\",\"file\":\"src/main.rs\"}]}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut handler = CodannaHandler::new(&config_with(json!({
            "project_root": dir.path().to_str().unwrap()
        })));
        handler.codanna_path = Some(fake);

        let out = handler.execute("find_symbol", &json!({"name": "main"})).await.unwrap();
        assert_eq!(out["status"], "success");
        assert_eq!(out["tool"], "find_symbol");
        assert_eq!(out["results"][0]["file"], "src/main.rs");

        let graph = handler
            .execute("get_call_graph", &json!({"symbol_id": 42}))
            .await
            .unwrap();
        assert_eq!(graph["function"], "symbol_id:42");
        assert!(graph["incoming_calls"].is_array());
    }
}
