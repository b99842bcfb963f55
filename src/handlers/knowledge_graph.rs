//! Knowledge-graph memory backed by an embedded SQLite episode store.
//!
//! Episodes live in `<source>/data/graphiti.db`. Insights and episodes are
//! written as rows; `search_insights` matches name and content;
//! `query_graph` runs caller-supplied read-only queries with named
//! parameters.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection};
use serde_json::{json, Map, Value};

use super::args::{required_str, u64_or, validate_tool_arguments};
use super::factory::{CapabilityType, HandlerFactory};
use super::{success, CapabilityHandler, HandlerConfig, HandlerError};
use crate::discovery::ToolSchema;

static READ_ONLY_QUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*(select|with)\b").expect("valid regex"));

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS episodes (
        uuid               TEXT PRIMARY KEY,
        name               TEXT NOT NULL,
        content            TEXT NOT NULL,
        source             TEXT NOT NULL,
        source_description TEXT NOT NULL,
        created_at         TEXT NOT NULL,
        valid_at           TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_episodes_created ON episodes(created_at);
";

type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// Handler for knowledge-graph tools.
pub struct GraphitiHandler {
    db_path: PathBuf,
    conn: SharedConnection,
}

impl GraphitiHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        let source = if config.source.as_os_str().is_empty() {
            PathBuf::from("capabilities/graphiti_ladybug")
        } else {
            config.source.clone()
        };
        Self {
            db_path: source.join("data").join("graphiti.db"),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Run `op` against the open connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, HandlerError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, HandlerError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            let conn = guard
                .as_ref()
                .ok_or_else(|| HandlerError::Storage("episode store is closed".to_string()))?;
            op(conn)
        })
        .await
        .map_err(|e| HandlerError::Storage(format!("storage task failed: {}", e)))?
    }

    async fn insert_episode(
        &self,
        name: String,
        content: String,
        source_description: String,
    ) -> Result<String, HandlerError> {
        self.with_conn(move |conn| {
            let uuid = uuid::Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO episodes (uuid, name, content, source, source_description, created_at, valid_at)
                 VALUES (?1, ?2, ?3, 'message', ?4, ?5, ?5)",
                params![uuid, name, content, source_description, now],
            )?;
            Ok(uuid)
        })
        .await
    }

    async fn store_insight(&self, args: &Value) -> Result<Value, HandlerError> {
        let content = required_str(args, "content")?.to_string();
        let source = args
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("user input")
            .to_string();
        let head: String = content.chars().take(50).collect();
        let name = format!("Insight: {}...", head);

        self.insert_episode(name, content.clone(), source)
            .await
            .map_err(|e| graph_error("Error storing insight", e))?;
        Ok(success(
            "store_insight",
            json!({"message": "Insight stored successfully", "content": content}),
        ))
    }

    async fn add_episode(&self, args: &Value) -> Result<Value, HandlerError> {
        let name = required_str(args, "name")?.to_string();
        let content = required_str(args, "content")?.to_string();
        let source_description = args
            .get("source_description")
            .and_then(|v| v.as_str())
            .unwrap_or("user conversation")
            .to_string();

        let uuid = self
            .insert_episode(name.clone(), content, source_description)
            .await
            .map_err(|e| graph_error("Error adding episode", e))?;
        Ok(success(
            "add_episode",
            json!({"episode_uuid": uuid, "name": name, "message": "Episode added successfully"}),
        ))
    }

    async fn search_insights(&self, args: &Value) -> Result<Value, HandlerError> {
        let query = required_str(args, "query")?.to_string();
        let limit = i64::try_from(u64_or(args, "limit", 10)).unwrap_or(i64::MAX);

        let needle = query.clone();
        let episodes = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT uuid, name, content, valid_at FROM episodes
                     WHERE instr(lower(name), lower(?1)) > 0 OR instr(lower(content), lower(?1)) > 0
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![needle, limit], |row| {
                    Ok(json!({
                        "uuid": row.get::<_, String>(0)?,
                        "name": row.get::<_, String>(1)?,
                        "content": row.get::<_, String>(2)?,
                        "valid_at": row.get::<_, String>(3)?,
                    }))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(|e| graph_error("Error searching insights", e))?;

        let count = episodes.len();
        Ok(success(
            "search_insights",
            json!({
                "query": query,
                "results": {"nodes": [], "edges": [], "episodes": episodes},
                "count": {"nodes": 0, "edges": 0, "episodes": count},
            }),
        ))
    }

    async fn query_graph(&self, args: &Value) -> Result<Value, HandlerError> {
        let query = required_str(args, "cypher_query")?.to_string();
        if !READ_ONLY_QUERY.is_match(&query) {
            return Err(HandlerError::InvalidArguments(
                "only read-only SELECT/WITH queries are accepted".to_string(),
            ));
        }
        let bindings = args
            .get("params")
            .and_then(|p| p.as_object())
            .cloned()
            .unwrap_or_default();

        let sql = query.clone();
        let records = self
            .with_conn(move |conn| run_read_only(conn, &sql, &bindings))
            .await
            .map_err(|e| graph_error("Query error", e))?;

        let count = records.len();
        Ok(success(
            "query_graph",
            json!({"query": query, "results": records, "count": count}),
        ))
    }
}

fn graph_error(context: &str, e: HandlerError) -> HandlerError {
    log::error!("{}: {}", context, e);
    match e {
        HandlerError::Storage(msg) => HandlerError::Storage(format!("{}: {}", context, msg)),
        other => other,
    }
}

fn run_read_only(
    conn: &Connection,
    sql: &str,
    bindings: &Map<String, Value>,
) -> Result<Vec<Value>, HandlerError> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(HandlerError::InvalidArguments(
            "query would modify the store".to_string(),
        ));
    }

    for (name, value) in bindings {
        let key = if name.starts_with([':', '@', '$']) {
            name.clone()
        } else {
            format!(":{}", name)
        };
        match stmt.parameter_index(&key)? {
            Some(idx) => stmt.raw_bind_parameter(idx, json_to_sql(value))?,
            None => log::debug!("query_graph: unused parameter '{}'", name),
        }
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Map::new();
        for (i, column) in columns.iter().enumerate() {
            record.insert(column.clone(), sql_to_json(row.get_ref(i)?));
        }
        records.push(Value::Object(record));
    }
    Ok(records)
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => json!(format!("<{} bytes>", b.len())),
    }
}

#[async_trait]
impl CapabilityHandler for GraphitiHandler {
    async fn initialize(&mut self) -> Result<(), HandlerError> {
        log::info!("Initializing knowledge graph store at: {}", self.db_path.display());

        let path = self.db_path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, HandlerError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| HandlerError::Storage(format!("storage task failed: {}", e)))??;

        *self.conn.lock() = Some(conn);
        log::info!("Knowledge graph store initialized");
        Ok(())
    }

    async fn get_tool_schema(&self, tool_name: &str) -> Result<ToolSchema, HandlerError> {
        schema(tool_name)
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, HandlerError> {
        validate_tool_arguments(&schema(tool_name)?, arguments)?;
        match tool_name {
            "store_insight" => self.store_insight(arguments).await,
            "search_insights" => self.search_insights(arguments).await,
            "query_graph" => self.query_graph(arguments).await,
            "add_episode" => self.add_episode(arguments).await,
            other => Err(HandlerError::UnknownTool(other.to_string())),
        }
    }

    async fn cleanup(&self) -> Result<(), HandlerError> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| HandlerError::from(e))?;
            log::info!("Knowledge graph store closed");
        }
        Ok(())
    }
}

fn schema(tool_name: &str) -> Result<ToolSchema, HandlerError> {
    let schema = match tool_name {
        "store_insight" => ToolSchema::new(
            "store_insight",
            "Store a new insight or knowledge in the knowledge graph.",
            json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "The insight or knowledge to store"},
                    "source": {
                        "type": "string",
                        "description": "Source description (e.g., 'user conversation', 'documentation')",
                        "default": "user input"
                    }
                },
                "required": ["content"]
            }),
        ),
        "search_insights" => ToolSchema::new(
            "search_insights",
            "Search the knowledge graph. Returns matching episodes, most recent first.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query (natural language)"},
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results (default: 10)",
                        "default": 10
                    }
                },
                "required": ["query"]
            }),
        ),
        "query_graph" => ToolSchema::new(
            "query_graph",
            "Execute a custom read-only query on the knowledge graph store. \
             Named parameters are bound from `params`.",
            json!({
                "type": "object",
                "properties": {
                    "cypher_query": {"type": "string", "description": "Read-only query to execute"},
                    "params": {"type": "object", "description": "Query parameters", "default": {}}
                },
                "required": ["cypher_query"]
            }),
        ),
        "add_episode" => ToolSchema::new(
            "add_episode",
            "Add a conversational episode to the knowledge graph.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Episode name/title"},
                    "content": {"type": "string", "description": "Episode content (conversation, event, etc.)"},
                    "source_description": {
                        "type": "string",
                        "description": "Description of the source",
                        "default": "user conversation"
                    }
                },
                "required": ["name", "content"]
            }),
        ),
        other => return Err(HandlerError::UnknownTool(other.to_string())),
    };
    Ok(schema)
}

/// Factory for [`GraphitiHandler`].
pub struct GraphitiHandlerFactory;

impl HandlerFactory for GraphitiHandlerFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Box<dyn CapabilityHandler>, HandlerError> {
        Ok(Box::new(GraphitiHandler::new(config)))
    }

    fn capability_type(&self) -> CapabilityType {
        CapabilityType::KnowledgeGraph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, GraphitiHandler) {
        let dir = tempfile::tempdir().unwrap();
        let config = HandlerConfig {
            source: dir.path().join("graphiti"),
            ..Default::default()
        };
        let mut handler = GraphitiHandler::new(&config);
        handler.initialize().await.unwrap();
        (dir, handler)
    }

    #[tokio::test]
    async fn test_initialize_creates_database() {
        let (dir, handler) = open_store().await;
        assert!(handler.db_path().starts_with(dir.path()));
        assert!(handler.db_path().exists());
    }

    #[tokio::test]
    async fn test_initialize_fails_when_data_dir_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("graphiti"), "not a directory").unwrap();
        let config = HandlerConfig {
            source: dir.path().join("graphiti"),
            ..Default::default()
        };
        let mut handler = GraphitiHandler::new(&config);
        assert!(handler.initialize().await.is_err());
        assert!(!handler.db_path().exists());
    }

    #[tokio::test]
    async fn test_search_with_huge_limit_returns_matches() {
        let (_dir, handler) = open_store().await;
        handler
            .execute("add_episode", &json!({"name": "tokio notes", "content": "spawn_blocking for sqlite"}))
            .await
            .unwrap();

        let out = handler
            .execute("search_insights", &json!({"query": "sqlite", "limit": u64::MAX}))
            .await
            .unwrap();
        assert_eq!(out["count"]["episodes"], 1);
    }

    #[tokio::test]
    async fn test_store_and_search() {
        let (_dir, handler) = open_store().await;

        let out = handler
            .execute("store_insight", &json!({"content": "Use tokio::sync::Mutex across awaits"}))
            .await
            .unwrap();
        assert_eq!(out["message"], "Insight stored successfully");

        let out = handler
            .execute(
                "add_episode",
                &json!({"name": "Standup", "content": "Discussed the retry policy"}),
            )
            .await
            .unwrap();
        assert_eq!(out["tool"], "add_episode");
        assert_eq!(out["episode_uuid"].as_str().unwrap().len(), 36);

        let found = handler
            .execute("search_insights", &json!({"query": "MUTEX"}))
            .await
            .unwrap();
        assert_eq!(found["count"]["episodes"], 1);
        let episode = &found["results"]["episodes"][0];
        assert!(episode["name"].as_str().unwrap().starts_with("Insight: Use tokio"));

        let none = handler
            .execute("search_insights", &json!({"query": "kubernetes"}))
            .await
            .unwrap();
        assert_eq!(none["count"]["episodes"], 0);
    }

    #[tokio::test]
    async fn test_query_graph_read_only_with_params() {
        let (_dir, handler) = open_store().await;
        for name in ["alpha", "beta"] {
            handler
                .execute("add_episode", &json!({"name": name, "content": "c"}))
                .await
                .unwrap();
        }

        let out = handler
            .execute(
                "query_graph",
                &json!({
                    "cypher_query": "SELECT name, source_description FROM episodes WHERE name = :name",
                    "params": {"name": "beta"}
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["results"][0]["name"], "beta");
        assert_eq!(out["results"][0]["source_description"], "user conversation");

        let err = handler
            .execute("query_graph", &json!({"cypher_query": "DELETE FROM episodes"}))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_cleanup_closes_store() {
        let (_dir, handler) = open_store().await;
        handler.cleanup().await.unwrap();
        handler.cleanup().await.unwrap();
        let err = handler
            .execute("search_insights", &json!({"query": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Storage(ref m) if m.contains("closed")));
    }
}
