//! One-line tool descriptions shown in search previews.
//!
//! Previews are produced without touching any handler, so the text comes
//! from this static table rather than from the tool's schema.

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub const NO_DESCRIPTION: &str = "No description available";

static SHORT_DESCRIPTIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // Code understanding
        ("search_code", "Search codebase semantically"),
        ("get_call_graph", "Get function call relationships"),
        ("find_symbol", "Find symbol definition (sub-10ms)"),
        ("find_implementations", "Find implementations of interface/class"),
        // Documentation
        ("resolve_library_id", "Resolve library name to Context7 ID"),
        ("get_library_docs", "Fetch up-to-date library documentation"),
        // Browser automation
        ("playwright_navigate", "Navigate browser to URL"),
        ("playwright_screenshot", "Take screenshot of page"),
        ("playwright_click", "Click element on page"),
        ("playwright_fill", "Fill input field"),
        ("playwright_select", "Select dropdown option"),
        ("playwright_evaluate", "Execute JavaScript in browser"),
        ("playwright_get_text", "Get text content of element"),
        ("playwright_hover", "Hover over element"),
        // Memory
        ("mem_search", "Search past session observations"),
        ("mem_get_observation", "Get specific observation by ID"),
        ("mem_recent_context", "Get recent session context"),
        ("mem_timeline", "Get timeline around observation"),
        // Knowledge graph
        ("store_insight", "Store cross-session knowledge"),
        ("search_insights", "Search past insights & decisions"),
        ("query_graph", "Query knowledge graph with Cypher"),
        ("add_episode", "Add episode to knowledge graph"),
    ])
});

/// Short description for `tool_name`, or [`NO_DESCRIPTION`].
pub fn short_description(tool_name: &str) -> &'static str {
    SHORT_DESCRIPTIONS
        .get(tool_name)
        .copied()
        .unwrap_or(NO_DESCRIPTION)
}
