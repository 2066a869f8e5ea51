//! Tools the companion can call on the article
//!
//! A handler either returns a JSON result or an error string. Failures and
//! panics are folded into `{"error": ...}` so every call gets an answer.

use crate::content::{Catalog, SegmentId};
use crate::conversation::protocol::ToolDefinition;
use crossbeam_channel::Sender;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub type ToolResult = std::result::Result<Value, String>;
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ToolResult> + Send + Sync>;

struct Tool {
    name: String,
    description: String,
    parameters: Value,
    handler: ToolHandler,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any earlier one with the same name
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let name = name.into();
        self.tools.retain(|t| t.name != name);
        self.tools.push(Tool {
            name,
            description: description.into(),
            parameters,
            handler: Arc::new(move |args| handler(args).boxed()),
        });
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Definitions advertised in the session settings
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                kind: "function".to_string(),
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect()
    }

    /// Run a tool with its raw JSON arguments
    pub async fn invoke(&self, name: &str, arguments: &str) -> Value {
        let Some(tool) = self.tools.iter().find(|t| t.name == name) else {
            warn!("Unknown tool requested: {}", name);
            return json!({ "error": format!("Unknown tool: {}", name) });
        };

        let args = if arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(arguments) {
                Ok(args) => args,
                Err(e) => {
                    warn!("Invalid arguments for {}: {}", name, e);
                    return json!({ "error": format!("Invalid arguments: {}", e) });
                }
            }
        };

        debug!("Invoking tool {} with {}", name, args);
        let handler = Arc::clone(&tool.handler);
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(future) => future,
            Err(panic) => return panicked(name, panic),
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => value,
            Ok(Err(message)) => {
                info!("Tool {} returned error: {}", name, message);
                json!({ "error": message })
            }
            Err(panic) => panicked(name, panic),
        }
    }
}

fn panicked(name: &str, panic: Box<dyn Any + Send>) -> Value {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!("Tool {} panicked: {}", name, message);
    json!({ "error": format!("Tool failed: {}", message) })
}

fn section_parameters(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "section_id": {
                "type": "string",
                "description": description,
            }
        },
        "required": ["section_id"],
    })
}

fn section_id(args: &Value) -> std::result::Result<SegmentId, String> {
    args.get("section_id")
        .and_then(Value::as_str)
        .map(SegmentId::from)
        .ok_or_else(|| "Missing section_id".to_string())
}

/// The article tools: table of contents, section text and navigation
///
/// `scroll_to_heading` hands the section to `navigate`; the host decides how
/// to bring it into view.
pub fn article_tools(catalog: Arc<Catalog>, navigate: Sender<SegmentId>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let contents = Arc::clone(&catalog);
    registry.register(
        "get_contents",
        "Get the table of contents of the article, listing every section id and title.",
        json!({ "type": "object", "properties": {} }),
        move |_args| {
            let listing: Vec<Value> = contents
                .sections()
                .iter()
                .map(|s| json!({ "id": s.id.as_str(), "title": s.title }))
                .collect();
            async move { Ok(Value::Array(listing)) }
        },
    );

    let reader = Arc::clone(&catalog);
    registry.register(
        "read_section",
        "Read the full text of one section of the article.",
        section_parameters("The id of the section to read"),
        move |args| {
            let result = section_id(&args).and_then(|id| {
                reader
                    .get(&id)
                    .map(|s| json!({ "content": s.content }))
                    .ok_or_else(|| "Section not found".to_string())
            });
            async move { result }
        },
    );

    registry.register(
        "scroll_to_heading",
        "Scroll the reader's view to a section heading. Use this when discussing a specific part of the article.",
        section_parameters("The id of the section to scroll to"),
        move |args| {
            let result = section_id(&args).and_then(|id| {
                if catalog.get(&id).is_none() {
                    return Err("Section not found".to_string());
                }
                info!("Companion navigating to {}", id);
                navigate
                    .try_send(id)
                    .map(|_| json!({ "success": true }))
                    .map_err(|e| format!("Navigation unavailable: {}", e))
            });
            async move { result }
        },
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Section;
    use crossbeam_channel::unbounded;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::from_sections(vec![
                Section::new("intro", "The Truth", "Opening words."),
                Section::new("latency", "Decision latency", "Slow answers."),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_get_contents() {
        let (tx, _rx) = unbounded();
        let tools = article_tools(catalog(), tx);
        let result = tools.invoke("get_contents", "{}").await;
        assert_eq!(
            result,
            json!([
                {"id": "intro", "title": "The Truth"},
                {"id": "latency", "title": "Decision latency"}
            ])
        );
    }

    #[tokio::test]
    async fn test_read_section() {
        let (tx, _rx) = unbounded();
        let tools = article_tools(catalog(), tx);
        let found = tools.invoke("read_section", r#"{"section_id":"latency"}"#).await;
        assert_eq!(found, json!({"content": "Slow answers."}));
        let missing = tools.invoke("read_section", r#"{"section_id":"nope"}"#).await;
        assert_eq!(missing, json!({"error": "Section not found"}));
    }

    #[tokio::test]
    async fn test_scroll_to_heading_navigates() {
        let (tx, rx) = unbounded();
        let tools = article_tools(catalog(), tx);
        let result = tools.invoke("scroll_to_heading", r#"{"section_id":"intro"}"#).await;
        assert_eq!(result, json!({"success": true}));
        assert_eq!(rx.try_recv().unwrap(), SegmentId::from("intro"));

        let missing = tools.invoke("scroll_to_heading", r#"{"section_id":"x"}"#).await;
        assert_eq!(missing, json!({"error": "Section not found"}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments() {
        let (tx, _rx) = unbounded();
        let tools = article_tools(catalog(), tx);
        let unknown = tools.invoke("delete_everything", "{}").await;
        assert!(unknown["error"].as_str().unwrap().contains("Unknown tool"));
        let invalid = tools.invoke("read_section", "{not json").await;
        assert!(invalid["error"].as_str().unwrap().starts_with("Invalid arguments"));
        let missing = tools.invoke("read_section", "").await;
        assert_eq!(missing, json!({"error": "Missing section_id"}));
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_error() {
        let mut tools = ToolRegistry::new();
        tools.register("boom", "Panics", json!({}), |_args| async move {
            if true {
                panic!("handler exploded");
            }
            Ok(Value::Null)
        });
        let result = tools.invoke("boom", "{}").await;
        assert_eq!(result, json!({"error": "Tool failed: handler exploded"}));
    }

    #[test]
    fn test_definitions_are_ordered() {
        let (tx, _rx) = unbounded();
        let tools = article_tools(catalog(), tx);
        assert_eq!(tools.names(), vec!["get_contents", "read_section", "scroll_to_heading"]);
        let defs = tools.definitions();
        assert_eq!(defs[1].kind, "function");
        assert_eq!(defs[1].parameters["required"], json!(["section_id"]));
    }
}
