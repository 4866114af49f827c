use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WeaveResult;
use crate::types::ToolDefinition;

/// A tool the agent can call. Implementations live outside the engine.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match the definition name)
    fn name(&self) -> &str;

    /// Tool definition for sending to the model
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments.
    ///
    /// An `Err` does not stop the agent loop; it is shown to the model as an
    /// error-flagged tool result.
    async fn execute(&self, call_id: &str, arguments: serde_json::Value)
        -> WeaveResult<ToolOutput>;
}

/// Output from a tool execution: one or more text blocks
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub blocks: Vec<String>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            blocks: vec![content.into()],
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            blocks: vec![content.into()],
            is_error: true,
        }
    }

    pub fn blocks(blocks: Vec<String>) -> Self {
        Self {
            blocks,
            is_error: false,
        }
    }

    /// All blocks joined by newlines
    pub fn text(&self) -> String {
        self.blocks.join("\n")
    }
}

/// Registry of tools available to an agent. Cheap to clone.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.push(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Only the named tools. Names with no tool are ignored.
    pub fn subset(&self, names: &[String]) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|t| names.iter().any(|n| n == t.name()))
                .cloned()
                .collect(),
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
