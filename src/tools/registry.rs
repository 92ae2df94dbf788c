use crate::tools::parser::ToolArg;
use crate::types::Result;
use crate::utils::toml_config::ToolsConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    /// One-line signature and description, pasted verbatim into agent prompts
    fn schema(&self) -> &str;
    async fn call(&self, args: &[ToolArg]) -> Result<String>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with the built-in tools (date, simple interest)
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::tools::basic::CurrentDate));
        registry.register(Arc::new(crate::tools::basic::SimpleInterest));
        registry
    }

    /// Built-in tools plus the knowledge base search when one is configured
    pub fn from_config(config: &ToolsConfig) -> Self {
        let mut registry = Self::with_default_tools();
        if let Some(path) = &config.knowledge_base {
            registry.register(Arc::new(crate::tools::knowledge::KnowledgeBase::new(
                path.clone(),
            )));
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn schema(&self, name: &str) -> Option<&str> {
        self.tools.get(name).map(|tool| tool.schema())
    }

    /// Get a sorted list of all registered tool names
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}
