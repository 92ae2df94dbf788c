//! Agents: named personas backed by an adapter and a tool whitelist
//!
//! - [`router`] picks an agent for a query
//! - [`subagent`] runs the chosen agent's generate/tool loop

pub mod router;
pub mod subagent;

pub use router::route;
pub use subagent::{LoopOutcome, SubagentResponse, ToolCallRecord};

use crate::utils::toml_config::SwitchboardConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// An agent as loaded from configuration, with paths resolved
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    /// Persona file resolved against the configuration directory
    pub prompt_path: PathBuf,
    /// Persona file exactly as configured, tried second
    pub prompt_file: PathBuf,
    pub adapter_path: PathBuf,
    /// Tool names in configured order
    pub tools_whitelist: Vec<String>,
}

impl AgentDefinition {
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.tools_whitelist.iter().any(|t| t == tool)
    }

    pub fn display_name(&self) -> String {
        capitalize(&self.name)
    }

    pub(crate) fn prompt_candidates(&self) -> [&PathBuf; 2] {
        [&self.prompt_path, &self.prompt_file]
    }
}

/// Upper-case the first character and lower-case the rest
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// The authoritative, read-only set of agents shared by router and loop
#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: BTreeMap<String, AgentDefinition>,
}

impl AgentCatalog {
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        let agents = config
            .agents
            .iter()
            .map(|(name, agent)| {
                let definition = AgentDefinition {
                    name: name.clone(),
                    description: agent.description.clone(),
                    prompt_path: config.resolve(&agent.prompt_file),
                    prompt_file: agent.prompt_file.clone(),
                    adapter_path: config.resolve(&agent.model_path),
                    tools_whitelist: agent.tools_whitelist.clone(),
                };
                (name.clone(), definition)
            })
            .collect();
        Self { agents }
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.agents.values()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Keep only the requested names that are configured, preserving request order
    pub fn known<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .map(String::as_str)
            .filter(|name| {
                let known = self.agents.contains_key(*name);
                if !known {
                    tracing::warn!(agent = *name, "Ignoring unknown agent in request");
                }
                known
            })
            .collect()
    }
}
