//! Generation engine abstraction
//!
//! A worker owns exactly one [`GenerationEngine`] for its whole lifetime. The
//! engine wraps a single loaded base model and lets callers attach and detach
//! low-rank adapters on top of it. [`adapter::EngineState`] layers the
//! one-adapter-at-a-time bookkeeping over the raw capability.

pub mod adapter;
pub mod http;

pub use adapter::{AdapterLease, EngineState};
pub use http::{OpenAiCompatibleEngine, OpenAiCompatibleEngineFactory};

use crate::types::Result;
use async_trait::async_trait;
use std::path::Path;

/// Sampling parameters for a single generation call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_new_tokens: 1024,
        }
    }
}

impl GenerationOptions {
    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }
}

/// Input to one generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    /// System context (persona, tool policy, observations)
    pub system: Option<String>,
    /// Prior conversation rendered as plain text
    pub history: String,
    /// The prompt the model should answer now
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_history(mut self, history: impl Into<String>) -> Self {
        self.history = history.into();
        self
    }
}

/// The shared base model plus its adapter operations.
///
/// Implementations are owned by a single worker and never shared, so every
/// method takes `&mut self`.
#[async_trait]
pub trait GenerationEngine: Send {
    /// Identifier of the loaded base model
    fn model_name(&self) -> &str;

    /// Generate text. `adapter` names the adapter to apply, `None` for the bare base model.
    async fn generate(
        &mut self,
        request: &GenerationRequest,
        adapter: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String>;

    /// Attach the adapter stored at `path` under the logical name `name`
    async fn load_adapter(&mut self, name: &str, path: &Path) -> Result<()>;

    /// Detach a previously attached adapter
    async fn unload_adapter(&mut self, name: &str) -> Result<()>;
}

/// Builds one engine per worker slot, on the slot's first job.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, worker_id: usize) -> Result<Box<dyn GenerationEngine>>;
}
