//! # switchboard
//!
//! An orchestration engine that answers queued chat requests with a set of
//! specialized agents. Every agent is the same base model reconfigured by a
//! different LoRA adapter; a routing adapter picks the agent, and the agent may
//! call tools before it answers.
//!
//! ## Overview
//!
//! switchboard can be used in two ways:
//!
//! 1. **As a service** - run `switchboard serve` next to an OpenAI-compatible
//!    inference server with runtime LoRA loading, and submit jobs through the
//!    shared queue (`switchboard submit`).
//! 2. **As a library** - embed the [`Dispatcher`] and supply your own
//!    [`engine::EngineFactory`], [`providers::ProviderFactory`], and queue backend.
//!
//! ### Library Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchboard::{
//!     Dispatcher, JobClient, JobRequest, SwitchboardConfig,
//!     engine::OpenAiCompatibleEngineFactory, providers::ProviderRegistry,
//! };
//!
//! let config = SwitchboardConfig::load("switchboard.toml")?;
//! let engines = Arc::new(OpenAiCompatibleEngineFactory::new(
//!     config.engine.clone(),
//!     config.base_model.clone(),
//! ));
//! let providers = Arc::new(ProviderRegistry::from_config(&config)?);
//! let dispatcher = Dispatcher::from_config(&config, engines, providers).await?;
//! tokio::spawn(dispatcher.run(tokio::signal::ctrl_c().map(|_| ())));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `sqlite-queue` | Cross-process queue and result store on a libsql file (default) |
//! | `minimal` | In-process queue only |
//!
//! ## Modules
//!
//! - [`agents`] - Agent catalog, router, and the subagent tool loop
//! - [`dispatcher`] - Poll loop, worker pool, and per-job processing
//! - [`engine`] - Generation engine capability and adapter lifecycle
//! - [`providers`] - External chat providers
//! - [`queue`] - Job queue, result store, and the caller-side client
//! - [`safety`] - Content safety gates
//! - [`tools`] - Tool registry, tool-call parser, built-in tools
//! - [`types`] - Jobs, results, and errors

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Agent catalog, routing, and the per-agent tool loop.
pub mod agents;
/// Command-line parsing and terminal output.
pub mod cli;
/// Queue poll loop and worker pool.
pub mod dispatcher;
/// Generation engine abstraction and adapter lifecycle.
pub mod engine;
/// External provider clients.
pub mod providers;
/// Job queue and result store.
pub mod queue;
/// Pre- and post-generation content checks.
pub mod safety;
/// Tools agents may call.
pub mod tools;
/// Core types (jobs, results, errors).
pub mod types;
/// Configuration loading.
pub mod utils;

// Re-export commonly used types
pub use agents::{AgentCatalog, AgentDefinition};
pub use dispatcher::{Dispatcher, WorkerContext};
pub use engine::{EngineFactory, EngineState, GenerationEngine};
pub use providers::{ProviderClient, ProviderFactory, ProviderRegistry};
pub use queue::JobClient;
pub use safety::SafetyDetector;
pub use tools::ToolRegistry;
pub use types::{
    AppError, ChatMessage, Job, JobRequest, JobResult, JobStatus, ModelSelection, Result, Role,
};
pub use utils::toml_config::SwitchboardConfig;
