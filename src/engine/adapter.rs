//! Adapter lifecycle on a single engine
//!
//! [`EngineState`] owns a worker's engine and records which adapter, if any, the
//! engine holds. Only one adapter is ever held: activating a second one detaches
//! the first, and a detach that fails blocks further attaches until a retry
//! succeeds. [`AdapterLease`] pairs an activation with its release so that
//! callers cannot forget the detach on an early exit.

use super::{GenerationEngine, GenerationOptions, GenerationRequest};
use crate::types::Result;
use std::path::Path;
use tracing::{debug, warn};

pub struct EngineState {
    engine: Box<dyn GenerationEngine>,
    /// Adapter the engine currently holds
    active_adapter: Option<String>,
    /// Held adapter that must be detached before the engine is used again
    pending_release: Option<String>,
}

impl EngineState {
    pub fn new(engine: Box<dyn GenerationEngine>) -> Self {
        Self {
            engine,
            active_adapter: None,
            pending_release: None,
        }
    }

    pub fn base_model(&self) -> &str {
        self.engine.model_name()
    }

    /// The adapter the engine holds, including one whose detach has not yet succeeded
    pub fn active_adapter(&self) -> Option<&str> {
        self.active_adapter.as_deref()
    }

    /// Attach the adapter at `path` under `name` and make it the active one.
    ///
    /// Returns `false` when `path` is not an adapter directory, the engine
    /// refuses it, or a previous adapter could not be detached. Generation then
    /// uses the base model.
    pub async fn activate(&mut self, name: &str, path: &Path) -> bool {
        self.settle().await;

        if !path.is_dir() {
            warn!(
                adapter = name,
                path = %path.display(),
                "Adapter directory not found, using current configuration"
            );
            return false;
        }

        match self.active_adapter.clone() {
            Some(current) if current == name => {
                // still attached after a failed detach; reuse it
                self.pending_release = None;
                return true;
            }
            Some(current) => {
                self.deactivate(&current).await;
                if self.active_adapter.is_some() {
                    warn!(
                        adapter = name,
                        held = %current,
                        "Previous adapter still attached, using base model"
                    );
                    return false;
                }
            }
            None => {}
        }

        match self.engine.load_adapter(name, path).await {
            Ok(()) => {
                debug!(adapter = name, "Adapter activated");
                self.active_adapter = Some(name.to_string());
                true
            }
            Err(e) => {
                warn!(adapter = name, error = %e, "Failed to load adapter, using base model");
                false
            }
        }
    }

    /// Detach `name`. A no-op when `name` is not the active adapter.
    ///
    /// When the engine fails to detach, the adapter stays recorded and the
    /// detach is retried before the engine's next use.
    pub async fn deactivate(&mut self, name: &str) {
        if self.active_adapter.as_deref() != Some(name) {
            return;
        }
        match self.engine.unload_adapter(name).await {
            Ok(()) => {
                self.active_adapter = None;
                self.pending_release = None;
                debug!(adapter = name, "Adapter deactivated");
            }
            Err(e) => {
                warn!(adapter = name, error = %e, "Failed to unload adapter, will retry");
                self.pending_release = Some(name.to_string());
            }
        }
    }

    /// Activate `name` and hand back a lease that must be released.
    pub async fn lease(&mut self, name: &str, path: &Path) -> AdapterLease<'_> {
        let attached = self.activate(name, path).await;
        AdapterLease {
            state: self,
            name: name.to_string(),
            attached,
            released: false,
        }
    }

    /// Generate with the active adapter, or the base model if none is in use.
    pub async fn generate(
        &mut self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String> {
        self.settle().await;
        let adapter = match (&self.active_adapter, &self.pending_release) {
            (Some(active), Some(pending)) if active == pending => None,
            (active, _) => active.as_deref(),
        };
        self.engine.generate(request, adapter, options).await
    }

    async fn settle(&mut self) {
        if let Some(name) = self.pending_release.take() {
            debug!(adapter = %name, "Detaching released adapter");
            self.deactivate(&name).await;
        }
    }
}

/// Scoped activation of one adapter.
///
/// Call [`AdapterLease::release`] on every exit path. A lease dropped without
/// release marks its adapter for detach before the engine is used again.
pub struct AdapterLease<'a> {
    state: &'a mut EngineState,
    name: String,
    attached: bool,
    released: bool,
}

impl AdapterLease<'_> {
    /// Whether the adapter actually attached (false means base model fallback)
    pub fn attached(&self) -> bool {
        self.attached
    }

    pub async fn generate(
        &mut self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String> {
        self.state.generate(request, options).await
    }

    pub async fn release(mut self) {
        self.released = true;
        if self.attached {
            self.state.deactivate(&self.name).await;
        }
    }
}

impl Drop for AdapterLease<'_> {
    fn drop(&mut self) {
        if !self.released && self.attached {
            warn!(adapter = %self.name, "Adapter lease dropped without release");
            self.state.pending_release = Some(self.name.clone());
        }
    }
}
