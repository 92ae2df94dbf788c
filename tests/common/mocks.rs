//! Test doubles for the generation engine and external providers.
//!
//! The doubles share their script and recorded events through `Arc`s, so a
//! test can keep a handle after the double has been boxed into an
//! `EngineState` or handed to a dispatcher.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use switchboard::engine::{
    EngineFactory, GenerationEngine, GenerationOptions, GenerationRequest,
};
use switchboard::providers::{ProviderClient, ProviderFactory, ProviderSettings};
use switchboard::types::{AppError, ChatMessage, Result};

/// Something that happened on a scripted engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Load(String),
    Unload(String),
    Generate {
        adapter: Option<String>,
        request: GenerationRequest,
    },
}

/// Engine that answers from a queue of scripted outputs.
///
/// Once the queue is empty every call returns the fallback output, or fails
/// when built with [`ScriptedEngine::then_failing`].
#[derive(Clone)]
pub struct ScriptedEngine {
    outputs: Arc<Mutex<VecDeque<String>>>,
    fallback: String,
    events: Arc<Mutex<Vec<EngineEvent>>>,
    fail_generate: bool,
    fail_when_exhausted: bool,
    panic_on: Option<String>,
}

impl ScriptedEngine {
    pub fn new(outputs: &[&str]) -> Self {
        Self {
            outputs: Arc::new(Mutex::new(outputs.iter().map(|s| s.to_string()).collect())),
            fallback: "I am the base model.".to_string(),
            events: Arc::new(Mutex::new(Vec::new())),
            fail_generate: false,
            fail_when_exhausted: false,
            panic_on: None,
        }
    }

    /// Every generation returns `output`
    pub fn repeating(output: &str) -> Self {
        let mut engine = Self::new(&[]);
        engine.fallback = output.to_string();
        engine
    }

    /// Every generation fails with an engine error
    pub fn failing() -> Self {
        let mut engine = Self::new(&[]);
        engine.fail_generate = true;
        engine
    }

    /// Fail every generation after the scripted outputs run out
    pub fn then_failing(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    /// Panic when a prompt contains `marker`
    pub fn panicking_on(mut self, marker: &str) -> Self {
        self.panic_on = Some(marker.to_string());
        self
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn generations(&self) -> Vec<(Option<String>, GenerationRequest)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Generate { adapter, request } => {
                    Some((adapter.clone(), request.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Adapters still loaded after replaying every load and unload
    pub fn loaded_adapters(&self) -> Vec<String> {
        let mut loaded: Vec<String> = Vec::new();
        for event in self.events.lock().iter() {
            match event {
                EngineEvent::Load(name) => loaded.push(name.clone()),
                EngineEvent::Unload(name) => loaded.retain(|n| n != name),
                EngineEvent::Generate { .. } => {}
            }
        }
        loaded
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    fn model_name(&self) -> &str {
        "scripted-base"
    }

    async fn generate(
        &mut self,
        request: &GenerationRequest,
        adapter: Option<&str>,
        _options: &GenerationOptions,
    ) -> Result<String> {
        if let Some(marker) = &self.panic_on {
            if request.prompt.contains(marker.as_str()) {
                panic!("scripted engine panic");
            }
        }

        self.events.lock().push(EngineEvent::Generate {
            adapter: adapter.map(str::to_string),
            request: request.clone(),
        });

        if self.fail_generate {
            return Err(AppError::LLM("scripted engine failure".to_string()));
        }

        match self.outputs.lock().pop_front() {
            Some(output) => Ok(output),
            None if self.fail_when_exhausted => {
                Err(AppError::LLM("scripted engine failure".to_string()))
            }
            None => Ok(self.fallback.clone()),
        }
    }

    async fn load_adapter(&mut self, name: &str, _path: &Path) -> Result<()> {
        self.events.lock().push(EngineEvent::Load(name.to_string()));
        Ok(())
    }

    async fn unload_adapter(&mut self, name: &str) -> Result<()> {
        self.events.lock().push(EngineEvent::Unload(name.to_string()));
        Ok(())
    }
}

/// Hands out clones of one scripted engine and counts how many were built
#[derive(Clone)]
pub struct ScriptedEngineFactory {
    pub engine: ScriptedEngine,
    created: Arc<AtomicUsize>,
}

impl ScriptedEngineFactory {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self {
            engine,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for ScriptedEngineFactory {
    async fn create(&self, _worker_id: usize) -> Result<Box<dyn GenerationEngine>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.engine.clone()))
    }
}

/// Provider client returning a fixed answer and recording its calls
pub struct MockProvider {
    response: String,
    should_fail: bool,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl MockProvider {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn invoke(&self, prompt: &str, history: &[ChatMessage]) -> Result<String> {
        self.calls.lock().push((prompt.to_string(), history.to_vec()));
        if self.should_fail {
            return Err(AppError::Provider("quota exceeded".to_string()));
        }
        Ok(self.response.clone())
    }
}

/// Serves one `MockProvider` under any provider id
pub struct MockProviderFactory {
    pub provider: Arc<MockProvider>,
    pub requests: Mutex<Vec<(String, String, ProviderSettings)>>,
}

impl MockProviderFactory {
    pub fn new(provider: MockProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ProviderFactory for MockProviderFactory {
    fn get_client(
        &self,
        provider: &str,
        model: &str,
        settings: ProviderSettings,
    ) -> Result<Arc<dyn ProviderClient>> {
        self.requests
            .lock()
            .push((provider.to_string(), model.to_string(), settings));
        let client: Arc<dyn ProviderClient> = self.provider.clone();
        Ok(client)
    }

    fn display_name(&self, provider: &str, model: &str) -> String {
        format!("{}: {}", provider.to_uppercase(), model)
    }
}
