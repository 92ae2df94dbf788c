//! Per-job processing inside one worker slot
//!
//! A worker owns at most one engine, created the first time a local job lands
//! on it and reused for every later job. Provider-routed jobs never touch it.

use crate::agents::{self, subagent, AgentCatalog};
use crate::engine::{EngineFactory, EngineState, GenerationOptions, GenerationRequest};
use crate::providers::{ProviderFactory, ProviderSettings};
use crate::safety::SafetyDetector;
use crate::tools::ToolRegistry;
use crate::types::{
    Job, JobRequest, JobResult, ModelSelection, Result, FALLBACK_AGENT_NAME,
    GUARDRAIL_INPUT_MESSAGE, GUARDRAIL_OUTPUT_MESSAGE,
};
use crate::utils::toml_config::{SubagentConfig, SwitchboardConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Read-only collaborators shared by every worker
pub struct WorkerContext {
    pub catalog: AgentCatalog,
    pub tools: ToolRegistry,
    pub safety: SafetyDetector,
    pub providers: Arc<dyn ProviderFactory>,
    pub engines: Arc<dyn EngineFactory>,
    pub router_adapter_path: PathBuf,
    pub router_max_new_tokens: u32,
    pub max_new_tokens: u32,
    pub subagent: SubagentConfig,
}

impl WorkerContext {
    pub fn from_config(
        config: &SwitchboardConfig,
        engines: Arc<dyn EngineFactory>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Result<Self> {
        Ok(Self {
            catalog: AgentCatalog::from_config(config),
            tools: config.tool_registry(),
            safety: SafetyDetector::from_config(&config.safety)?,
            providers,
            engines,
            router_adapter_path: config.resolve(&config.router.model_path),
            router_max_new_tokens: config.router.max_new_tokens,
            max_new_tokens: config.engine.max_new_tokens,
            subagent: config.subagent.clone(),
        })
    }
}

/// State a worker slot carries from one job to the next
pub struct WorkerState {
    id: usize,
    engine: Option<EngineState>,
}

impl WorkerState {
    pub fn new(id: usize) -> Self {
        Self { id, engine: None }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    async fn engine(&mut self, factory: &dyn EngineFactory) -> Result<&mut EngineState> {
        let engine = match self.engine.take() {
            Some(engine) => engine,
            None => {
                info!(worker = self.id, "Initializing generation engine");
                let engine = EngineState::new(factory.create(self.id).await?);
                info!(worker = self.id, model = engine.base_model(), "Engine ready");
                engine
            }
        };
        Ok(self.engine.insert(engine))
    }
}

/// Answer one job. Never fails: errors become an `error` result.
pub async fn process_job(
    mut state: WorkerState,
    ctx: Arc<WorkerContext>,
    job: Job,
) -> (WorkerState, JobResult) {
    debug!(job_id = %job.job_id, worker = state.id, "Processing job");
    let result = match answer(&mut state, &ctx, &job.request).await {
        Ok(result) => result,
        Err(e) => {
            error!(job_id = %job.job_id, worker = state.id, error = %e, "Job failed");
            JobResult::error(e.to_string())
        }
    };
    debug!(job_id = %job.job_id, worker = state.id, status = ?result.status, "Finished job");
    (state, result)
}

async fn answer(
    state: &mut WorkerState,
    ctx: &WorkerContext,
    request: &JobRequest,
) -> Result<JobResult> {
    let flags = request.user_feature_flags;

    if flags.block_dangerous_content && ctx.safety.contains_dangerous_content(&request.user_query) {
        warn!(worker = state.id, "Query blocked by content safety policy");
        return Ok(JobResult::guardrail(GUARDRAIL_INPUT_MESSAGE));
    }

    let mut selection = request.expert_settings.model_selection.clone();
    if flags.pii_force_local && !selection.is_local() && ctx.safety.contains_pii(&request.user_query)
    {
        info!(worker = state.id, requested = %selection, "PII detected, forcing local system");
        selection = ModelSelection::Local;
    }

    let (response, agent_name) = match selection {
        ModelSelection::Local => answer_locally(state, ctx, request).await?,
        ModelSelection::Provider { provider, model } => {
            answer_with_provider(ctx, request, &provider, &model).await
        }
    };

    if flags.block_dangerous_content && ctx.safety.contains_dangerous_content(&response) {
        warn!(worker = state.id, agent = %agent_name, "Response blocked by content safety policy");
        return Ok(JobResult::guardrail(GUARDRAIL_OUTPUT_MESSAGE));
    }

    Ok(JobResult::complete(response, agent_name))
}

async fn answer_locally(
    state: &mut WorkerState,
    ctx: &WorkerContext,
    request: &JobRequest,
) -> Result<(String, String)> {
    let worker = state.id;
    let engine = state.engine(ctx.engines.as_ref()).await?;

    let options = GenerationOptions {
        temperature: request.expert_settings.temperature,
        top_p: request.expert_settings.top_p,
        max_new_tokens: ctx.max_new_tokens,
    };
    let candidates = ctx.catalog.known(request.candidate_agents());

    let chosen = agents::route(
        engine,
        &request.user_query,
        &candidates,
        &ctx.router_adapter_path,
        &options.with_max_new_tokens(ctx.router_max_new_tokens),
    )
    .await?;

    match chosen.as_deref().and_then(|name| ctx.catalog.get(name)) {
        Some(agent) => {
            info!(worker, agent = %agent.name, "Running subagent");
            let response = subagent::run(
                engine,
                agent,
                &request.user_query,
                &request.chat_history_for_local,
                &ctx.tools,
                &ctx.subagent,
                &options,
            )
            .await?;
            Ok((response.content, agent.display_name()))
        }
        None => {
            debug!(worker, "No agent matched, answering with the base model");
            let generation = GenerationRequest::new(request.user_query.as_str())
                .with_history(request.chat_history_for_local.as_str());
            let response = engine.generate(&generation, &options).await?;
            Ok((response, FALLBACK_AGENT_NAME.to_string()))
        }
    }
}

/// Provider failures are reported in the response text, not as job errors
async fn answer_with_provider(
    ctx: &WorkerContext,
    request: &JobRequest,
    provider: &str,
    model: &str,
) -> (String, String) {
    let display_name = ctx.providers.display_name(provider, model);
    info!(provider, model, "Calling external provider");

    let settings = ProviderSettings {
        temperature: request.expert_settings.temperature,
        top_p: request.expert_settings.top_p,
    };
    let response = match ctx.providers.get_client(provider, model, settings) {
        Ok(client) => {
            client
                .invoke(&request.user_query, &request.chat_history_for_providers)
                .await
        }
        Err(e) => Err(e),
    };

    match response {
        Ok(text) => (text, display_name),
        Err(e) => {
            warn!(provider, error = %e, "Provider call failed");
            (format!("Error calling provider '{}': {}", provider, e), display_name)
        }
    }
}
