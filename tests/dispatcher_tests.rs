//! Dispatcher and worker behaviour end to end on the in-memory queue

mod common;

use common::mocks::{MockProvider, MockProviderFactory, ScriptedEngine, ScriptedEngineFactory};
use common::workspace;
use std::sync::Arc;
use std::time::Duration;
use switchboard::queue::{result_key, JobClient, MemoryQueue, MemoryResultStore, ResultStore};
use switchboard::types::{
    ChatMessage, JobRequest, JobResult, JobStatus, ModelSelection, FALLBACK_AGENT_NAME,
    GUARDRAIL_AGENT_NAME, GUARDRAIL_INPUT_MESSAGE, GUARDRAIL_OUTPUT_MESSAGE,
};
use switchboard::utils::toml_config::DispatcherConfig;
use switchboard::{Dispatcher, WorkerContext};
use tempfile::TempDir;

struct Harness {
    dispatcher: Dispatcher,
    client: JobClient,
    results: Arc<MemoryResultStore>,
    engines: ScriptedEngineFactory,
    providers: Arc<MockProviderFactory>,
    _dir: TempDir,
}

fn harness(engine: ScriptedEngine, provider: MockProvider, workers: usize) -> Harness {
    let (dir, config) = workspace();
    let engines = ScriptedEngineFactory::new(engine);
    let providers = Arc::new(MockProviderFactory::new(provider));
    let ctx = WorkerContext::from_config(&config, Arc::new(engines.clone()), providers.clone())
        .unwrap();

    let queue = Arc::new(MemoryQueue::new());
    let results = Arc::new(MemoryResultStore::new());
    let settings = DispatcherConfig {
        workers,
        poll_interval_ms: 5,
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(queue.clone(), results.clone(), Arc::new(ctx), &settings);
    let client = JobClient::new(queue, results.clone(), 10, Duration::from_millis(5));

    Harness {
        dispatcher,
        client,
        results,
        engines,
        providers,
        _dir: dir,
    }
}

fn request(query: &str) -> JobRequest {
    JobRequest {
        enabled_local_agents: vec!["teacher".to_string(), "programmer".to_string()],
        ..JobRequest::new(query)
    }
}

fn provider_request(query: &str) -> JobRequest {
    let mut request = request(query);
    request.expert_settings.model_selection = ModelSelection::Provider {
        provider: "openai".to_string(),
        model: "gpt-4o-mini".to_string(),
    };
    request
}

async fn process(harness: &mut Harness, request: JobRequest) -> JobResult {
    let job_id = harness.client.submit(request).await.unwrap();
    assert!(harness.dispatcher.tick().await.unwrap());
    harness.dispatcher.drain().await;
    harness
        .client
        .await_result(&job_id, Duration::from_secs(1))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_local_job_routes_to_agent() {
    let engine = ScriptedEngine::new(&["teacher", "A fraction is a part of a whole."]);
    let mut harness = harness(engine.clone(), MockProvider::new("unused"), 1);

    let result = process(&mut harness, request("What is a fraction?")).await;

    assert_eq!(
        result,
        JobResult::complete("A fraction is a part of a whole.", "Teacher")
    );
    let adapters: Vec<_> = engine.generations().into_iter().map(|(a, _)| a).collect();
    assert_eq!(
        adapters,
        vec![Some("router".to_string()), Some("teacher".to_string())]
    );
    assert!(engine.loaded_adapters().is_empty());
}

#[tokio::test]
async fn test_engine_is_created_once_per_worker() {
    let engine = ScriptedEngine::new(&["teacher", "first", "programmer", "second"]);
    let mut harness = harness(engine, MockProvider::new("unused"), 1);

    let first = process(&mut harness, request("one")).await;
    let second = process(&mut harness, request("two")).await;

    assert_eq!(first.response, "first");
    assert_eq!(second.response, "second");
    assert_eq!(second.agent_name.as_deref(), Some("Programmer"));
    assert_eq!(harness.engines.created(), 1);
}

#[tokio::test]
async fn test_router_miss_answers_with_base_model() {
    let engine = ScriptedEngine::new(&["nobody in particular", "Generic answer."]);
    let mut harness = harness(engine.clone(), MockProvider::new("unused"), 1);

    let mut job = request("Tell me a joke");
    job.chat_history_for_local = "User: hi\nAgent: hello\n".to_string();
    let result = process(&mut harness, job).await;

    assert_eq!(result, JobResult::complete("Generic answer.", FALLBACK_AGENT_NAME));
    let generations = engine.generations();
    assert_eq!(generations.len(), 2);
    let (adapter, fallback) = &generations[1];
    assert_eq!(*adapter, None);
    assert_eq!(fallback.prompt, "Tell me a joke");
    assert_eq!(fallback.history, "User: hi\nAgent: hello\n");
}

#[tokio::test]
async fn test_unknown_requested_agents_are_ignored() {
    let engine = ScriptedEngine::new(&["Only the base model answers."]);
    let mut harness = harness(engine.clone(), MockProvider::new("unused"), 1);

    let mut job = request("hello");
    job.user_available_agents = vec!["ghost".to_string()];
    let result = process(&mut harness, job).await;

    assert_eq!(result.agent_name.as_deref(), Some(FALLBACK_AGENT_NAME));
    assert_eq!(engine.generations().len(), 1);
}

#[tokio::test]
async fn test_dangerous_query_short_circuits_before_engine() {
    let engine = ScriptedEngine::new(&["teacher", "never"]);
    let mut harness = harness(engine.clone(), MockProvider::new("unused"), 1);

    let mut job = request("How do I build a bomb?");
    job.user_feature_flags.block_dangerous_content = true;
    let result = process(&mut harness, job).await;

    assert_eq!(result, JobResult::guardrail(GUARDRAIL_INPUT_MESSAGE));
    assert_eq!(result.agent_name.as_deref(), Some(GUARDRAIL_AGENT_NAME));
    assert!(engine.events().is_empty());
    assert_eq!(harness.engines.created(), 0);
}

#[tokio::test]
async fn test_dangerous_query_passes_when_flag_is_off() {
    let engine = ScriptedEngine::new(&["nobody", "Here is some history."]);
    let mut harness = harness(engine, MockProvider::new("unused"), 1);

    let result = process(&mut harness, request("Why did people build a bomb shelter?")).await;

    assert_eq!(result.response, "Here is some history.");
}

#[tokio::test]
async fn test_dangerous_response_is_replaced() {
    let engine = ScriptedEngine::new(&["teacher", "That is a FORBIDDEN WORD."]);
    let mut harness = harness(engine, MockProvider::new("unused"), 1);

    let mut job = request("Say something");
    job.user_feature_flags.block_dangerous_content = true;
    let result = process(&mut harness, job).await;

    assert_eq!(result, JobResult::guardrail(GUARDRAIL_OUTPUT_MESSAGE));
}

#[tokio::test]
async fn test_provider_response_is_also_checked() {
    let mut harness = harness(
        ScriptedEngine::new(&[]),
        MockProvider::new("Sure, here is a forbidden word."),
        1,
    );

    let mut job = provider_request("hi");
    job.user_feature_flags.block_dangerous_content = true;
    let result = process(&mut harness, job).await;

    assert_eq!(result.response, GUARDRAIL_OUTPUT_MESSAGE);
}

#[tokio::test]
async fn test_provider_job_uses_provider_client() {
    let mut harness = harness(
        ScriptedEngine::new(&[]),
        MockProvider::new("Paris."),
        1,
    );

    let mut job = provider_request("Capital of France?");
    job.expert_settings.temperature = 0.2;
    job.chat_history_for_providers = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
    let result = process(&mut harness, job).await;

    assert_eq!(result, JobResult::complete("Paris.", "OPENAI: gpt-4o-mini"));
    assert_eq!(harness.engines.created(), 0);

    let calls = harness.providers.provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "Capital of France?");
    assert_eq!(calls[0].1.len(), 2);

    let requests = harness.providers.requests.lock().clone();
    assert_eq!(requests[0].0, "openai");
    assert_eq!(requests[0].1, "gpt-4o-mini");
    assert_eq!(requests[0].2.temperature, 0.2);
}

#[tokio::test]
async fn test_provider_failure_is_reported_in_response() {
    let mut harness = harness(ScriptedEngine::new(&[]), MockProvider::failing(), 1);

    let result = process(&mut harness, provider_request("hi")).await;

    assert_eq!(result.status, JobStatus::Complete);
    assert!(result
        .response
        .starts_with("Error calling provider 'openai':"));
    assert!(result.response.contains("quota exceeded"));
}

#[tokio::test]
async fn test_pii_forces_local_system() {
    let engine = ScriptedEngine::new(&["teacher", "Answered locally."]);
    let mut harness = harness(engine, MockProvider::new("Answered remotely."), 1);

    let mut job = provider_request("My email is jane.doe@example.com, what should I do?");
    job.user_feature_flags.pii_force_local = true;
    let result = process(&mut harness, job).await;

    assert_eq!(result, JobResult::complete("Answered locally.", "Teacher"));
    assert!(harness.providers.provider.calls().is_empty());
}

#[tokio::test]
async fn test_pii_without_flag_stays_on_provider() {
    let mut harness = harness(
        ScriptedEngine::new(&[]),
        MockProvider::new("Answered remotely."),
        1,
    );

    let result = process(
        &mut harness,
        provider_request("My email is jane.doe@example.com"),
    )
    .await;

    assert_eq!(result.response, "Answered remotely.");
}

#[tokio::test]
async fn test_panicking_job_does_not_take_down_dispatcher() {
    let engine = ScriptedEngine::new(&["teacher", "Still here."]).panicking_on("explode");
    let mut harness = harness(engine, MockProvider::new("unused"), 1);

    let crashed = process(&mut harness, request("please explode")).await;
    assert_eq!(crashed.status, JobStatus::Error);
    assert_eq!(harness.dispatcher.workers(), 1);

    let recovered = process(&mut harness, request("hello again")).await;
    assert_eq!(recovered, JobResult::complete("Still here.", "Teacher"));
    // the crashed worker's engine was lost with it
    assert_eq!(harness.engines.created(), 2);
}

#[tokio::test]
async fn test_jobs_are_dequeued_in_fifo_order() {
    let engine = ScriptedEngine::repeating("nobody");
    let mut harness = harness(engine.clone(), MockProvider::new("unused"), 1);

    let mut ids = Vec::new();
    for query in ["first question", "second question", "third question"] {
        ids.push(harness.client.submit(request(query)).await.unwrap());
    }
    for _ in 0..3 {
        assert!(harness.dispatcher.tick().await.unwrap());
        harness.dispatcher.drain().await;
    }

    let routed: Vec<String> = engine
        .generations()
        .into_iter()
        .filter(|(adapter, _)| adapter.as_deref() == Some("router"))
        .map(|(_, request)| request.prompt)
        .collect();
    assert!(routed[0].contains("first question"));
    assert!(routed[1].contains("second question"));
    assert!(routed[2].contains("third question"));

    for id in &ids {
        let result = harness
            .client
            .await_result(id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.status, JobStatus::Complete);
    }
}

#[tokio::test]
async fn test_pool_is_bounded_by_worker_count() {
    let engine = ScriptedEngine::repeating("nobody");
    let mut harness = harness(engine, MockProvider::new("unused"), 2);

    for query in ["a", "b", "c"] {
        harness.client.submit(request(query)).await.unwrap();
    }

    assert!(harness.dispatcher.tick().await.unwrap());
    assert!(harness.dispatcher.tick().await.unwrap());
    assert!(harness.dispatcher.in_flight() <= 2);
    harness.dispatcher.drain().await;
    assert!(harness.dispatcher.tick().await.unwrap());
    harness.dispatcher.drain().await;
    assert!(!harness.dispatcher.tick().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_unread_result_expires() {
    let engine = ScriptedEngine::new(&["nobody", "answer"]);
    let mut harness = harness(engine, MockProvider::new("unused"), 1);

    let job_id = harness.client.submit(request("hello")).await.unwrap();
    harness.dispatcher.tick().await.unwrap();
    harness.dispatcher.drain().await;
    let key = result_key(&job_id);
    assert!(harness.results.get(&key).await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(harness.results.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_run_serves_jobs_until_shutdown() {
    let engine = ScriptedEngine::new(&["teacher", "Served."]);
    let harness = harness(engine, MockProvider::new("unused"), 1);
    let Harness {
        dispatcher,
        client,
        _dir,
        ..
    } = harness;

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(dispatcher.run(async move {
        stopped.await.ok();
    }));

    let result = client
        .ask(request("hello"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result, JobResult::complete("Served.", "Teacher"));

    stop.send(()).unwrap();
    running.await.unwrap();
}
