use anyhow::{bail, Context, Result};
use std::sync::Arc;
use switchboard::{
    cli::{output::Output, AgentCommands, Cli, Commands},
    dispatcher::Dispatcher,
    engine::OpenAiCompatibleEngineFactory,
    providers::ProviderRegistry,
    queue::{self, JobClient, MemoryQueue, MemoryResultStore},
    AgentCatalog, ChatMessage, JobRequest, ModelSelection, Role, SwitchboardConfig,
    WorkerContext,
};
use switchboard::utils::toml_config::{LogFormat, LoggingConfig, QueueBackend};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let config = match SwitchboardConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            output.error(&e.to_string());
            output.hint("Pass --config <path> or set SWITCHBOARD_CONFIG");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Serve { workers } => serve(config, workers, &output).await,
        Commands::Submit {
            query,
            agents,
            model,
            block_dangerous,
            pii_local,
            no_wait,
        } => {
            let mut request = new_request(&config, query, &model)?;
            if !agents.is_empty() {
                request.user_available_agents = agents;
            }
            request.user_feature_flags.block_dangerous_content = block_dangerous;
            request.user_feature_flags.pii_force_local = pii_local;
            submit(&config, request, no_wait, &output).await
        }
        Commands::Chat { model } => chat(config, &model, &output).await,
        Commands::Agents(command) => {
            show_agents(&config, command, &output);
            Ok(())
        }
        Commands::Config { validate } => show_config(&cli.config, &config, validate, &output),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("switchboard=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let layer = match logging.format {
        LogFormat::Pretty => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .init();
}

fn new_request(config: &SwitchboardConfig, query: String, model: &str) -> Result<JobRequest> {
    let mut request = JobRequest::new(query);
    request.enabled_local_agents = config.agents.keys().cloned().collect();
    request.expert_settings.model_selection = model
        .parse::<ModelSelection>()
        .context("invalid --model")?;
    Ok(request)
}

fn job_client(
    config: &SwitchboardConfig,
    queue: Arc<dyn queue::JobQueue>,
    results: Arc<dyn queue::ResultStore>,
) -> JobClient {
    JobClient::new(
        queue,
        results,
        config.queue.max_queue_length,
        config.queue.poll_interval(),
    )
}

async fn serve(
    mut config: SwitchboardConfig,
    workers: Option<usize>,
    output: &Output,
) -> Result<()> {
    if let Some(workers) = workers {
        config.dispatcher.workers = workers;
    }
    config.validate()?;

    output.banner();
    output.kv("Base model", &config.base_model);
    output.kv("Engine", &config.engine.base_url);
    output.kv("Workers", &config.dispatcher.workers.to_string());
    output.kv("Agents", &config.agents.keys().cloned().collect::<Vec<_>>().join(", "));

    if config.queue.backend == QueueBackend::Memory {
        output.warning("Memory queue: only this process can submit jobs");
    }

    let engines = Arc::new(OpenAiCompatibleEngineFactory::new(
        config.engine.clone(),
        config.base_model.clone(),
    ));
    let providers = Arc::new(ProviderRegistry::from_config(&config)?);
    let dispatcher = Dispatcher::from_config(&config, engines, providers).await?;

    output.success("Dispatcher running, press Ctrl+C to stop");
    dispatcher
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    output.success("Dispatcher stopped");
    Ok(())
}

async fn submit(
    config: &SwitchboardConfig,
    request: JobRequest,
    no_wait: bool,
    output: &Output,
) -> Result<()> {
    if config.queue.backend == QueueBackend::Memory {
        bail!("submit needs a shared queue; set [queue] backend = \"sqlite\"");
    }

    let (queue, results) = queue::open(config).await?;
    let client = job_client(config, queue, results);

    let job_id = client.submit(request).await?;
    if no_wait {
        println!("{}", job_id);
        return Ok(());
    }

    output.info(&format!("Queued job {}", job_id));
    let result = client.await_result(&job_id, config.queue.timeout()).await?;
    output.job_result(&result);
    if !result.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

/// Interactive session against an in-process dispatcher on a memory queue
async fn chat(config: SwitchboardConfig, model: &str, output: &Output) -> Result<()> {
    config.validate()?;

    let queue = Arc::new(MemoryQueue::new());
    let results = Arc::new(MemoryResultStore::new());
    let engines = Arc::new(OpenAiCompatibleEngineFactory::new(
        config.engine.clone(),
        config.base_model.clone(),
    ));
    let providers = Arc::new(ProviderRegistry::from_config(&config)?);
    let ctx = WorkerContext::from_config(&config, engines, providers)?;
    let dispatcher = Dispatcher::new(
        queue.clone(),
        results.clone(),
        Arc::new(ctx),
        &config.dispatcher,
    );

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(dispatcher.run(async move {
        stopped.await.ok();
    }));
    let client = job_client(&config, queue, results);

    output.banner();
    output.hint("Type 'exit' to quit");

    let mut local_history = String::new();
    let mut provider_history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(output.prompt().as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        let mut request = new_request(&config, query.to_string(), model)?;
        request.chat_history_for_local = local_history.clone();
        request.chat_history_for_providers = provider_history.clone();

        match client.ask(request, config.queue.timeout()).await {
            Ok(result) => {
                output.job_result(&result);
                if result.is_complete() {
                    local_history.push_str(&format!("User: {}\nAgent: {}\n", query, result.response));
                    provider_history.push(ChatMessage::user(query));
                    provider_history.push(ChatMessage {
                        role: Role::Agent,
                        content: result.response,
                    });
                }
            }
            Err(e) => output.error(&e.to_string()),
        }
    }

    stop.send(()).ok();
    running.await.context("dispatcher task failed")?;
    Ok(())
}

fn show_agents(config: &SwitchboardConfig, command: AgentCommands, output: &Output) {
    let catalog = AgentCatalog::from_config(config);

    match command {
        AgentCommands::List => {
            output.header("Configured Agents");
            if catalog.is_empty() {
                output.warning("No agents configured");
                return;
            }
            output.table_header(&["Name", "Tools", "Adapter"]);
            for agent in catalog.iter() {
                let adapter = if agent.adapter_path.is_dir() {
                    "present"
                } else {
                    "missing"
                };
                output.table_row(&[
                    &agent.name,
                    &agent.tools_whitelist.len().to_string(),
                    adapter,
                ]);
            }
        }
        AgentCommands::Show { name } => match catalog.get(&name) {
            Some(agent) => {
                output.header(&format!("Agent: {}", agent.display_name()));
                if !agent.description.is_empty() {
                    output.kv("Description", &agent.description);
                }
                output.kv("Persona", &agent.prompt_path.display().to_string());
                output.kv("Adapter", &agent.adapter_path.display().to_string());
                if agent.tools_whitelist.is_empty() {
                    output.kv("Tools", "none");
                } else {
                    output.kv("Tools", "");
                    for tool in &agent.tools_whitelist {
                        output.list_item(tool);
                    }
                }
            }
            None => {
                output.error(&format!("Agent '{}' not found", name));
                output.hint("Run 'switchboard agents list' to see configured agents");
            }
        },
    }
}

fn show_config(
    path: &std::path::Path,
    config: &SwitchboardConfig,
    validate: bool,
    output: &Output,
) -> Result<()> {
    output.header("Configuration");
    output.kv("File", &path.display().to_string());
    output.kv("Base model", &config.base_model);
    output.kv("Engine", &config.engine.base_url);
    output.kv("Router adapter", &config.resolve(&config.router.model_path).display().to_string());
    output.kv("Agents", &config.agents.len().to_string());
    output.kv("Providers", &config.providers.len().to_string());
    output.kv("Tools", &config.tool_registry().tool_names().join(", "));
    output.kv("Workers", &config.dispatcher.workers.to_string());
    output.kv("Queue", &format!("{:?}", config.queue.backend).to_lowercase());
    output.kv("Max queue length", &config.queue.max_queue_length.to_string());

    if validate {
        match config.validate() {
            Ok(()) => output.success("Configuration is valid"),
            Err(e) => {
                output.error(&e.to_string());
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
