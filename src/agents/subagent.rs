//! Tool-calling loop for a single agent
//!
//! ```text
//! LOADING ──► GENERATING ──► (no tool call) ──► DONE
//!                 ▲   │
//!                 │   └──► TOOL_CALLED ──► observation appended
//!                 └────────────┘
//! budget spent ──► EXHAUSTED
//! ```
//!
//! The agent's adapter is leased in LOADING and released on every exit.

use crate::agents::AgentDefinition;
use crate::engine::{AdapterLease, EngineState, GenerationOptions, GenerationRequest};
use crate::tools::{parse_tool_call, ToolCall, ToolRegistry};
use crate::types::Result;
use crate::utils::toml_config::SubagentConfig;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const PROMPT_NOT_FOUND: &str = "Error: Prompt file not found.";

pub const EXHAUSTED_MESSAGE: &str =
    "The agent could not determine a final answer after using its tools.";

const FOLLOW_UP_PROMPT: &str =
    "Now, provide a final answer to the user based on the tool's result. Initial Question to Answer:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Loading,
    Generating,
    ToolCalled,
    Done,
    Exhausted,
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// A generation without a tool call produced the answer
    Done,
    /// The loop budget ran out
    Exhausted,
    /// The persona file could not be read
    PromptMissing,
}

/// Record of a tool call made during the loop
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    /// Name of the tool
    pub name: String,
    /// Call text as the model wrote it
    pub call: String,
    /// Observation fed back to the model
    pub result: String,
    /// Whether the tool ran and returned normally
    pub success: bool,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubagentResponse {
    pub content: String,
    pub outcome: LoopOutcome,
    /// Number of generation calls made
    pub iterations: usize,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Instructions telling the model when and how it may call its tools.
///
/// Empty when the agent has no tools.
pub fn tool_policy(whitelist: &[String], registry: &ToolRegistry) -> String {
    if whitelist.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "You are ONLY allowed to call a tool if ALL the following conditions are met:".to_string(),
        "1. You are 100% certain you HAVE TO USE the tool and it will provide the correct and needed information.".to_string(),
        "2. The tool is currently available (from the provided list).".to_string(),
        "3. You only use tools when absolutely necessary, and rely on your own knowledge when appropriate.".to_string(),
        "To call a tool, respond ONLY with the tool function call, wrapped **exactly** like this:".to_string(),
        "<tool_code>tool_function(arguments)</tool_code>".to_string(),
        "Do not include any extra explanation or response outside the <tool_code> tags.".to_string(),
        "Example:".to_string(),
        "<tool_code>get_current_date()</tool_code>".to_string(),
        "Now, here are the available tools you may call:".to_string(),
        "\nAvailable Tools:".to_string(),
    ];
    lines.extend(
        whitelist
            .iter()
            .filter_map(|name| registry.schema(name))
            .map(|schema| format!("- {}", schema)),
    );
    lines.push(
        "Always remember: if you're not absolutely certain a tool is required **and available**, do not call it. Once a tool has been called, you must not call it again."
            .to_string(),
    );
    lines.join("\n")
}

/// Answer `query` as `agent`, calling tools as the model asks for them.
///
/// Policy outcomes (missing persona, tool failures, exhausted budget) come back
/// as text in [`SubagentResponse::content`]. Only engine failures are `Err`.
pub async fn run(
    engine: &mut EngineState,
    agent: &AgentDefinition,
    query: &str,
    history: &str,
    tools: &ToolRegistry,
    settings: &SubagentConfig,
    options: &GenerationOptions,
) -> Result<SubagentResponse> {
    debug!(agent = %agent.name, state = ?LoopState::Loading, "Subagent state");
    let mut lease = engine.lease(&agent.name, &agent.adapter_path).await;

    let Some(persona) = load_persona(agent).await else {
        warn!(agent = %agent.name, path = %agent.prompt_path.display(), "Persona file not found");
        lease.release().await;
        return Ok(SubagentResponse {
            content: PROMPT_NOT_FOUND.to_string(),
            outcome: LoopOutcome::PromptMissing,
            iterations: 0,
            tool_calls: Vec::new(),
        });
    };

    let context = format!("{}\n{}", persona, tool_policy(&agent.tools_whitelist, tools));
    let response = drive(&mut lease, agent, context, query, history, tools, settings, options).await;
    lease.release().await;
    response
}

async fn load_persona(agent: &AgentDefinition) -> Option<String> {
    for candidate in agent.prompt_candidates() {
        match tokio::fs::read_to_string(candidate).await {
            Ok(text) => return Some(text.trim().to_string()),
            Err(e) => debug!(path = %candidate.display(), error = %e, "Persona candidate unreadable"),
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    lease: &mut AdapterLease<'_>,
    agent: &AgentDefinition,
    mut context: String,
    query: &str,
    history: &str,
    tools: &ToolRegistry,
    settings: &SubagentConfig,
    options: &GenerationOptions,
) -> Result<SubagentResponse> {
    let mut prompt = query.to_string();
    let mut tool_calls: Vec<ToolCallRecord> = Vec::new();

    for iteration in 1..=settings.max_loops {
        debug!(agent = %agent.name, iteration, state = ?LoopState::Generating, "Subagent state");
        let request = GenerationRequest::new(prompt.as_str())
            .with_system(context.as_str())
            .with_history(history);
        let output = lease.generate(&request, options).await?;

        let Some(call) = parse_tool_call(&output) else {
            debug!(agent = %agent.name, iteration, state = ?LoopState::Done, "Subagent state");
            return Ok(SubagentResponse {
                content: output,
                outcome: LoopOutcome::Done,
                iterations: iteration,
                tool_calls,
            });
        };

        debug!(agent = %agent.name, tool = %call.tool_name, state = ?LoopState::ToolCalled, "Subagent state");
        let record = invoke(agent, &call, tools, settings, &tool_calls).await;
        context.push_str(&format!(
            "\nObservation: <tool_called>{}</tool_called>\n <tool_result>{}</tool_result>",
            call.raw, record.result
        ));
        tool_calls.push(record);
        prompt = format!("{} {}", FOLLOW_UP_PROMPT, query);
    }

    info!(agent = %agent.name, max_loops = settings.max_loops, state = ?LoopState::Exhausted, "Tool loop budget exhausted");
    Ok(SubagentResponse {
        content: EXHAUSTED_MESSAGE.to_string(),
        outcome: LoopOutcome::Exhausted,
        iterations: settings.max_loops,
        tool_calls,
    })
}

/// Run one tool call, turning every failure into observation text
async fn invoke(
    agent: &AgentDefinition,
    call: &ToolCall,
    tools: &ToolRegistry,
    settings: &SubagentConfig,
    previous: &[ToolCallRecord],
) -> ToolCallRecord {
    let started = Instant::now();
    let name = call.tool_name.as_str();

    let (result, success) = if !agent.allows_tool(name) {
        (format!("Error: You are not permitted to use the tool '{}'.", name), false)
    } else if settings.forbid_repeat_tool_calls && previous.iter().any(|r| r.name == name) {
        (
            format!("Error: The tool '{}' was already called and may not be called again.", name),
            false,
        )
    } else if let Some(tool) = tools.get(name) {
        match AssertUnwindSafe(tool.call(&call.positional_args))
            .catch_unwind()
            .await
        {
            Ok(Ok(text)) => (text, true),
            Ok(Err(e)) => (format!("Error executing tool '{}': {}", call.raw, e), false),
            Err(_) => (
                format!("Error executing tool '{}': tool panicked", call.raw),
                false,
            ),
        }
    } else {
        (format!("Error: Tool '{}' not found.", name), false)
    };

    if !success {
        warn!(agent = %agent.name, tool = name, result = %result, "Tool call failed");
    }

    ToolCallRecord {
        name: name.to_string(),
        call: call.raw.clone(),
        result,
        success,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
