use crate::engine::{EngineState, GenerationOptions, GenerationRequest};
use crate::types::Result;
use std::path::Path;
use tracing::{debug, info, warn};

/// Logical adapter name the routing adapter is attached under
pub const ROUTER_ADAPTER_NAME: &str = "router";

/// Build the fixed routing prompt for `query` over the candidate agents
pub fn routing_prompt(query: &str, agents: &[&str]) -> String {
    format!(
        r#"Given the user's query, determine which of the following agents is best suited to respond. If no agent is clearly suitable, select the default agent: general_agent.

The available agents are: [{}].

Respond with ONLY the name of the selected agent in the exact format:
AGENT_NAME

Only replace AGENT_NAME with the chosen agent.

User Query: "{}"
Agent:"#,
        agents.join(", "),
        query
    )
}

/// Parse routing decision from model output
///
/// Text after a closing `</think>` is used when the output carries a reasoning
/// block. Surrounding whitespace and trailing periods are ignored. An exact name
/// wins; otherwise a single case-insensitive match is accepted and mapped back to
/// the configured spelling. Anything else is a miss.
pub fn parse_routing_decision(output: &str, agents: &[&str]) -> Option<String> {
    let answer = match output.split_once("</think>") {
        Some((_, after)) if output.contains("<think>") => after,
        _ => output,
    };
    let answer = answer.trim().trim_end_matches('.').trim();

    if let Some(exact) = agents.iter().find(|a| **a == answer) {
        return Some(exact.to_string());
    }

    let mut folded = agents.iter().filter(|a| a.eq_ignore_ascii_case(answer));
    match (folded.next(), folded.next()) {
        (Some(only), None) => Some(only.to_string()),
        _ => None,
    }
}

/// Choose an agent for `query`, or `None` when the model names none of them.
///
/// The routing adapter is attached for the duration of the single generation
/// call and released afterwards, whatever the outcome.
pub async fn route(
    engine: &mut EngineState,
    query: &str,
    agents: &[&str],
    router_adapter_path: &Path,
    options: &GenerationOptions,
) -> Result<Option<String>> {
    if agents.is_empty() {
        debug!("No candidate agents, skipping router");
        return Ok(None);
    }

    let request = GenerationRequest::new(routing_prompt(query, agents));
    let mut lease = engine.lease(ROUTER_ADAPTER_NAME, router_adapter_path).await;
    if !lease.attached() {
        warn!("Routing with the base model");
    }
    let output = lease.generate(&request, options).await;
    lease.release().await;
    let output = output?;

    match parse_routing_decision(&output, agents) {
        Some(agent) => {
            info!(agent = %agent, "Routed query");
            Ok(Some(agent))
        }
        None => {
            warn!(output = %output, "Router returned no known agent");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const AGENTS: &[&str] = &["teacher", "programmer"];

    #[rstest]
    #[case("teacher", Some("teacher"))]
    #[case("  programmer.\n", Some("programmer"))]
    #[case("Teacher.", Some("teacher"))]
    #[case("<think>The user wants code help.</think>\nprogrammer", Some("programmer"))]
    #[case("<think>maybe teacher</think>", None)]
    #[case("I think maybe teacher", None)]
    #[case("teacher agent", None)]
    #[case("general_agent", None)]
    #[case("", None)]
    fn test_parse_routing_decision(#[case] output: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            parse_routing_decision(output, AGENTS),
            expected.map(str::to_string)
        );
    }

    #[test]
    fn test_closing_tag_without_opening_is_kept_verbatim() {
        assert_eq!(parse_routing_decision("x</think>teacher", AGENTS), None);
    }

    #[test]
    fn test_ambiguous_case_insensitive_match_is_a_miss() {
        let agents = ["Teacher", "teacher"];
        assert_eq!(
            parse_routing_decision("TEACHER", &agents),
            None
        );
        assert_eq!(
            parse_routing_decision("Teacher", &agents),
            Some("Teacher".to_string())
        );
    }

    #[test]
    fn test_routing_prompt_lists_agents_and_query() {
        let prompt = routing_prompt("How do loops work?", AGENTS);
        assert!(prompt.contains("The available agents are: [teacher, programmer]."));
        assert!(prompt.contains("User Query: \"How do loops work?\""));
        assert!(prompt.ends_with("Agent:"));
    }
}
