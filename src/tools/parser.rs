//! Parser for tool calls embedded in model output.
//!
//! Model output is untrusted. The accepted grammar is deliberately small:
//!
//! ```text
//! <tool_code>name(key=value, key='quoted value', ...)</tool_code>
//! ```
//!
//! Only the first wrapper is considered. Anything that does not fit the grammar
//! is reported as "no tool call" rather than an error.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static TOOL_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_code>(.*?)</tool_code>").expect("tool_code pattern is valid")
});

/// A scalar argument after coercion
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArg {
    Number(f64),
    Text(String),
}

impl ToolArg {
    /// Coerce a raw token: numbers become `Number`, everything else stays text.
    pub fn coerce(token: &str) -> Self {
        match token.trim().parse::<f64>() {
            Ok(n) => ToolArg::Number(n),
            Err(_) => ToolArg::Text(token.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ToolArg::Number(n) => Some(*n),
            ToolArg::Text(_) => None,
        }
    }
}

impl fmt::Display for ToolArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolArg::Number(n) => write!(f, "{:?}", n),
            ToolArg::Text(s) => f.write_str(s),
        }
    }
}

/// A tool invocation extracted from one generation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    pub positional_args: Vec<ToolArg>,
    /// The text between the wrapper tags, echoed back in observations
    pub raw: String,
}

/// Extract the first tool call from `output`, if there is a well-formed one.
pub fn parse_tool_call(output: &str) -> Option<ToolCall> {
    let raw = TOOL_CODE.captures(output)?.get(1)?.as_str().trim();

    let (name, args) = match raw.find('(') {
        Some(open) => {
            let rest = raw[open + 1..].strip_suffix(')')?;
            (raw[..open].trim(), rest)
        }
        None => (raw, ""),
    };

    if !is_identifier(name) {
        return None;
    }

    let positional_args = split_args(args)?
        .into_iter()
        .map(|piece| ToolArg::coerce(&unquote(value_of(&piece))))
        .collect();

    Some(ToolCall {
        tool_name: name.to_string(),
        positional_args,
        raw: raw.to_string(),
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split on top-level commas, honoring single and double quotes.
/// Returns `None` on an unterminated quote.
fn split_args(args: &str) -> Option<Vec<String>> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in args.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, ',') => pieces.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() {
        return None;
    }
    pieces.push(current);

    Some(
        pieces
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
    )
}

/// `key=value` yields `value`; a bare token is taken as the value itself.
fn value_of(piece: &str) -> &str {
    match piece.split_once('=') {
        Some((key, value)) if is_identifier(key.trim()) => value.trim(),
        _ => piece,
    }
}

fn unquote(value: &str) -> String {
    value.trim_matches(|c| c == '\'' || c == '"').to_string()
}
