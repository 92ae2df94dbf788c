//! Tools an agent may call mid-answer
//!
//! # Module Structure
//!
//! - [`registry`](crate::tools::registry) - name resolution and schema lookup
//! - [`parser`](crate::tools::parser) - extraction of `<tool_code>` calls from model output
//! - [`basic`](crate::tools::basic) - date and simple-interest tools
//! - [`knowledge`](crate::tools::knowledge) - keyword search over a text knowledge base

/// Date and arithmetic tools.
pub mod basic;
/// Knowledge base search tool.
pub mod knowledge;
/// Untrusted tool-call parser.
pub mod parser;
/// Tool registry for managing available tools.
pub mod registry;

pub use parser::{parse_tool_call, ToolArg, ToolCall};
pub use registry::{Tool, ToolRegistry};
