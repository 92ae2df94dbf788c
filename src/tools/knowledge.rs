//! Keyword search over a plain-text knowledge base.
//!
//! The file is split into passages on blank lines. Passages are ranked by how
//! many distinct query terms they contain; the top matches are returned.

use crate::tools::parser::ToolArg;
use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;

const MAX_PASSAGES: usize = 3;

pub struct KnowledgeBase {
    path: PathBuf,
}

impl KnowledgeBase {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(str::to_lowercase)
            .collect()
    }

    fn search<'a>(content: &'a str, query: &str) -> Vec<&'a str> {
        let wanted = Self::terms(query);
        let mut scored: Vec<(usize, &str)> = content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| (Self::terms(p).intersection(&wanted).count(), p))
            .filter(|(score, _)| *score > 0)
            .collect();
        // stable sort keeps document order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(MAX_PASSAGES)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait]
impl Tool for KnowledgeBase {
    fn name(&self) -> &str {
        "query_knowledge_base"
    }

    fn schema(&self) -> &str {
        "query_knowledge_base(query: str) -> str: Searches the knowledge base for specific topics like 'Quantum Computing' or 'Photosynthesis'."
    }

    async fn call(&self, args: &[ToolArg]) -> Result<String> {
        let query = match args {
            [arg, ..] => arg.to_string(),
            [] => return Err(AppError::Tool("missing query argument".to_string())),
        };

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::Tool(format!(
                "knowledge base '{}' unavailable: {}",
                self.path.display(),
                e
            ))
        })?;

        let passages = Self::search(&content, &query);
        if passages.is_empty() {
            return Ok("No relevant information found in the knowledge base.".to_string());
        }
        Ok(format!(
            "Relevant information from knowledge base:\n{}",
            passages.join("\n---\n")
        ))
    }
}
