//! Pre- and post-generation content gates.
//!
//! Both predicates return `false` when their rule set is disabled, so callers
//! only need to check the per-user feature flag.

use crate::types::{AppError, Result};
use crate::utils::toml_config::SafetyConfig;
use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct SafetyDetector {
    pii_patterns: Vec<(String, Regex)>,
    danger_keywords: Vec<String>,
}

impl SafetyDetector {
    pub fn from_config(config: &SafetyConfig) -> Result<Self> {
        let pii_patterns = if config.force_local_on_pii.enabled {
            config
                .force_local_on_pii
                .patterns
                .iter()
                .map(|p| {
                    Regex::new(&p.regex)
                        .map(|re| (p.name.clone(), re))
                        .map_err(|e| {
                            AppError::Configuration(format!("invalid PII pattern '{}': {}", p.name, e))
                        })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let danger_keywords = if config.block_on_dangerous_content.enabled {
            config
                .block_on_dangerous_content
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            pii_patterns,
            danger_keywords,
        })
    }

    pub fn contains_pii(&self, text: &str) -> bool {
        match self.pii_patterns.iter().find(|(_, re)| re.is_match(text)) {
            Some((name, _)) => {
                tracing::info!(pattern = %name, "PII detected");
                true
            }
            None => false,
        }
    }

    pub fn contains_dangerous_content(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.danger_keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}
