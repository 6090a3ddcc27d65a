//! Optional post-processing for reconciliation reports: a free-text
//! narrative and column-mapping suggestions for files that needed
//! adaptation. The engine never depends on this crate; callers must degrade
//! gracefully when the service is absent or failing.

pub mod openrouter;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tally_recon::{CanonicalField, ReconcileConfig, ReconciliationReport};

pub use openrouter::OpenRouterEnrichment;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    BadResponse(String),
}

/// Header snapshot of one input file, as shown to the suggestion service.
#[derive(Debug, Clone, Serialize)]
pub struct FileColumns {
    pub source: String,
    pub headers: Vec<String>,
}

/// New aliases to merge into the column mapping, keyed by canonical field
/// name. Unknown field names are ignored on apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingSuggestion {
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl MappingSuggestion {
    /// Returns a new configuration with the suggested aliases appended.
    /// The input configuration is left untouched.
    pub fn apply(&self, config: &ReconcileConfig) -> ReconcileConfig {
        let mut merged = config.clone();
        for (name, aliases) in &self.aliases {
            let Some(field) = CanonicalField::ALL
                .iter()
                .copied()
                .find(|f| f.name() == name.as_str())
            else {
                tracing::warn!(field = name.as_str(), "ignoring unknown canonical field");
                continue;
            };
            let target = merged.aliases.for_field_mut(field);
            for alias in aliases {
                if !target.iter().any(|existing| existing == alias) {
                    target.push(alias.clone());
                }
            }
        }
        merged
    }
}

#[async_trait]
pub trait Enrichment {
    /// Free-text analysis of a finished report.
    async fn narrative(&self, report: &ReconciliationReport) -> Result<String, EnrichError>;

    /// Column-mapping suggestions for files whose headers did not resolve.
    /// `Ok(None)` means the service saw nothing to change.
    async fn suggest_mapping(
        &self,
        files: &[FileColumns],
    ) -> Result<Option<MappingSuggestion>, EnrichError>;
}
