use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use tally_recon::{CanonicalField, ReconciliationReport};

use crate::{EnrichError, Enrichment, FileColumns, MappingSuggestion};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.5";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenRouterEnrichment {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterEnrichment {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn chat(&self, prompt: &str, max_tokens: u32) -> Result<String, EnrichError> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
        });
        tracing::debug!(model = self.model.as_str(), "sending chat completion request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| EnrichError::BadResponse("no choices in completion".to_string()))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl Enrichment for OpenRouterEnrichment {
    async fn narrative(&self, report: &ReconciliationReport) -> Result<String, EnrichError> {
        self.chat(&narrative_prompt(report), 2000).await
    }

    async fn suggest_mapping(
        &self,
        files: &[FileColumns],
    ) -> Result<Option<MappingSuggestion>, EnrichError> {
        let reply = self.chat(&mapping_prompt(files), 1500).await?;
        Ok(extract_suggestion(&reply))
    }
}

fn narrative_prompt(report: &ReconciliationReport) -> String {
    let deposit = &report.summary.total_deposit;
    let withdraw = &report.summary.total_withdraw;
    format!(
        "Review this payment reconciliation result and give a short professional \
         assessment.\n\n\
         Deposits: {} records, {} matched, total {}, matched amount {}\n\
         Withdrawals: {} records, {} matched, total {}, matched amount {}\n\n\
         Anomalies: {} amount mismatches, {} missing in channel, {} missing in \
         ledger, {} duplicates.\n\n\
         Cover: the main problems, likely causes, suggested follow-up, and risk \
         level. Be concise.",
        deposit.count,
        deposit.matched,
        deposit.amount,
        deposit.matched_amount,
        withdraw.count,
        withdraw.matched,
        withdraw.amount,
        withdraw.matched_amount,
        report.mismatched.len(),
        report.missing_in_channel.len(),
        report.missing_in_ledger.len(),
        report.duplicates.len(),
    )
}

fn mapping_prompt(files: &[FileColumns]) -> String {
    let fields: Vec<&str> = CanonicalField::ALL.iter().map(|f| f.name()).collect();
    let mut listing = String::new();
    for file in files {
        listing.push_str(&format!("{}: {:?}\n", file.source, file.headers));
    }
    format!(
        "You are configuring a payment reconciliation system. Its canonical \
         record fields are: {}.\n\n\
         These uploaded files could not be mapped; their column headers are:\n\
         {}\n\
         Propose column aliases so each file resolves. Reply with JSON only, in \
         the form:\n\
         {{\"changes\": [\"<human-readable change>\"], \
         \"aliases\": {{\"<canonical field>\": [\"<header>\"]}}}}\n\
         If nothing needs to change, reply {{}}.",
        fields.join(", "),
        listing,
    )
}

/// Pulls the first JSON object out of a chat reply that may wrap it in prose
/// or code fences.
fn extract_suggestion(reply: &str) -> Option<MappingSuggestion> {
    let re = Regex::new(r"(?s)\{.*\}").ok()?;
    let text = re.find(reply)?.as_str();
    match serde_json::from_str::<MappingSuggestion>(text) {
        Ok(suggestion) if !suggestion.aliases.is_empty() => Some(suggestion),
        Ok(_) => None,
        Err(error) => {
            tracing::debug!(%error, "suggestion reply was not valid JSON");
            None
        }
    }
}
