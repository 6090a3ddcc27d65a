use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use tally_core::RawTable;
use tally_enrich::{Enrichment, FileColumns, OpenRouterEnrichment};
use tally_recon::{
    reconcile, ReconcileConfig, ReconciliationReport, DEPOSIT_SOURCE, WITHDRAW_SOURCE,
};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Reconcile deposit/withdraw ledgers against payment channel statements")]
#[command(version)]
struct Cli {
    /// Deposit ledger CSV
    #[arg(long)]
    deposit: Option<PathBuf>,

    /// Withdraw ledger CSV
    #[arg(long)]
    withdraw: Option<PathBuf>,

    /// Channel statement as NAME=FILE (repeatable)
    #[arg(long = "channel", value_name = "NAME=FILE")]
    channels: Vec<String>,

    /// Reconciliation config (TOML); built-in defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// On unresolvable columns, ask the enrichment service for new aliases
    /// and reconcile once more with the merged mapping
    #[arg(long)]
    adapt: bool,

    /// Ask the enrichment service for a narrative analysis of the report
    #[arg(long)]
    analyze: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ReconcileConfig::default().to_toml()?);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ReconcileConfig::from_toml(&text)?
        }
        None => ReconcileConfig::default(),
    };

    if cli.deposit.is_none() && cli.withdraw.is_none() {
        bail!("at least one of --deposit or --withdraw is required");
    }
    if cli.channels.is_empty() {
        bail!("at least one --channel NAME=FILE is required");
    }

    let deposit = load_table(cli.deposit.as_deref())?;
    let withdraw = load_table(cli.withdraw.as_deref())?;

    let mut channels = Vec::with_capacity(cli.channels.len());
    for spec in &cli.channels {
        let Some((name, path)) = spec.split_once('=') else {
            bail!("--channel expects NAME=FILE, got '{spec}'");
        };
        let table = tally_import::decode_path(Path::new(path))
            .with_context(|| format!("decoding channel file {path}"))?;
        channels.push((name.to_string(), table));
    }

    let mut report = reconcile(deposit.clone(), withdraw.clone(), channels.clone(), &config)?;

    if cli.adapt && report.needs_adaptation {
        if let Some(adapted) =
            adapt(&report, &deposit, &withdraw, &channels, &config).await?
        {
            report = adapted;
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    if cli.analyze {
        analyze(&report).await;
    }

    Ok(())
}

fn load_table(path: Option<&Path>) -> Result<RawTable> {
    match path {
        Some(path) => tally_import::decode_path(path)
            .with_context(|| format!("decoding {}", path.display())),
        None => Ok(RawTable::empty()),
    }
}

fn enrichment_service() -> Option<OpenRouterEnrichment> {
    let key = std::env::var("OPENROUTER_API_KEY")
        .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
        .ok()?;
    let mut service = OpenRouterEnrichment::new(key);
    if let Ok(model) = std::env::var("TALLY_LLM_MODEL") {
        service = service.with_model(model);
    }
    if let Ok(base_url) = std::env::var("TALLY_LLM_BASE_URL") {
        service = service.with_base_url(base_url);
    }
    Some(service)
}

/// Asks the enrichment service for aliases covering the unresolved files,
/// then reconciles once more with the merged mapping. Returns `None` when
/// the service is unavailable or has nothing to suggest.
async fn adapt(
    report: &ReconciliationReport,
    deposit: &RawTable,
    withdraw: &RawTable,
    channels: &[(String, RawTable)],
    config: &ReconcileConfig,
) -> Result<Option<ReconciliationReport>> {
    let Some(service) = enrichment_service() else {
        tracing::warn!("adaptation requested but no OPENROUTER_API_KEY/ANTHROPIC_API_KEY set");
        return Ok(None);
    };

    let headers_of = |source: &str| -> Option<Vec<String>> {
        match source {
            DEPOSIT_SOURCE => Some(deposit.headers.clone()),
            WITHDRAW_SOURCE => Some(withdraw.headers.clone()),
            name => channels
                .iter()
                .find(|(channel, _)| channel == name)
                .map(|(_, table)| table.headers.clone()),
        }
    };
    let files: Vec<FileColumns> = report
        .diagnostics
        .needs_adaptation_sources
        .iter()
        .filter_map(|source| {
            headers_of(source).map(|headers| FileColumns { source: source.clone(), headers })
        })
        .collect();

    match service.suggest_mapping(&files).await {
        Ok(Some(suggestion)) => {
            for change in &suggestion.changes {
                tracing::info!(change = change.as_str(), "applying mapping suggestion");
            }
            let merged = suggestion.apply(config);
            let adapted =
                reconcile(deposit.clone(), withdraw.clone(), channels.to_vec(), &merged)?;
            Ok(Some(adapted))
        }
        Ok(None) => {
            tracing::info!("enrichment service had no mapping suggestions");
            Ok(None)
        }
        Err(error) => {
            tracing::warn!(%error, "adaptation unavailable");
            Ok(None)
        }
    }
}

/// Best-effort narrative; any failure degrades to a warning so the report
/// itself is never lost.
async fn analyze(report: &ReconciliationReport) {
    let Some(service) = enrichment_service() else {
        tracing::warn!("analysis requested but no OPENROUTER_API_KEY/ANTHROPIC_API_KEY set");
        return;
    };
    match service.narrative(report).await {
        Ok(text) => eprintln!("\n{text}"),
        Err(error) => tracing::warn!(%error, "analysis unavailable"),
    }
}
