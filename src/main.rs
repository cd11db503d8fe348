use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use nerv_core::ids::DocumentId;
use nerv_engine::{
    AudienceProfile, EnrichmentPipeline, RelevanceEvaluator, SummarizationConfig,
    SummarizationOrchestrator,
};
use nerv_llm::GenerationClient;
use nerv_settings::{LoggingSettings, NervSettings, SummarizationSettings};
use nerv_store::{Database, DocumentRepo, EvaluationRepo, SynthesisRepo, SynthesisStore};
use nerv_telemetry::{init_telemetry, TelemetryConfig};

/// Structured enrichment and periodic synthesis of ingested documents.
///
/// Each invocation performs one run; scheduling is left to the caller.
#[derive(Parser)]
#[command(name = "nerv", version, about)]
struct Cli {
    /// Settings file (defaults to $NERV_SETTINGS or ~/.nerv/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Annotate documents. Without --ids, picks up pending documents.
    Enrich {
        #[arg(long, value_delimiter = ',')]
        ids: Vec<DocumentId>,
        /// Maximum pending documents to pick up when no ids are given.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Run one summarization cycle ending now.
    Summarize,
    /// Rate the latest completed synthesis against the configured profile.
    Evaluate,
    /// Send a short probe to the generation backend.
    Ping {
        prompt: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => nerv_settings::load_settings_from_path(path),
        None => nerv_settings::load_settings(),
    }
    .context("failed to load settings")?;

    let telemetry = init_telemetry(telemetry_config(&settings.logging));
    let client = Arc::new(GenerationClient::new(settings.llm.runtime_config()));

    if let Command::Ping { prompt } = &cli.command {
        let reply = client
            .ping(prompt.as_deref())
            .await
            .context("backend probe failed")?;
        println!("{reply}");
        return Ok(());
    }

    let db = Database::open(Path::new(&settings.database.path)).context("failed to open database")?;
    info!(path = %db.path().display(), model = %settings.llm.model, "nerv starting");

    match cli.command {
        Command::Enrich { ids, limit } => {
            let documents = Arc::new(DocumentRepo::new(db));
            let ids = if ids.is_empty() {
                documents.pending_ids(limit)?
            } else {
                ids
            };
            let pipeline = EnrichmentPipeline::new(client, documents, telemetry.metrics());
            let result = pipeline.enrich(&ids).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Summarize => {
            let orchestrator = SummarizationOrchestrator::new(
                client,
                Arc::new(DocumentRepo::new(db.clone())),
                Arc::new(SynthesisRepo::new(db)),
                telemetry.metrics(),
                summarization_config(&settings.summarization),
            )?;
            let outcome = orchestrator.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Evaluate => {
            let profile = audience_profile(&settings)?;
            let Some(record) = SynthesisRepo::new(db.clone()).last_completed_synthesis()? else {
                bail!("no completed synthesis to evaluate");
            };
            let evaluator = RelevanceEvaluator::new(client, Arc::new(EvaluationRepo::new(db)));
            let evaluation = evaluator.evaluate(&record, &profile).await?;
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }
        Command::Ping { .. } => {}
    }
    Ok(())
}

fn telemetry_config(logging: &LoggingSettings) -> TelemetryConfig {
    let level = |name: &str| name.parse::<Level>().unwrap_or(Level::INFO);
    TelemetryConfig {
        log_level: level(logging.level.as_filter_str()),
        module_levels: logging
            .module_levels
            .iter()
            .map(|(module, lvl)| (module.clone(), level(lvl.as_filter_str())))
            .collect(),
        json: logging.json,
    }
}

fn summarization_config(settings: &SummarizationSettings) -> SummarizationConfig {
    let interval = i64::try_from(settings.interval_seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(|| chrono::Duration::weeks(1));
    SummarizationConfig {
        interval,
        context_window_chars: settings.context_window_chars,
        max_iterations: settings.max_iterations,
        historical_days: settings.historical_days,
        max_recent_documents: settings.max_recent_documents,
        max_historical_per_topic: settings.max_historical_per_topic,
    }
}

fn audience_profile(settings: &NervSettings) -> anyhow::Result<AudienceProfile> {
    match &settings.profile {
        Some(profile) => Ok(AudienceProfile {
            title: profile.title.clone(),
            content: profile.content.clone(),
        }),
        None => bail!("no audience profile configured; set `profile` in the settings file"),
    }
}
