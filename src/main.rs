use anyhow::Context;
use clap::{Parser, Subcommand};
use log_anomaly_labeler::{
    config::Config,
    dataset::TextSample,
    error::AppError,
    ingest::{common_keys, read_records, InputFormat},
    labeling::{LabelExplanation, LabeledBatch, LabelingPipeline, MissingFieldPolicy},
    metrics::{gather_metrics, init_metrics},
    ml::{classification_report, format_confusion_matrix, ExperimentRunner, ModelType},
    models::{RawRecord, SeverityLabel},
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "log-anomaly-labeler", version)]
#[command(about = "Label system logs by anomaly severity and train classifiers on the labels", long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, global = true, env = "LOG_ANOMALY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// What to do with records missing a mandatory field
    #[arg(long, global = true, value_enum)]
    on_missing_field: Option<MissingFieldPolicy>,

    /// Write Prometheus metrics in text format to this file on exit
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    /// Input layout
    #[arg(long, global = true, value_enum, default_value_t = InputFormat::Auto)]
    format: InputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count records and list the keys every record carries
    Inspect {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Label a batch of records
    Label {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Write labeled records as JSON lines
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include the keywords behind each label
        #[arg(short, long)]
        explain: bool,
    },

    /// Label a batch, then train and evaluate classifiers on it
    Train {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Models to train (rf, lr, gb); defaults to those enabled in configuration
        #[arg(short, long, value_delimiter = ',')]
        models: Option<Vec<ModelType>>,

        /// Write the experiment report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// One line of `label --output`
#[derive(Serialize)]
struct LabelOutput<'a> {
    index: usize,
    priority: u8,
    transport: &'a str,
    scope: &'a str,
    boot_id: &'a str,
    message: &'a str,
    label: usize,
    label_name: &'static str,
    features: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<LabelExplanation>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .chain()
                .find_map(|e| e.downcast_ref::<AppError>())
                .map(|e| e.exit_code())
                .unwrap_or(1);
            tracing::error!(exit_code = code, "{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(policy) = cli.on_missing_field {
        config.pipeline.on_missing_field = policy;
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    if cli.json_logs {
        config.observability.json_logs = true;
    }

    init_tracing(&config);
    init_metrics().context("Failed to initialize metrics")?;

    info!("Starting log-anomaly-labeler v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Inspect { input } => inspect(input, cli.format).await?,
        Commands::Label {
            input,
            output,
            explain,
        } => label(&config, input, cli.format, output.as_deref(), *explain).await?,
        Commands::Train {
            input,
            models,
            report,
        } => train(&config, input, cli.format, models.clone(), report.as_deref()).await?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    if let Some(path) = &cli.metrics_out {
        tokio::fs::write(path, gather_metrics())
            .await
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Wrote metrics");
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("log_anomaly_labeler={}", config.observability.log_level).into()
    });
    let json = config.observability.json_logs;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn load(input: &Path, format: InputFormat) -> anyhow::Result<Vec<RawRecord>> {
    read_records(input, format)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))
}

/// Run the pipeline off the async runtime, handing the inputs back
async fn label_batch(
    pipeline: LabelingPipeline,
    records: Vec<RawRecord>,
) -> anyhow::Result<(LabeledBatch, Vec<RawRecord>, LabelingPipeline)> {
    let (batch, records, pipeline) = tokio::task::spawn_blocking(move || {
        let batch = pipeline.run(&records);
        (batch, records, pipeline)
    })
    .await
    .context("Labeling task failed")?;
    Ok((batch?, records, pipeline))
}

async fn inspect(input: &Path, format: InputFormat) -> anyhow::Result<()> {
    let records = load(input, format).await?;
    let keys = common_keys(&records);

    println!("Records: {}", records.len());
    println!("Keys present in every record ({}):", keys.len());
    for key in keys {
        println!("  {}", key);
    }
    Ok(())
}

async fn label(
    config: &Config,
    input: &Path,
    format: InputFormat,
    output: Option<&Path>,
    explain: bool,
) -> anyhow::Result<()> {
    let records = load(input, format).await?;
    let (batch, records, pipeline) = label_batch(config.pipeline()?, records).await?;

    print_summary(&batch);

    if output.is_none() && !explain {
        return Ok(());
    }

    let mut lines = String::new();
    for labeled in &batch.records {
        let explanation = if explain {
            Some(pipeline.explain_one(labeled.index, &records[labeled.index])?)
        } else {
            None
        };
        let line = LabelOutput {
            index: labeled.index,
            priority: labeled.record.priority,
            transport: &labeled.record.transport,
            scope: &labeled.record.scope,
            boot_id: &labeled.record.boot_id,
            message: &labeled.record.message,
            label: labeled.label.index(),
            label_name: labeled.label.name(),
            features: &labeled.features,
            explanation,
        };
        lines.push_str(&serde_json::to_string(&line)?);
        lines.push('\n');
    }

    match output {
        Some(path) => {
            tokio::fs::write(path, lines)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), records = batch.len(), "Wrote labeled records");
        }
        None => print!("{}", lines),
    }
    Ok(())
}

async fn train(
    config: &Config,
    input: &Path,
    format: InputFormat,
    models: Option<Vec<ModelType>>,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let records = load(input, format).await?;
    let (batch, _, _) = label_batch(config.pipeline()?, records).await?;
    print_summary(&batch);

    let samples: Vec<TextSample> = Vec::from(&batch);
    let models = match models {
        Some(mut models) => {
            let mut seen = HashSet::new();
            models.retain(|m| seen.insert(*m));
            models
        }
        None => config.models.enabled(),
    };

    let runner = ExperimentRunner::new(config.experiment_config());
    let outcome = runner.run(&samples, &models).await?;
    let report = &outcome.report;

    println!();
    println!(
        "Dataset: {} train ({} after oversampling), {} test",
        report.dataset.n_train, report.dataset.n_train_resampled, report.dataset.n_test
    );
    for model in &report.models {
        println!();
        println!("== {} ==", model.model_type);
        println!("Accuracy: {:.2}", model.metrics.accuracy);
        print!("{}", classification_report(&model.metrics));
        println!();
        print!("{}", format_confusion_matrix(&model.metrics.confusion_matrix));
    }

    println!();
    print!("{}", report.comparison_table());
    if let Some(best) = report.best_model() {
        println!("Best model by weighted F1: {}", best.model_type);
    }

    if let Some(path) = report_path {
        tokio::fs::write(path, report.to_json()?)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), run_id = %report.run_id, "Wrote experiment report");
    }
    Ok(())
}

fn print_summary(batch: &LabeledBatch) {
    let summary = &batch.summary;
    println!(
        "Labeled {} of {} records ({} skipped) in {} ms",
        summary.records_labeled, summary.records_seen, summary.records_skipped, summary.duration_ms
    );
    for label in SeverityLabel::all() {
        println!("  {:<15} {}", label.name(), summary.distribution.count(label));
    }
    if summary.records_skipped > 0 {
        warn!(skipped = summary.records_skipped, "Some records were skipped");
    }
}
