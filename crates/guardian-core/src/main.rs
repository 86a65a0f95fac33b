//! `guardian`: score a CSV file's data quality and flag anomalous rows.

use anyhow::{Context, Result, bail};
use clap::Parser;
use dotenv::dotenv;
use guardian_core::types::DetectorOutcome;
use guardian_core::{
    AnalysisConfig, AnalysisConfigBuilder, ExplanationStatus, Guardian, GuardianReport,
    ReportWriter,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Rows used for CSV schema inference on the first read attempt.
const SCHEMA_SAMPLE_ROWS: usize = 100;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Data quality scoring and anomaly detection for CSV datasets",
    long_about = "Scores a dataset on completeness, consistency, accuracy and uniqueness, \
                  then flags anomalous rows with an isolation forest / LOF / one-class SVM \
                  ensemble and explains them.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  ANOMALY_CONTAMINATION    Default expected anomaly fraction (0.1)\n  \
                  RANDOM_STATE             Default isolation forest seed (42)\n\n\
                  EXAMPLES:\n  \
                  guardian -i orders.csv\n  \
                  guardian -i orders.csv --skip-anomalies --json\n  \
                  guardian -i orders.csv --contamination 0.02 -r -o reports"
)]
struct Args {
    /// CSV file to assess
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for `--emit-report`
    #[arg(short, long, default_value = "./outputs")]
    output: PathBuf,

    /// Expected fraction of anomalous rows, in (0, 1)
    #[arg(long)]
    contamination: Option<f64>,

    /// Isolation forest seed
    #[arg(long)]
    seed: Option<u64>,

    /// IQR multiplier for range violations
    #[arg(long)]
    iqr_multiplier: Option<f64>,

    /// Absolute z-score above which a value is an outlier
    #[arg(long)]
    zscore_threshold: Option<f64>,

    /// Score data quality only
    #[arg(long)]
    skip_anomalies: bool,

    /// Do not explain flagged rows
    #[arg(long)]
    no_explain: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Print the full report as JSON on stdout, with logging off
    #[arg(long)]
    json: bool,

    /// Also write <input_stem>_quality_report.json to the output directory
    #[arg(short = 'r', long)]
    emit_report: bool,
}

impl Args {
    /// Environment defaults, overridden by whichever flags were given.
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut builder = AnalysisConfigBuilder::from_env();
        if let Some(contamination) = self.contamination {
            builder = builder.contamination(contamination);
        }
        if let Some(seed) = self.seed {
            builder = builder.random_state(seed);
        }
        if let Some(multiplier) = self.iqr_multiplier {
            builder = builder.iqr_multiplier(multiplier);
        }
        if let Some(threshold) = self.zscore_threshold {
            builder = builder.zscore_threshold(threshold);
        }
        Ok(builder.build()?)
    }
}

/// Logs go to stderr. `--json` installs no subscriber at all.
fn init_logging(args: &Args) {
    if args.json {
        return;
    }
    let level = if args.quiet { "warn" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    // The config builder reads ANOMALY_CONTAMINATION and RANDOM_STATE.
    dotenv().ok();

    if !args.input.is_file() {
        bail!("Input file not found: {}", args.input.display());
    }
    let config = args.analysis_config()?;

    let data = read_dataset(&args.input)?;
    info!(rows = data.height(), columns = data.width(), "Loaded {}", args.input.display());

    let output = Guardian::builder()
        .config(config)
        .anomaly_detection(!args.skip_anomalies)
        .explanations(!args.no_explain)
        .on_progress(|update| {
            debug!(
                "[{:>3.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        })
        .build()?
        .run(&data)
        .context("Assessment failed")?;

    let input = args.input.display().to_string();
    let report = GuardianReport::new(&input, &data, output);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if args.emit_report {
        let stem = args
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        let path = ReportWriter::new(args.output.clone()).write(&report, stem)?;
        info!("Report written to {}", path.display());
    }
    print_summary(&report);
    Ok(())
}

/// Read a CSV with a header row.
///
/// Schema inference first looks at the leading rows only. If a column changes
/// type further down, the file is read again with whole-file inference, and
/// as a last resort after dropping blank lines and collapsing doubled quotes.
fn read_dataset(path: &Path) -> Result<DataFrame> {
    let read = |infer_rows: Option<usize>| {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(infer_rows)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()
    };

    match read(Some(SCHEMA_SAMPLE_ROWS)) {
        Ok(df) => return Ok(df),
        Err(e) => warn!(error = %e, "Sampled schema did not fit; inferring from the whole file"),
    }
    match read(None) {
        Ok(df) => return Ok(df),
        Err(e) => warn!(error = %e, "Whole-file inference failed; retrying on normalized text"),
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let normalized = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.replace("\"\"", "\""))
        .collect::<Vec<_>>()
        .join("\n");
    CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(normalized))
        .finish()
        .with_context(|| format!("Could not parse {} as CSV", path.display()))
}

/// The command's primary output, so it goes to stdout rather than the log.
fn print_summary(report: &GuardianReport) {
    let scores = &report.quality.scores;
    let rule = "=".repeat(80);

    println!("\n{rule}\nDATA QUALITY REPORT\n{rule}\n");
    println!(
        "Input: {} ({} rows x {} columns, {} numeric)",
        report.input_file,
        report.dataset.rows,
        report.dataset.columns,
        report.dataset.numeric_columns
    );
    println!("Duration: {}ms\n", report.duration_ms);

    println!("Quality Scores:");
    for (label, score) in [
        ("Overall", scores.overall),
        ("Completeness", scores.completeness),
        ("Consistency", scores.consistency),
        ("Accuracy", scores.accuracy),
        ("Uniqueness", scores.uniqueness),
    ] {
        println!("  {:<13} {:>6.1}", format!("{label}:"), score);
    }
    println!();

    if let Some(anomalies) = &report.anomalies {
        println!("Anomalies:");
        println!(
            "  {} of {} rows flagged ({:.2}%), threshold {:.4}",
            anomalies.anomaly_count,
            anomalies.scores.len(),
            anomalies.anomaly_percentage,
            anomalies.threshold
        );
        for detector in &anomalies.detectors {
            match &detector.outcome {
                DetectorOutcome::Ok => println!(
                    "  - {} (weight {:.1}): {} rows",
                    detector.detector.name(),
                    detector.weight,
                    detector.anomalies.len()
                ),
                DetectorOutcome::Failed { reason } => {
                    println!("  ! {} failed: {}", detector.detector.name(), reason)
                }
            }
        }
        let top: Vec<String> = anomalies
            .ranked_features()
            .iter()
            .take(3)
            .map(|f| format!("{} ({:.2})", f.feature, f.weight))
            .collect();
        if !top.is_empty() {
            println!("  Top features: {}", top.join(", "));
        }
        println!();
    }

    if let Some(explanation) = &report.explanation {
        match &explanation.status {
            ExplanationStatus::Ok => {
                println!("Explanations ({}):", explanation.explanation_type);
                for row in explanation.rows.iter().take(5) {
                    let drivers: Vec<String> = row
                        .contributions
                        .iter()
                        .take(2)
                        .map(|c| format!("{} {:+.3}", c.feature, c.contribution))
                        .collect();
                    println!("  row {:>6}: score {:.3}, {}", row.row, row.score, drivers.join(", "));
                }
            }
            ExplanationStatus::NoNumericFeatures => {
                println!("Explanations: no numeric features to explain");
            }
            ExplanationStatus::Failed { reason } => {
                println!("Explanations: failed ({})", reason);
            }
        }
        println!();
    }

    if !report.recommendations.is_empty() {
        println!("Recommendations:");
        for rec in &report.recommendations {
            println!("  - {}", rec);
        }
        println!();
    }

    println!("--json prints the full report; --emit-report saves it to the output directory");
    println!("{rule}");
}
