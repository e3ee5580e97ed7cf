//! VeloPredict CLI - Command-line interface for cyclocross race predictions

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use velopredict::data::csv_loader::{
    load_feature_table, load_observations, load_startlist, write_feature_table,
};
use velopredict::data::{FeatureBuilder, FeatureConfig};
use velopredict::validation::{load_predictions, validate, write_predictions, ValidationReport};
use velopredict::{Decision, ModelBundle, PredictionRecord, Predictor, RiderStatus};

#[derive(Parser)]
#[command(name = "velopredict")]
#[command(author, version, about = "Cyclocross race prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show pipeline logs (identity misses, model loading)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the enriched feature table from historical results
    BuildFeatures {
        /// Historical results CSV (one row per rider per race)
        #[arg(short, long)]
        results: PathBuf,

        /// Output path for the enriched feature table
        #[arg(short, long, default_value = "data/features.csv")]
        output: PathBuf,

        /// Optional feature configuration JSON (team roster, thresholds)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Score a startlist against the trained classifiers
    Predict {
        /// Startlist CSV (rider_name, Naam or Name column)
        #[arg(short, long)]
        startlist: PathBuf,

        /// Race category, e.g. "Men Elite" or "Women Elite"
        #[arg(short, long)]
        category: String,

        /// Enriched feature table from build-features
        #[arg(short, long, default_value = "data/features.csv")]
        features: PathBuf,

        /// Directory holding the ONNX classifiers and metadata
        #[arg(short, long, default_value = "models")]
        model_dir: PathBuf,

        /// Top-10 probability cutoff for a positive call
        #[arg(long, default_value = "0.5")]
        threshold: f64,

        /// Demote doubtful starters instead of calling them Top-10
        #[arg(long)]
        dns_filter: bool,

        /// Race date (YYYY-MM-DD, default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Optional feature configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Where to save the prediction file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare a saved prediction file with the actual result
    Validate {
        /// Prediction CSV written by the predict command
        #[arg(short, long)]
        predictions: PathBuf,

        /// Actual results CSV for the race
        #[arg(short, long)]
        results: PathBuf,

        /// Race category the predictions were made for
        #[arg(short, long)]
        category: String,

        /// Optional path to save the report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::INFO } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set log subscriber")?;

    match cli.command {
        Commands::BuildFeatures { results, output, config } => {
            build_features(&results, &output, config.as_deref())?;
        }
        Commands::Predict {
            startlist,
            category,
            features,
            model_dir,
            threshold,
            dns_filter,
            as_of,
            config,
            output,
        } => {
            let as_of = as_of.unwrap_or_else(|| chrono::Local::now().date_naive());
            predict_startlist(
                &startlist,
                &category,
                &features,
                &model_dir,
                threshold,
                dns_filter,
                as_of,
                config.as_deref(),
                output.as_deref(),
            )?;
        }
        Commands::Validate { predictions, results, category, output } => {
            validate_predictions(&predictions, &results, &category, output.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FeatureConfig> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config from {:?}", p))?;
            serde_json::from_str(&raw).with_context(|| format!("Bad config JSON in {:?}", p))
        }
        None => Ok(FeatureConfig::default()),
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb
}

fn build_features(results: &Path, output: &Path, config: Option<&Path>) -> Result<()> {
    println!(
        "{}: {} -> {}",
        "Building features".green(),
        results.display(),
        output.display()
    );

    let config = load_config(config)?;

    let pb = spinner("Loading historical results...");
    let observations = load_observations(results)
        .with_context(|| format!("Failed to load results from {:?}", results))?;
    pb.set_message(format!("Deriving features for {} observations...", observations.len()));

    let builder = FeatureBuilder::new(config);
    let features = builder.build(&observations);

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {:?}", parent))?;
        }
    }
    write_feature_table(output, &observations, &features)
        .with_context(|| format!("Failed to write feature table to {:?}", output))?;
    pb.finish_and_clear();

    let riders = velopredict::RiderHistoryIndex::build(&observations).len();
    println!(
        "Saved {} feature rows covering {} riders to {}",
        observations.len(),
        riders,
        output.display()
    );

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn predict_startlist(
    startlist: &Path,
    category: &str,
    features_path: &Path,
    model_dir: &Path,
    threshold: f64,
    dns_filter: bool,
    as_of: NaiveDate,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    println!(
        "{}: {} / {} / {}",
        "Predicting".green(),
        startlist.display(),
        category,
        as_of
    );
    println!();

    let config = load_config(config)?;

    let pb = spinner("Loading feature table and models...");
    let riders = load_startlist(startlist)
        .with_context(|| format!("Failed to load startlist from {:?}", startlist))?;
    if riders.is_empty() {
        pb.finish_and_clear();
        println!("{}", "Startlist is empty.".red());
        return Ok(());
    }

    let (observations, features) = load_feature_table(features_path)
        .with_context(|| format!("Failed to load feature table from {:?}", features_path))?;
    let mut bundle = ModelBundle::load(model_dir)
        .with_context(|| format!("Failed to load model bundle from {:?}", model_dir))?;

    pb.set_message(format!("Scoring {} riders...", riders.len()));
    let predictor = Predictor::new(&observations, &features, config)?;
    let predictions =
        predictor.predict_startlist(&riders, category, as_of, &mut bundle, threshold, dns_filter)?;
    pb.finish_and_clear();

    print_predictions(&predictions, threshold);

    if let Some(path) = output {
        write_predictions(path, &predictions)
            .with_context(|| format!("Failed to write predictions to {:?}", path))?;
        println!("\n{}: {}", "Saved".green(), path.display());
    }

    Ok(())
}

fn print_predictions(predictions: &[PredictionRecord], threshold: f64) {
    println!("{}", "Startlist predictions:".yellow().bold());
    println!(
        "{:>4} {:<28} {:>8} {:>8} {:<16} {:>10} {:>6}",
        "#", "Rider", "Top-10", "Top-3", "Call", "Form", "Career"
    );
    println!("{}", "-".repeat(88));

    for (rank, pred) in predictions.iter().enumerate() {
        let call = match pred.decision {
            Decision::Top10 => pred.decision.as_str().green(),
            Decision::OutsideTop10 => pred.decision.as_str().normal(),
            Decision::DnsRisk => pred.decision.as_str().yellow(),
        };
        let name = match pred.status {
            RiderStatus::Found => truncate_name(&pred.rider_name, 28).normal(),
            RiderStatus::NewRider => truncate_name(&pred.rider_name, 28).dimmed(),
        };
        let form = pred
            .recent_form
            .map(|f| format!("{:.1}", f))
            .unwrap_or_else(|| "-".to_string());
        let career = pred
            .career_top10_rate
            .map(|r| format!("{:.0}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>4} {:<28} {:>7.1}% {:>7.1}% {:<16} {:>10} {:>6}",
            rank + 1,
            name,
            pred.top10_probability * 100.0,
            pred.top3_probability * 100.0,
            call,
            form,
            career
        );
    }

    let top10_calls = predictions.iter().filter(|p| p.decision == Decision::Top10).count();
    let new_riders =
        predictions.iter().filter(|p| p.status == RiderStatus::NewRider).count();
    let dns_flags = predictions.iter().filter(|p| p.dns_risk).count();

    println!();
    println!(
        "Top-10 calls at threshold {:.2}: {} | new riders: {} | doubtful starters: {}",
        threshold, top10_calls, new_riders, dns_flags
    );
}

fn validate_predictions(
    predictions_path: &Path,
    results_path: &Path,
    category: &str,
    output: Option<&Path>,
) -> Result<()> {
    println!(
        "{}: {} vs {}",
        "Validating".green(),
        predictions_path.display(),
        results_path.display()
    );
    println!();

    let predictions = load_predictions(predictions_path)
        .with_context(|| format!("Failed to load predictions from {:?}", predictions_path))?;
    let results = load_observations(results_path)
        .with_context(|| format!("Failed to load results from {:?}", results_path))?;

    let report = validate(&predictions, &results, category);
    print_report(&report);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        println!("\n{}: {}", "Saved".green(), path.display());
    }

    Ok(())
}

fn print_report(report: &ValidationReport) {
    println!("{}", "Top-10 validation:".yellow().bold());
    println!(
        "Riders scored: {} | predicted top 10: {} | actual top 10: {}",
        report.riders_scored, report.predicted_top10, report.actual_top10
    );
    println!(
        "Accuracy: {} | Precision: {}",
        format!("{:.1}%", report.accuracy * 100.0).green().bold(),
        format!("{:.1}%", report.precision * 100.0).bold()
    );
    println!();

    if !report.correct.is_empty() {
        println!("{} {}", "Correct:".green(), report.correct.join(", "));
    }
    if !report.missed.is_empty() {
        println!("{} {}", "Missed:".red(), report.missed.join(", "));
    }
    if !report.false_positives.is_empty() {
        println!(
            "{} {}",
            "False positives:".yellow(),
            report.false_positives.join(", ")
        );
    }

    println!();
    println!("{}", "Podium:".yellow().bold());
    println!("Predicted: {}", report.podium_predicted.join(", "));
    println!("Actual:    {}", report.podium_actual.join(", "));
    println!("Hits: {}/3", report.podium_hits);
}

/// Truncate name to fit display width
fn truncate_name(name: &str, max_len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len {
        name.to_string()
    } else {
        chars[..max_len - 1].iter().collect::<String>() + "…"
    }
}
