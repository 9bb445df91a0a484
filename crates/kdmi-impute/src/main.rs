//! CLI entry point for the kDMI imputation pipeline.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use kdmi_impute::{Dataset, ImputationConfig, ImputationResult, Pipeline, TreeAlgorithm};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// CLI-compatible tree algorithm enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTreeAlgorithm {
    /// Single-threshold numeric splits and multiway categorical splits
    Strict,
    /// Windowed numeric splits and binary categorical splits
    Exploratory,
}

impl From<CliTreeAlgorithm> for TreeAlgorithm {
    fn from(cli: CliTreeAlgorithm) -> Self {
        match cli {
            CliTreeAlgorithm::Strict => TreeAlgorithm::Strict,
            CliTreeAlgorithm::Exploratory => TreeAlgorithm::Exploratory,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Decision-tree partitioned EM imputation of missing values",
    long_about = "Imputes missing values in tabular data. A decision tree is built for every \
                  attribute with missing values; records are imputed from the nearest \
                  neighbours inside their leaf using EM.\n\n\
                  EXAMPLES:\n  \
                  # Plain-text data with an attribute-metadata file\n  \
                  kdmi-impute --data data.txt --attributes attributes.txt -o imputed.txt\n\n  \
                  # CSV with a header row\n  \
                  kdmi-impute --data data.csv --csv -o imputed.csv\n\n  \
                  # Preview missing values and planned trees\n  \
                  kdmi-impute --data data.txt --attributes attributes.txt --dry-run"
)]
struct Args {
    /// Path to the data file
    #[arg(short, long)]
    data: PathBuf,

    /// Path to the attribute-metadata file of a plain-text data file
    #[arg(short, long, required_unless_present = "csv", conflicts_with = "csv")]
    attributes: Option<PathBuf>,

    /// Read the data file as CSV with a header row and infer attribute types
    #[arg(long)]
    csv: bool,

    /// Output file for the imputed data
    ///
    /// Defaults to `<data>_imputed` with the input's extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory to write one `<attribute>.rules` file per tree
    #[arg(long)]
    rules_dir: Option<PathBuf>,

    /// Split-search policy for tree induction
    #[arg(long, value_enum, default_value = "strict")]
    algorithm: CliTreeAlgorithm,

    /// Minimum records per partition
    #[arg(long, default_value = "20")]
    min_records: usize,

    /// Minimum gain ratio for a split to be accepted
    #[arg(long, default_value = "0.01")]
    min_gain_ratio: f64,

    /// Pruning confidence factor (0.0 - 1.0, exclusive)
    #[arg(long, default_value = "0.25")]
    confidence_factor: f64,

    /// Disable pruning
    #[arg(long)]
    no_prune: bool,

    /// EM iteration cap
    #[arg(long, default_value = "1000")]
    em_max_iterations: usize,

    /// Seed of the first-iteration EM perturbation
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Preview missing values and planned trees without imputing
    #[arg(long)]
    dry_run: bool,

    /// Output the summary as JSON to stdout instead of a human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON summary.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings, errors and the final result)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    if !args.data.exists() {
        return Err(anyhow!("Data file not found: {}", args.data.display()));
    }

    info!("Loading dataset from: {}", args.data.display());
    let dataset = load_dataset(&args)?;
    info!(
        "Dataset loaded successfully: {} records x {} attributes",
        dataset.len(),
        dataset.attribute_count()
    );

    if args.dry_run {
        run_dry_run(&args, &dataset);
        return Ok(());
    }

    let config = ImputationConfig::builder()
        .tree_algorithm(args.algorithm.into())
        .min_records(args.min_records)
        .min_gain_ratio(args.min_gain_ratio)
        .confidence_factor(args.confidence_factor)
        .enable_pruning(!args.no_prune)
        .em_max_iterations(args.em_max_iterations)
        .random_seed(args.seed)
        .build()?;

    let pipeline = build_pipeline(&args, config)?;
    run_pipeline(pipeline, &args, dataset)
}

fn load_dataset(args: &Args) -> Result<Dataset> {
    if args.csv {
        return Ok(Dataset::load_csv(&args.data)?);
    }
    let attributes = args
        .attributes
        .as_ref()
        .ok_or_else(|| anyhow!("--attributes is required unless --csv is given"))?;
    Ok(Dataset::load_text(&args.data, attributes)?)
}

fn output_path(args: &Args) -> PathBuf {
    if let Some(ref output) = args.output {
        return output.clone();
    }
    let stem = args
        .data
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = args
        .data
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or(if args.csv { "csv" } else { "txt" });
    args.data
        .with_file_name(format!("{}_imputed.{}", stem, extension))
}

/// Run dry-run mode - show what would happen without imputing
///
/// Uses `println!` intentionally: this output is the purpose of --dry-run
/// and should be visible regardless of log level.
fn run_dry_run(args: &Args, dataset: &Dataset) {
    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of imputation");
    println!("{}\n", "=".repeat(80));

    println!("DATASET OVERVIEW");
    println!("{}", "-".repeat(40));
    println!("  File: {}", args.data.display());
    println!("  Records: {}", dataset.len());
    println!("  Attributes: {}", dataset.attribute_count());
    println!(
        "  Complete records: {}",
        dataset.records().iter().filter(|r| r.is_complete()).count()
    );
    println!("  Missing cells: {}", dataset.total_missing());
    println!();

    println!("ATTRIBUTES");
    println!("{}", "-".repeat(40));
    println!(
        "{:<24} {:<12} {:<10} {:<10}",
        "Attribute", "Type", "Missing", "Distinct"
    );
    println!("{}", "-".repeat(60));
    for (a, attribute) in dataset.schema().attributes().iter().enumerate() {
        println!(
            "{:<24} {:<12} {:<10} {:<10}",
            truncate_str(&attribute.name, 23),
            format!("{:?}", attribute.kind).to_lowercase(),
            dataset.missing_count(a),
            dataset.domain(a).len()
        );
    }
    println!();

    println!("PLANNED TREES");
    println!("{}", "-".repeat(40));
    let planned: Vec<&str> = dataset
        .schema()
        .attributes()
        .iter()
        .enumerate()
        .filter(|(a, _)| dataset.missing_count(*a) > 0)
        .map(|(_, attribute)| attribute.name.as_str())
        .collect();
    if planned.is_empty() {
        println!("  No missing values, nothing to impute");
    } else {
        for name in planned {
            println!("  - {}", name);
        }
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To impute, run without --dry-run");
    println!("{}", "=".repeat(80));
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn build_pipeline(args: &Args, config: ImputationConfig) -> Result<Pipeline> {
    let mut builder = Pipeline::builder().config(config);

    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    Ok(builder.build()?)
}

/// Run pipeline and write results
fn run_pipeline(pipeline: Pipeline, args: &Args, dataset: Dataset) -> Result<()> {
    info!("{}", "=".repeat(80));
    info!("Starting imputation pipeline...");
    info!("{}", "=".repeat(80));

    let result = match pipeline.process(dataset) {
        Ok(result) => result,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            return Err(anyhow!("Pipeline failed: {}", e));
        }
    };

    let output = output_path(args);
    if args.csv {
        result.dataset.write_csv(&output)?;
    } else {
        result.dataset.write_text(&output)?;
    }
    info!("Imputed data written to: {}", output.display());

    if let Some(ref dir) = args.rules_dir {
        write_rules(&result, dir)?;
    }

    if args.json {
        println!("{}", result.summary_json()?);
        return Ok(());
    }

    print_human_readable_summary(&result, &output);
    Ok(())
}

/// Write one `<attribute>.rules` file per tree.
fn write_rules(result: &ImputationResult, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Creating rules directory {}", dir.display()))?;
    for report in &result.trees {
        let path = dir.join(format!("{}.rules", report.attribute));
        std::fs::write(&path, report.rules.to_text())
            .with_context(|| format!("Writing {}", path.display()))?;
        info!("Rules for '{}' written to: {}", report.attribute, path.display());
    }
    Ok(())
}

/// Print a human-readable summary of the imputation.
fn print_human_readable_summary(result: &ImputationResult, output: &Path) {
    let summary = &result.summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("IMPUTATION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!("Output: {}", output.display());
    println!(
        "  {} records x {} attributes, {} trees built",
        summary.records, summary.attributes, summary.trees_built
    );
    println!();

    println!("Imputation Summary:");
    println!("  Duration: {}ms", summary.duration_ms);
    println!(
        "  Missing cells: {} -> {} ({:.1}% imputed)",
        summary.missing_before,
        summary.missing_after,
        summary.imputed_percentage()
    );
    println!("  From own leaf:      {}", summary.cells_imputed.own_leaf);
    println!("  From borrowed leaf: {}", summary.cells_imputed.borrowed_leaf);
    println!("  From whole dataset: {}", summary.cells_imputed.whole_dataset);
    println!("  Mean/mode fallback: {}", summary.cells_imputed.fallback);
    println!();

    let imputed: Vec<_> = summary
        .attribute_summaries
        .iter()
        .filter(|a| a.missing_before > 0)
        .collect();
    if !imputed.is_empty() {
        println!("Attributes:");
        for attribute in imputed {
            println!(
                "  - {}: {} missing, {:.0}% imputed{}",
                attribute.name,
                attribute.missing_before,
                attribute.imputation_percentage(),
                if attribute.has_tree { "" } else { " (no tree)" }
            );
        }
        println!();
    }

    if !summary.warnings.is_empty() {
        println!("Warnings:");
        for warning in &summary.warnings {
            println!("  ! {}", warning);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("Use --rules-dir to save the rules of every tree");
    println!("{}", "=".repeat(80));
}
