use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{error, warn};

use uniskor::{ingest, logging, Config, StatisticalStep, YearCollection};

#[derive(Parser)]
#[command(name = "uniskor", version, about = "University efficiency score pipeline")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "UNISKOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the universities the portal offers
    Discover,
    /// Discover, extract, write workbooks, then try the statistical step
    Scrape,
    /// Run the statistical step only
    Analyze,
    /// Processed workbook → canonical dataset
    Ingest {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Scrape → analyze → ingest
    Update,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&config.logging);

    let result = match cli.command {
        Command::Discover => run_discover(&config),
        Command::Scrape => run_scrape(&config),
        Command::Analyze => run_analyze(&config, true).map(|_| ()),
        Command::Ingest { input, output } => run_ingest(&config, input, output),
        Command::Update => run_update(&config),
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "command failed");
    }
    result
}

// ============================================================================
// COMMANDS
// ============================================================================

#[cfg(feature = "browser")]
fn run_discover(config: &Config) -> Result<()> {
    use uniskor::{AggregationPipeline, ChromeSession};

    println!("🔎 Discovering universities");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pipeline = AggregationPipeline::new(config.clone());
    let session = ChromeSession::launch(&config.portal)?;
    let entities = pipeline.discover(&session)?;

    for entity in &entities {
        println!("  {:>4}  {:<12} {}", entity.sequence_number, entity.id, entity.name);
    }
    println!("\n✓ {} universities", entities.len());
    Ok(())
}

#[cfg(not(feature = "browser"))]
fn run_discover(_config: &Config) -> Result<()> {
    bail!("this build has no browser support; rebuild with the `browser` feature")
}

fn run_scrape(config: &Config) -> Result<()> {
    println!("🕸️  Scraping the report portal");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Portal: {}", config.portal.url);

    let collection = scrape_records(config)?;

    println!("\n📊 Records per year:");
    for (year, records) in collection.iter() {
        println!("   {}: {}", year, records.len());
    }
    println!("✓ Raw workbook:        {}", config.output.raw_workbook.display());
    println!("✓ Normalized workbook: {}", config.output.normalized_workbook.display());

    if !run_analyze(config, false)? {
        warn!("statistical step skipped");
    }
    Ok(())
}

#[cfg(feature = "browser")]
fn scrape_records(config: &Config) -> Result<YearCollection> {
    let collection = uniskor::pipeline::scrape(config)?;
    if collection.is_empty() {
        bail!("no records extracted");
    }
    Ok(collection)
}

#[cfg(not(feature = "browser"))]
fn scrape_records(_config: &Config) -> Result<YearCollection> {
    bail!("this build has no browser support; rebuild with the `browser` feature")
}

/// `Ok(false)` when the tool is missing and not `required`.
fn run_analyze(config: &Config, required: bool) -> Result<bool> {
    println!("\n📈 Statistical step");

    let step = StatisticalStep::new(config.stats.clone());
    if !step.script_exists() {
        warn!(script = %config.stats.script.display(), "statistical script not found");
    }

    if step.run()? {
        println!("✓ Processed workbook: {}", config.output.processed_workbook.display());
        return Ok(true);
    }

    if required {
        bail!(
            "none of {:?} is installed; the statistical step is required",
            config.stats.commands
        );
    }
    println!("⚠️  Statistical tool not found, skipping");
    Ok(false)
}

fn run_ingest(config: &Config, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| config.output.processed_workbook.clone());
    let output = output.unwrap_or_else(|| config.output.dataset.clone());

    println!("\n📥 Ingesting {}", input.display());
    let dataset = ingest(&input)
        .with_context(|| format!("Failed to ingest {}", input.display()))?;
    dataset
        .write_to(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✓ Years: {:?}", dataset.years);
    println!("✓ Universities: {}", dataset.universities.len());
    println!("✓ Written to {}", output.display());
    Ok(())
}

fn run_update(config: &Config) -> Result<()> {
    println!("🔄 UniSkor data update");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n[1/3] Scrape");
    let collection = scrape_records(config)?;
    println!("✓ {} records across {} years", collection.len(), collection.years().count());

    println!("\n[2/3] Analyze");
    run_analyze(config, true)?;

    println!("\n[3/3] Ingest");
    run_ingest(config, None, None)?;

    let size = fs::metadata(&config.output.dataset)
        .with_context(|| format!("{} missing after update", config.output.dataset.display()))?
        .len();

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Update complete: {} ({} bytes)", config.output.dataset.display(), size);
    Ok(())
}
