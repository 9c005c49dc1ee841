#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line dashboard for cadastral blocks and lots.
//!
//! Loads the configured workbook through the cached pipeline and prints
//! block statistics, lot listings, per-block detail and heatmap samples.
//! Failures are reported with a message chosen by [`ErrorKind`].

mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use cadastre_map_pipeline::config::CadastreConfig;
use cadastre_map_pipeline::loader::{ConfiguredPipeline, Dataset};
use cadastre_map_pipeline::summary::{
    UseFilter, available_uses, block_lots, block_outline, default_heatmap_uses, filter_by_use,
    heatmap_points, map_center, use_distribution,
};
use cadastre_map_pipeline::{ErrorKind, PipelineError};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cadastre_map", about = "Cadastral blocks and lots dashboard")]
struct Cli {
    /// Config file (default: `cadastre_map.toml` if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show block and lot counts and the lot use distribution
    Summary,
    /// List every block with its lot statistics
    Blocks {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List lots with valid coordinates
    Lots {
        /// Only lots with this use-type
        #[arg(long = "use")]
        use_type: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one block's statistics, lots and outline
    Block {
        /// Block identifier
        id: String,
    },
    /// Print heatmap samples as JSON
    Heatmap {
        /// Use-types to include (repeatable). Defaults to the configured
        /// `heatmap_uses` that occur in the data.
        #[arg(long = "use")]
        uses: Vec<String>,
    },
    /// Reload periodically, reusing results younger than the cache TTL
    Watch {
        /// Seconds between reloads
        #[arg(long, default_value = "60")]
        interval: u64,
        /// Bypass the cache on every reload
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No block with id '{0}'")]
    UnknownBlock(String),
}

const fn headline(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Connection => {
            "Could not reach the data source. Check your connection and try again."
        }
        ErrorKind::Permission => {
            "Access to the data source was denied. Check the credentials and sharing settings."
        }
        ErrorKind::NotFound => {
            "The spreadsheet or one of its tabs was not found. Check the id and tab names."
        }
        ErrorKind::Validation => "The data does not match the expected layout.",
        ErrorKind::Config => "The configuration could not be loaded.",
        ErrorKind::Unexpected => "An unexpected error occurred.",
    }
}

fn report(err: &CliError) {
    match err {
        CliError::Pipeline(e) => {
            log::debug!("Pipeline failure ({}): {e:?}", e.kind());
            eprintln!("{}\n  {e}", headline(e.kind()));
        }
        CliError::Json(_) | CliError::UnknownBlock(_) => eprintln!("Error: {err}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config =
        CadastreConfig::load_or_default(cli.config.as_deref()).map_err(PipelineError::from)?;
    let heatmap_preferred = config.heatmap_uses.clone();
    let mut pipeline = ConfiguredPipeline::from_config(config);

    match cli.command {
        Commands::Summary => print_summary(&pipeline.refresh().await?),
        Commands::Blocks { json } => {
            let dataset = pipeline.refresh().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dataset.block_rows())?);
            } else {
                render::print_blocks(&dataset.blocks);
            }
        }
        Commands::Lots { use_type, json } => {
            let dataset = pipeline.refresh().await?;
            let lots = filter_by_use(&dataset.lots, &UseFilter::from_option(use_type));
            if json {
                let rows: Vec<_> = lots.iter().map(|lot| dataset.lot_row(lot)).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                render::print_lots(lots);
            }
        }
        Commands::Block { id } => print_block(&pipeline.refresh().await?, &id)?,
        Commands::Heatmap { uses } => {
            let dataset = pipeline.refresh().await?;
            let uses = if uses.is_empty() {
                default_heatmap_uses(&available_uses(&dataset.lots), &heatmap_preferred)
            } else {
                uses
            };
            let points = heatmap_points(&dataset.lots, &uses);
            let output = serde_json::json!({
                "center": map_center(&dataset.lots),
                "uses": uses,
                "points": points,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Watch { interval, force } => {
            watch(&mut pipeline, Duration::from_secs(interval.max(1)), force).await;
        }
    }

    Ok(())
}

fn print_summary(dataset: &Dataset) {
    let blocks_with_lots = dataset
        .blocks
        .iter()
        .filter(|b| b.stats.total_lots > 0)
        .count();
    println!(
        "Blocks: {} ({blocks_with_lots} with lots)",
        dataset.blocks.len()
    );
    println!("Lots:   {}", dataset.lots.len());
    if let Some((lat, lon)) = map_center(&dataset.lots) {
        println!("Center: {lat:.6}, {lon:.6}");
    }
    if !dataset.has_typology {
        println!("Typology: not present in the lots tab");
    }
    println!();
    render::print_distribution(&use_distribution(&dataset.lots));
}

fn print_block(dataset: &Dataset, id: &str) -> Result<(), CliError> {
    let block = dataset
        .blocks
        .iter()
        .find(|b| b.block.id == id)
        .ok_or_else(|| CliError::UnknownBlock(id.to_string()))?;
    let lots = block_lots(&dataset.lots, id);

    println!("Block {id}");
    println!("  Lots:              {}", block.stats.total_lots);
    println!("  Dominant use:      {}", block.stats.dominant_use);
    println!("  Dominant typology: {}", block.stats.dominant_typology);
    match block_outline(lots.iter().copied()) {
        Some(outline) => {
            println!(
                "  Centroid:          {:.6}, {:.6}",
                outline.centroid.y(),
                outline.centroid.x()
            );
            println!("  Outline vertices:  {}", outline.vertex_count());
        }
        None => println!("  Outline:           no placed lots"),
    }
    println!();
    render::print_distribution(&use_distribution(lots.iter().copied()));
    println!();
    render::print_lots(lots);
    Ok(())
}

async fn watch(pipeline: &mut ConfiguredPipeline, interval: Duration, force: bool) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if force {
                    pipeline.invalidate();
                }
                match pipeline.refresh().await {
                    Ok(dataset) => log::info!(
                        "{} blocks, {} plottable lots",
                        dataset.blocks.len(),
                        dataset.lots.len()
                    ),
                    Err(e) => {
                        report(&CliError::Pipeline(e));
                        if let Some(last) = pipeline.last_known() {
                            log::warn!("Keeping last loaded dataset ({} blocks)", last.blocks.len());
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}
