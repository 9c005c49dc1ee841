//! Plain-text tables for terminal output.

use cadastre_map_cadastre_models::{EnrichedBlock, LotRecord};
use cadastre_map_pipeline::summary::UseShare;

fn coordinate(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.6}"))
}

fn use_label(use_type: &str) -> &str {
    if use_type.is_empty() { "(blank)" } else { use_type }
}

/// Prints the use distribution as `use  count  percent` rows.
pub fn print_distribution(shares: &[UseShare]) {
    println!("{:<28} {:>7} {:>7}", "USE", "LOTS", "%");
    println!("{}", "-".repeat(44));
    for share in shares {
        println!(
            "{:<28} {:>7} {:>6.1}%",
            use_label(&share.use_type),
            share.count,
            share.percent
        );
    }
}

/// Prints one row per enriched block.
pub fn print_blocks(blocks: &[EnrichedBlock]) {
    println!(
        "{:<12} {:>11} {:>11} {:>6}  {:<24} TYPOLOGY",
        "ID", "LATITUDE", "LONGITUDE", "LOTS", "DOMINANT USE"
    );
    println!("{}", "-".repeat(90));
    for block in blocks {
        println!(
            "{:<12} {:>11} {:>11} {:>6}  {:<24} {}",
            block.block.id,
            coordinate(block.block.latitude),
            coordinate(block.block.longitude),
            block.stats.total_lots,
            block.stats.dominant_use,
            block.stats.dominant_typology
        );
    }
}

/// Prints one row per lot.
pub fn print_lots<'a>(lots: impl IntoIterator<Item = &'a LotRecord>) {
    println!(
        "{:<12} {:<12} {:>11} {:>11}  {:<24} TYPOLOGY",
        "LOT", "BLOCK", "LATITUDE", "LONGITUDE", "USE"
    );
    println!("{}", "-".repeat(90));
    for lot in lots {
        println!(
            "{:<12} {:<12} {:>11} {:>11}  {:<24} {}",
            lot.lot_id,
            lot.block_id.as_deref().unwrap_or("-"),
            coordinate(lot.latitude),
            coordinate(lot.longitude),
            use_label(&lot.use_type),
            lot.typology.as_deref().unwrap_or("-")
        );
    }
}
