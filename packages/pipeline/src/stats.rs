//! Per-block lot statistics.
//!
//! Groups lots by their parent block, computes the lot count, the modal
//! use-type and typology, and the per-use distribution, then left-joins the
//! results onto the blocks table. Blocks without lots keep their row and get
//! [`BlockStats::default`].

use std::collections::{BTreeMap, BTreeSet};

use cadastre_map_cadastre_models::{
    BlockRecord, BlockStats, EnrichedBlock, LotTable, NOT_AVAILABLE,
};

#[derive(Default)]
struct Tally<'a> {
    total: u64,
    uses: BTreeMap<&'a str, u64>,
    typologies: BTreeMap<&'a str, u64>,
}

/// Returns the most frequent value. Ties go to the lexicographically
/// smallest value.
fn mode<'a>(counts: &BTreeMap<&'a str, u64>) -> Option<&'a str> {
    counts
        .iter()
        .fold(None, |best: Option<(&'a str, u64)>, (&value, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((value, count)),
        })
        .map(|(value, _)| value)
}

/// Computes statistics for every block id referenced by at least one lot.
///
/// Lots without a block id are skipped. Typology is only considered when
/// the lot table carries the column.
#[must_use]
pub fn aggregate(lots: &LotTable) -> BTreeMap<String, BlockStats> {
    let mut tallies: BTreeMap<&str, Tally<'_>> = BTreeMap::new();

    for lot in &lots.lots {
        let Some(block_id) = lot.block_id.as_deref() else {
            continue;
        };
        let tally = tallies.entry(block_id).or_default();
        tally.total += 1;
        *tally.uses.entry(lot.use_type.as_str()).or_insert(0) += 1;
        if lots.has_typology
            && let Some(typology) = lot.typology.as_deref()
        {
            *tally.typologies.entry(typology).or_insert(0) += 1;
        }
    }

    tallies
        .into_iter()
        .map(|(block_id, tally)| {
            let stats = BlockStats {
                total_lots: tally.total,
                dominant_use: mode(&tally.uses).unwrap_or(NOT_AVAILABLE).to_string(),
                dominant_typology: mode(&tally.typologies)
                    .unwrap_or(NOT_AVAILABLE)
                    .to_string(),
                use_counts: tally
                    .uses
                    .into_iter()
                    .map(|(use_type, count)| (use_type.to_string(), count))
                    .collect(),
            };
            (block_id.to_string(), stats)
        })
        .collect()
}

/// Attaches lot statistics to every block.
///
/// The output has exactly one entry per input block, in input order. Blocks
/// no lot references get zero lots, `"N/A"` dominants and an empty
/// distribution.
#[must_use]
pub fn enrich(blocks: Vec<BlockRecord>, lots: &LotTable) -> Vec<EnrichedBlock> {
    if blocks.is_empty() {
        return Vec::new();
    }

    let stats_by_block = aggregate(lots);

    let block_ids: BTreeSet<&str> = blocks.iter().map(|block| block.id.as_str()).collect();
    let orphans: Vec<&str> = stats_by_block
        .keys()
        .map(String::as_str)
        .filter(|id| !block_ids.contains(id))
        .collect();
    if !orphans.is_empty() {
        log::warn!(
            "{} block ids referenced by lots have no matching block: {}",
            orphans.len(),
            orphans.join(", ")
        );
    }

    let blocks_without_lots = blocks
        .iter()
        .filter(|block| !stats_by_block.contains_key(&block.id))
        .count();

    let enriched: Vec<EnrichedBlock> = blocks
        .into_iter()
        .map(|block| {
            let stats = stats_by_block.get(&block.id).cloned().unwrap_or_default();
            EnrichedBlock::new(block, stats)
        })
        .collect();

    log::info!(
        "Enriched {} blocks from {} lots ({} blocks without lots)",
        enriched.len(),
        lots.len(),
        blocks_without_lots
    );

    enriched
}
