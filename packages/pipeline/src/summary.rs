//! Display-oriented summaries over normalized lots and blocks.
//!
//! These feed the dashboard views: the use filter, the lot-use donut chart,
//! the per-block detail panel with its outline, the heatmap layer, and the
//! initial map center.

use std::collections::{BTreeMap, BTreeSet};

use cadastre_map_cadastre_models::{Located, LotRecord};
use geo::{Centroid, Coord, LineString, MultiPoint, Point, Polygon};
use serde::Serialize;

/// Number of uses preselected for the heatmap when none of the preferred
/// uses occur in the data.
const FALLBACK_HEATMAP_USES: usize = 3;

/// Restricts lots to one use-type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UseFilter {
    /// Every lot.
    #[default]
    All,
    /// Only lots with exactly this use-type.
    Only(String),
}

impl UseFilter {
    /// `None` selects every lot.
    #[must_use]
    pub fn from_option(use_type: Option<String>) -> Self {
        use_type.map_or(Self::All, Self::Only)
    }

    /// Returns `true` if a lot with `use_type` passes the filter.
    #[must_use]
    pub fn matches(&self, use_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == use_type,
        }
    }
}

/// Sorted distinct non-blank use-types.
#[must_use]
pub fn available_uses(lots: &[LotRecord]) -> Vec<String> {
    lots.iter()
        .map(|lot| lot.use_type.as_str())
        .filter(|use_type| !use_type.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Lots passing `filter`, in input order.
#[must_use]
pub fn filter_by_use<'a>(lots: &'a [LotRecord], filter: &UseFilter) -> Vec<&'a LotRecord> {
    lots.iter()
        .filter(|lot| filter.matches(&lot.use_type))
        .collect()
}

/// Lots belonging to one block.
#[must_use]
pub fn block_lots<'a>(lots: &'a [LotRecord], block_id: &str) -> Vec<&'a LotRecord> {
    lots.iter()
        .filter(|lot| lot.block_id.as_deref() == Some(block_id))
        .collect()
}

/// Count and share of one use-type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UseShare {
    /// The use-type.
    pub use_type: String,
    /// Number of lots.
    pub count: u64,
    /// Share of all lots, in percent.
    pub percent: f64,
}

/// Lot counts per use-type, most frequent first (ties by name).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn use_distribution<'a>(lots: impl IntoIterator<Item = &'a LotRecord>) -> Vec<UseShare> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for lot in lots {
        *counts.entry(lot.use_type.as_str()).or_insert(0) += 1;
    }
    let total: u64 = counts.values().sum();

    let mut shares: Vec<UseShare> = counts
        .into_iter()
        .map(|(use_type, count)| UseShare {
            use_type: use_type.to_string(),
            count,
            percent: count as f64 * 100.0 / total as f64,
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.use_type.cmp(&b.use_type)));
    shares
}

fn located_points<'a, T: Located + 'a>(items: impl IntoIterator<Item = &'a T>) -> Vec<Point> {
    items
        .into_iter()
        .filter_map(Located::coordinates)
        .map(|(lat, lon)| Point::new(lon, lat))
        .collect()
}

/// Mean position of the located items as `(lat, lon)`, used to center maps.
#[must_use]
pub fn map_center<'a, T: Located + 'a>(items: impl IntoIterator<Item = &'a T>) -> Option<(f64, f64)> {
    MultiPoint::new(located_points(items))
        .centroid()
        .map(|c| (c.y(), c.x()))
}

/// Approximate footprint of a block derived from its lots' positions.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutline {
    /// Mean lot position.
    pub centroid: Point,
    /// Lot positions ordered by angle around the centroid, closed.
    pub polygon: Polygon,
}

impl BlockOutline {
    /// Perimeter vertices as `(lat, lon)`, first vertex repeated at the end.
    #[must_use]
    pub fn perimeter(&self) -> Vec<(f64, f64)> {
        self.polygon
            .exterior()
            .coords()
            .map(|c| (c.y, c.x))
            .collect()
    }

    /// Number of distinct perimeter vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        let coords = self.polygon.exterior().0.len();
        if coords > 1 { coords - 1 } else { coords }
    }
}

/// Builds a block outline from its located lots.
///
/// One or two located lots give a degenerate outline (a point or a line).
/// Returns `None` when no lot has coordinates.
#[must_use]
pub fn block_outline<'a, T: Located + 'a>(
    items: impl IntoIterator<Item = &'a T>,
) -> Option<BlockOutline> {
    let points = located_points(items);
    if points.is_empty() {
        return None;
    }

    let centroid = MultiPoint::new(points.clone()).centroid()?;
    let mut ring: Vec<(f64, Coord)> = points
        .into_iter()
        .map(|p| ((p.y() - centroid.y()).atan2(p.x() - centroid.x()), p.0))
        .collect();
    ring.sort_by(|a, b| a.0.total_cmp(&b.0));

    let exterior = LineString::from(ring.into_iter().map(|(_, c)| c).collect::<Vec<_>>());
    Some(BlockOutline {
        centroid,
        polygon: Polygon::new(exterior, Vec::new()),
    })
}

/// A weighted heatmap sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPoint {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Sample weight.
    pub weight: f64,
}

/// Heatmap samples for located lots whose use-type is in `uses`.
#[must_use]
pub fn heatmap_points(lots: &[LotRecord], uses: &[String]) -> Vec<HeatPoint> {
    lots.iter()
        .filter(|lot| uses.iter().any(|u| u == &lot.use_type))
        .filter_map(Located::coordinates)
        .map(|(latitude, longitude)| HeatPoint {
            latitude,
            longitude,
            weight: 1.0,
        })
        .collect()
}

/// Uses preselected for the heatmap: the `preferred` ones present in
/// `available`, or the first few available uses if none are present.
#[must_use]
pub fn default_heatmap_uses(available: &[String], preferred: &[String]) -> Vec<String> {
    let present: Vec<String> = preferred
        .iter()
        .filter(|u| available.contains(u))
        .cloned()
        .collect();
    if present.is_empty() {
        available.iter().take(FALLBACK_HEATMAP_USES).cloned().collect()
    } else {
        present
    }
}

#[cfg(test)]
mod tests {
    use cadastre_map_cadastre_models::Row;

    use super::*;

    fn lot(id: &str, block: &str, use_type: &str, coords: Option<(f64, f64)>) -> LotRecord {
        LotRecord {
            lot_id: id.to_string(),
            block_id: Some(block.to_string()),
            use_type: use_type.to_string(),
            typology: None,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            attributes: Row::new(),
        }
    }

    fn sample() -> Vec<LotRecord> {
        vec![
            lot("L1", "B1", "Residencial", Some((1.0, 1.0))),
            lot("L2", "B1", "Misto", Some((1.0, -1.0))),
            lot("L3", "B1", "Residencial", Some((-1.0, -1.0))),
            lot("L4", "B1", "Residencial", Some((-1.0, 1.0))),
            lot("L5", "B2", "Baldio", None),
            lot("L6", "B2", "", Some((3.0, 3.0))),
        ]
    }

    #[test]
    fn lists_available_uses() {
        assert_eq!(available_uses(&sample()), ["Baldio", "Misto", "Residencial"]);
    }

    #[test]
    fn filters_by_use() {
        let lots = sample();
        assert_eq!(filter_by_use(&lots, &UseFilter::All).len(), 6);
        let only = filter_by_use(&lots, &UseFilter::from_option(Some("Misto".to_string())));
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].lot_id, "L2");
    }

    #[test]
    fn distribution_is_sorted_and_sums_to_hundred() {
        let shares = use_distribution(&sample());
        assert_eq!(shares[0].use_type, "Residencial");
        assert_eq!(shares[0].count, 3);
        assert_eq!(shares[1].use_type, "");
        let total: f64 = shares.iter().map(|s| s.percent).sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert!(use_distribution(&[]).is_empty());
    }

    #[test]
    fn selects_block_lots() {
        let lots = sample();
        let ids: Vec<&str> = block_lots(&lots, "B2").iter().map(|l| l.lot_id.as_str()).collect();
        assert_eq!(ids, ["L5", "L6"]);
    }

    #[test]
    fn map_center_averages_located_items() {
        let lots = sample();
        let (lat, lon) = map_center(&lots).unwrap();
        assert!((lat - 0.6).abs() < 1e-9);
        assert!((lon - 0.6).abs() < 1e-9);
        assert_eq!(map_center::<LotRecord>(&[]), None);
    }

    #[test]
    fn outline_orders_points_around_centroid() {
        let lots = sample();
        let outline = block_outline(block_lots(&lots, "B1")).unwrap();
        assert!(outline.centroid.x().abs() < 1e-9);
        assert!(outline.centroid.y().abs() < 1e-9);
        let perimeter = outline.perimeter();
        assert_eq!(
            perimeter,
            [(-1.0, -1.0), (-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)]
        );
    }

    #[test]
    fn outline_of_few_lots_is_degenerate() {
        let lots = sample();
        let single = block_outline(block_lots(&lots, "B2")).unwrap();
        assert_eq!(single.vertex_count(), 1);
        assert_eq!(single.centroid, Point::new(3.0, 3.0));
        assert_eq!(single.perimeter()[0], (3.0, 3.0));

        let pair = [
            lot("L7", "B3", "Misto", Some((0.0, 0.0))),
            lot("L8", "B3", "Misto", Some((2.0, 4.0))),
        ];
        let line = block_outline(&pair).unwrap();
        assert_eq!(line.vertex_count(), 2);
        assert_eq!(line.centroid, Point::new(2.0, 1.0));
        assert_eq!(line.perimeter().len(), 3);
    }

    #[test]
    fn outline_needs_a_located_lot() {
        let unplaced = [lot("L1", "B4", "Misto", None)];
        assert!(block_outline(&unplaced).is_none());
        assert!(block_outline::<LotRecord>(&[]).is_none());
    }

    #[test]
    fn heatmap_uses_selected_located_lots() {
        let lots = sample();
        let points = heatmap_points(&lots, &["Residencial".to_string(), "Baldio".to_string()]);
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| (p.weight - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn heatmap_defaults_fall_back_to_first_uses() {
        let available = available_uses(&sample());
        let preferred = vec!["Misto".to_string(), "Institucional".to_string()];
        assert_eq!(default_heatmap_uses(&available, &preferred), ["Misto"]);
        assert_eq!(
            default_heatmap_uses(&available, &["Empresarial".to_string()]),
            ["Baldio", "Misto", "Residencial"]
        );
    }
}
