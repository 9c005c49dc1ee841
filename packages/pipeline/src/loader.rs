//! Loading and refreshing the cadastre dataset.
//!
//! [`DataLoader`] fetches one tab at a time and returns it only once it
//! satisfies the data contract. [`refresh`] is the pure core turning two
//! validated tables into a [`Dataset`]. [`CachedPipeline`] memoizes the
//! whole round trip for the configured TTL.

use std::time::Instant;

use cadastre_map_cadastre_models::{
    BlockRecord, ColumnMap, EnrichedBlock, LotRecord, LotTable, Row, RowTable,
};
use cadastre_map_source::{RowSource, TabSelector};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::PipelineError;
use crate::cache::{CacheKey, RefreshCache};
use crate::config::{AggregationScope, CadastreConfig};
use crate::coordinates::{extract_coordinates, normalize_numeric};
use crate::stats::enrich;
use crate::validate::validate;

/// Logical name of the blocks table in logs and errors.
pub const BLOCKS_TABLE: &str = "blocks";

/// Logical name of the lots table in logs and errors.
pub const LOTS_TABLE: &str = "lots";

/// Enriched blocks and plottable lots, ready for display.
///
/// Serializes as `{blocks, lots, has_typology}` with every row written under
/// the physical column names it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Every plottable block with its lot statistics.
    pub blocks: Vec<EnrichedBlock>,
    /// Lots with valid coordinates.
    pub lots: Vec<LotRecord>,
    /// Whether the lots tab carries a typology column.
    pub has_typology: bool,
    /// Column names the rows were read with.
    pub columns: ColumnMap,
}

impl Dataset {
    /// Enriched block rows: input columns followed by the derived fields.
    #[must_use]
    pub fn block_rows(&self) -> Vec<Row> {
        self.blocks
            .iter()
            .map(|block| block.to_row(&self.columns))
            .collect()
    }

    /// One lot as an output row.
    #[must_use]
    pub fn lot_row(&self, lot: &LotRecord) -> Row {
        lot.to_row(&self.columns, self.has_typology)
    }

    /// Every plottable lot as an output row.
    #[must_use]
    pub fn lot_rows(&self) -> Vec<Row> {
        self.lots.iter().map(|lot| self.lot_row(lot)).collect()
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Dataset", 3)?;
        state.serialize_field("blocks", &self.block_rows())?;
        state.serialize_field("lots", &self.lot_rows())?;
        state.serialize_field("has_typology", &self.has_typology)?;
        state.end()
    }
}

/// Fetches and validates the blocks and lots tabs.
pub struct DataLoader<S> {
    source: S,
    config: CadastreConfig,
}

impl DataLoader<Box<dyn RowSource>> {
    /// Creates a loader for the source described by `config`.
    #[must_use]
    pub fn from_config(config: CadastreConfig) -> Self {
        let source = config.build_source();
        Self::new(source, config)
    }
}

impl<S: RowSource> DataLoader<S> {
    /// Creates a loader reading from `source`.
    #[must_use]
    pub const fn new(source: S, config: CadastreConfig) -> Self {
        Self { source, config }
    }

    /// The loader configuration.
    #[must_use]
    pub const fn config(&self) -> &CadastreConfig {
        &self.config
    }

    /// Fetches the blocks tab.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Source`] if the tab cannot be read, or
    /// [`PipelineError::Validation`] if it is empty or lacks `id`,
    /// `latitude` or `longitude`.
    pub async fn load_blocks(&self) -> Result<RowTable, PipelineError> {
        self.load(
            BLOCKS_TABLE,
            &self.config.blocks_tab,
            &self.config.raw_block_coordinates,
            &self.config.columns.required_block_columns(),
        )
        .await
    }

    /// Fetches the lots tab.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Source`] if the tab cannot be read, or
    /// [`PipelineError::Validation`] if it is empty or lacks `lot_id`,
    /// `block_id` or `use_type`.
    pub async fn load_lots(&self) -> Result<RowTable, PipelineError> {
        self.load(
            LOTS_TABLE,
            &self.config.lots_tab,
            &self.config.raw_lot_coordinates,
            &self.config.columns.required_lot_columns(),
        )
        .await
    }

    async fn load(
        &self,
        name: &str,
        tab: &TabSelector,
        raw_coordinates: &str,
        required: &[&str],
    ) -> Result<RowTable, PipelineError> {
        log::debug!("Fetching {name} from {tab} of {}", self.source.describe());
        let rows = self.source.fetch(tab).await?;
        let table = extract_coordinates(
            RowTable::new(name, rows),
            raw_coordinates,
            &self.config.columns,
        );
        validate(&table, required)?;
        log::info!("Loaded {} {name} rows", table.len());
        Ok(table)
    }

    /// Loads both tabs and runs [`refresh`] with the configured scope.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if either tab fails to load.
    pub async fn load_dataset(&self) -> Result<Dataset, PipelineError> {
        let blocks = self.load_blocks().await?;
        let lots = self.load_lots().await?;
        Ok(refresh(
            blocks,
            lots,
            &self.config.columns,
            self.config.aggregation_scope,
        ))
    }
}

/// Turns validated blocks and lots tables into a [`Dataset`].
///
/// Both tables are reduced to rows with valid coordinates. Block statistics
/// are computed over the lots selected by `scope`.
#[must_use]
pub fn refresh(
    blocks: RowTable,
    lots: RowTable,
    columns: &ColumnMap,
    scope: AggregationScope,
) -> Dataset {
    let has_typology = lots.has_column(&columns.typology);

    let all_lots = match scope {
        AggregationScope::AllLots => Some(LotTable::from_table(lots.clone(), columns)),
        AggregationScope::PlottableLots => None,
    };

    let blocks = BlockRecord::from_table(normalize_numeric(blocks, columns), columns);
    let mut plottable = LotTable::from_table(normalize_numeric(lots, columns), columns);
    plottable.has_typology = has_typology;

    let enriched = enrich(blocks, all_lots.as_ref().unwrap_or(&plottable));
    log::debug!(
        "Refreshed dataset: {} blocks, {} plottable lots (scope: {scope})",
        enriched.len(),
        plottable.len()
    );

    Dataset {
        blocks: enriched,
        lots: plottable.lots,
        has_typology,
        columns: columns.clone(),
    }
}

/// A [`DataLoader`] whose results are reused for the cache TTL.
///
/// A failed refresh leaves the cache untouched; the last good dataset stays
/// available through [`CachedPipeline::last_known`].
pub struct CachedPipeline<S> {
    loader: DataLoader<S>,
    cache: RefreshCache<Dataset>,
}

/// A pipeline over the source chosen at runtime by the config file.
pub type ConfiguredPipeline = CachedPipeline<Box<dyn RowSource>>;

impl ConfiguredPipeline {
    /// Builds the configured source and wraps it in a cached pipeline.
    #[must_use]
    pub fn from_config(config: CadastreConfig) -> Self {
        Self::new(DataLoader::from_config(config))
    }
}

impl<S: RowSource> CachedPipeline<S> {
    /// Wraps `loader` with a cache using the configured TTL.
    #[must_use]
    pub fn new(loader: DataLoader<S>) -> Self {
        let cache = RefreshCache::new(loader.config().cache_ttl());
        Self { loader, cache }
    }

    /// The wrapped loader.
    #[must_use]
    pub const fn loader(&self) -> &DataLoader<S> {
        &self.loader
    }

    /// Returns the cached dataset if it is younger than the TTL, otherwise
    /// loads a fresh one. Expired entries are dropped first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if loading fails. The previous dataset is
    /// kept.
    pub async fn refresh(&mut self) -> Result<Dataset, PipelineError> {
        let key = CacheKey::new("load_dataset", self.loader.config())?;
        let purged = self.cache.purge_expired(Instant::now());
        if purged > 0 {
            log::debug!("Dropped {purged} expired datasets");
        }
        if let Some(dataset) = self.cache.get(&key) {
            log::debug!("Dataset cache hit ({})", key.fingerprint);
            return Ok(dataset);
        }

        log::debug!(
            "Dataset cache miss ({}), reloading for {:?}",
            key.fingerprint,
            self.cache.ttl()
        );
        let dataset = self.loader.load_dataset().await?;
        self.cache.insert(key, dataset.clone());
        Ok(dataset)
    }

    /// Forces the next [`Self::refresh`] to reload from the source.
    pub fn invalidate(&mut self) {
        log::info!("Invalidating {} cached datasets", self.cache.len());
        self.cache.invalidate_all();
    }

    /// The most recently loaded dataset, however old.
    #[must_use]
    pub const fn last_known(&self) -> Option<&Dataset> {
        self.cache.last()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cadastre_map_cadastre_models::{NOT_AVAILABLE, Row};
    use cadastre_map_source::SourceError;
    use serde_json::{Value, json};

    use super::*;
    use crate::ErrorKind;
    use crate::validate::ValidationError;

    #[derive(Default)]
    struct MockSource {
        tabs: BTreeMap<String, Vec<Row>>,
        deny: bool,
        fetches: AtomicUsize,
    }

    impl MockSource {
        fn with_tab(mut self, tab: &TabSelector, rows: Value) -> Self {
            self.tabs
                .insert(tab.to_string(), serde_json::from_value(rows).unwrap());
            self
        }
    }

    #[async_trait]
    impl RowSource for MockSource {
        fn describe(&self) -> String {
            "mock workbook".to_string()
        }

        async fn fetch(&self, tab: &TabSelector) -> Result<Vec<Row>, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.deny {
                return Err(SourceError::Permission {
                    message: "denied".to_string(),
                    source: None,
                });
            }
            self.tabs
                .get(&tab.to_string())
                .cloned()
                .ok_or_else(|| SourceError::not_found(tab.to_string()))
        }
    }

    fn sample_source() -> MockSource {
        let config = CadastreConfig::default();
        MockSource::default()
            .with_tab(
                &config.blocks_tab,
                json!([
                    {"id": "B1", "latitude_longitude_bloco": "-3.20, -52.20"},
                    {"id": "B2", "latitude_longitude_bloco": "-3.21, -52.21"},
                    {"id": "B3", "latitude_longitude_bloco": "unknown"},
                ]),
            )
            .with_tab(
                &config.lots_tab,
                json!([
                    {"lot_id": "L1", "block_id": "B1", "use_type": "Residencial", "latitude_longitude": "-3.2001, -52.2001"},
                    {"lot_id": "L2", "block_id": "B1", "use_type": "Residencial", "latitude_longitude": "-3.2002, -52.2002"},
                    {"lot_id": "L3", "block_id": "B1", "use_type": "Misto", "latitude_longitude": ""},
                    {"lot_id": "L4", "block_id": "B2", "use_type": "Misto", "latitude_longitude": "-3.2101, -52.2101"},
                ]),
            )
    }

    #[tokio::test]
    async fn loads_blocks_with_extracted_coordinates() {
        let loader = DataLoader::new(sample_source(), CadastreConfig::default());
        let blocks = loader.load_blocks().await.unwrap();
        assert_eq!(blocks.name, BLOCKS_TABLE);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks.rows[0]["latitude"], json!(-3.2));
        assert_eq!(blocks.rows[2]["latitude"], Value::Null);
    }

    #[tokio::test]
    async fn plottable_scope_counts_only_placed_lots() {
        let loader = DataLoader::new(sample_source(), CadastreConfig::default());
        let dataset = loader.load_dataset().await.unwrap();

        let ids: Vec<&str> = dataset.blocks.iter().map(|b| b.block.id.as_str()).collect();
        assert_eq!(ids, ["B1", "B2"]);
        assert_eq!(dataset.lots.len(), 3);
        assert_eq!(dataset.blocks[0].stats.total_lots, 2);
        assert_eq!(dataset.blocks[0].stats.dominant_use, "Residencial");
        assert_eq!(dataset.blocks[0].stats.dominant_typology, NOT_AVAILABLE);
        assert!(!dataset.has_typology);
    }

    #[tokio::test]
    async fn all_lots_scope_counts_unplaced_lots() {
        let config = CadastreConfig {
            aggregation_scope: AggregationScope::AllLots,
            ..CadastreConfig::default()
        };
        let loader = DataLoader::new(sample_source(), config);
        let dataset = loader.load_dataset().await.unwrap();

        assert_eq!(dataset.blocks[0].stats.total_lots, 3);
        assert_eq!(dataset.blocks[0].stats.use_counts["Misto"], 1);
        assert_eq!(dataset.lots.len(), 3);
    }

    #[tokio::test]
    async fn missing_columns_fail_before_any_output() {
        let config = CadastreConfig::default();
        let source = MockSource::default()
            .with_tab(&config.blocks_tab, json!([{"id": "B1", "latitude": 1.0}]));
        let loader = DataLoader::new(source, config);

        let err = loader.load_dataset().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::MissingColumns { ref columns, .. })
                if columns == &["longitude".to_string()]
        ));
    }

    #[tokio::test]
    async fn empty_lots_tab_is_rejected() {
        let config = CadastreConfig::default();
        let source = sample_source().with_tab(&config.lots_tab, json!([]));
        let loader = DataLoader::new(source, config);
        let err = loader.load_lots().await.unwrap_err();
        assert!(err.to_string().contains("lots"));
    }

    #[tokio::test]
    async fn source_errors_keep_their_kind() {
        let source = MockSource {
            deny: true,
            ..MockSource::default()
        };
        let loader = DataLoader::new(source, CadastreConfig::default());
        assert_eq!(
            loader.load_blocks().await.unwrap_err().kind(),
            ErrorKind::Permission
        );

        let loader = DataLoader::new(MockSource::default(), CadastreConfig::default());
        assert_eq!(
            loader.load_blocks().await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn cached_pipeline_reuses_and_invalidates() {
        let mut pipeline =
            CachedPipeline::new(DataLoader::new(sample_source(), CadastreConfig::default()));

        let first = pipeline.refresh().await.unwrap();
        let second = pipeline.refresh().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(pipeline.loader().source.fetches.load(Ordering::SeqCst), 2);

        pipeline.invalidate();
        pipeline.refresh().await.unwrap();
        assert_eq!(pipeline.loader().source.fetches.load(Ordering::SeqCst), 4);
        assert_eq!(pipeline.last_known(), Some(&first));
    }

    #[tokio::test]
    async fn zero_ttl_always_reloads() {
        let config = CadastreConfig {
            cache_ttl_secs: 0,
            ..CadastreConfig::default()
        };
        let mut pipeline = CachedPipeline::new(DataLoader::new(sample_source(), config));
        pipeline.refresh().await.unwrap();
        pipeline.refresh().await.unwrap();
        assert_eq!(pipeline.loader().source.fetches.load(Ordering::SeqCst), 4);
        assert_eq!(pipeline.cache.len(), 1);
        assert!(pipeline.last_known().is_some());
    }

    #[tokio::test]
    async fn changed_config_does_not_grow_the_cache_past_ttl() {
        let config = CadastreConfig {
            cache_ttl_secs: 0,
            ..CadastreConfig::default()
        };
        let mut pipeline = CachedPipeline::new(DataLoader::new(sample_source(), config));
        pipeline.refresh().await.unwrap();
        pipeline.loader.config.aggregation_scope = AggregationScope::AllLots;
        pipeline.refresh().await.unwrap();
        assert_eq!(pipeline.cache.len(), 1);
    }

    #[test]
    fn dataset_json_keeps_input_column_names() {
        let columns = ColumnMap {
            block_id: "id_bloco".to_string(),
            lot_block_id: "id_bloco".to_string(),
            use_type: "uso_lote".to_string(),
            ..ColumnMap::default()
        };
        let blocks = RowTable::new(
            BLOCKS_TABLE,
            serde_json::from_value(json!([
                {"id_bloco": "Q01", "latitude": -3.2, "longitude": -52.2, "total_lots": "x"},
            ]))
            .unwrap(),
        );
        let lots = RowTable::new(
            LOTS_TABLE,
            serde_json::from_value(json!([
                {"lot_id": "L1", "id_bloco": "Q01", "uso_lote": "Misto", "latitude": -3.2, "longitude": -52.2},
            ]))
            .unwrap(),
        );
        let dataset = refresh(blocks, lots, &columns, AggregationScope::PlottableLots);

        let text = serde_json::to_string(&dataset).unwrap();
        assert_eq!(text.matches("\"total_lots\"").count(), 1);

        let value: Value = serde_json::from_str(&text).unwrap();
        let block = &value["blocks"][0];
        assert_eq!(block["id_bloco"], json!("Q01"));
        assert!(block.get("id").is_none());
        assert_eq!(block["total_lots"], json!(1));
        assert_eq!(block["total_lots_x"], json!("x"));
        assert_eq!(block["use_counts"], json!({"Misto": 1}));

        let lot = &value["lots"][0];
        assert_eq!(lot["uso_lote"], json!("Misto"));
        assert_eq!(lot["id_bloco"], json!("Q01"));
        assert!(lot.get("typology").is_none());
        assert_eq!(value["has_typology"], json!(false));
    }

    #[test]
    fn refresh_drops_unplaced_blocks() {
        let columns = ColumnMap::default();
        let blocks = RowTable::new(
            BLOCKS_TABLE,
            serde_json::from_value(json!([
                {"id": "B1", "latitude": "-3.2", "longitude": "-52.2"},
                {"id": "B2", "latitude": "", "longitude": ""},
            ]))
            .unwrap(),
        );
        let lots = RowTable::new(
            LOTS_TABLE,
            serde_json::from_value(json!([
                {"lot_id": "L1", "block_id": "B1", "use_type": "Misto", "typology": "Casa", "latitude": 1, "longitude": 2},
            ]))
            .unwrap(),
        );
        let dataset = refresh(blocks, lots, &columns, AggregationScope::PlottableLots);
        assert_eq!(dataset.blocks.len(), 1);
        assert_eq!(dataset.blocks[0].block.latitude, Some(-3.2));
        assert_eq!(dataset.blocks[0].stats.dominant_typology, "Casa");
        assert!(dataset.has_typology);
    }
}
