//! World Bank indicator importer

use std::sync::Arc;

use arrow::array::{Array, BooleanArray, RecordBatch};
use arrow::datatypes::SchemaRef;
use devdata_core::table::{concat, filter_rows, float64_column, int32_column, string_column};
use devdata_core::progress::fmt_num;
use devdata_core::{
    CacheSlot, Cell, Fetcher, Harmonizer, ImportError, Importer, KeyedCache, RawTable, Result,
    SharedProgress, SourceClient, WorkerPool, batches, default_fetcher, global_progress,
};
use rustc_hash::FxHashSet;

use crate::api::{self, PROVIDER};
use crate::config::{Config, IDS};
use crate::query::{DataKey, Query, ResolvedQuery};
use crate::schema::{self, IS_AGGREGATE};

/// Indicators per metadata request
const METADATA_BATCH: usize = 50;

/// Importer for the World Bank data API (WDI, IDS and the other databases).
///
/// Data is cached per indicator under the parameters that shape its rows, so
/// asking for a subset of already-fetched indicators issues no request.
pub struct WorldBank {
    config: Config,
    client: SourceClient,
    counterparts: bool,
    progress: SharedProgress,
    data: KeyedCache<DataKey, RecordBatch>,
    metadata: KeyedCache<(u32, String), RecordBatch>,
    databases: CacheSlot<RecordBatch>,
    entities: CacheSlot<RecordBatch>,
    indicators: CacheSlot<RecordBatch>,
}

impl std::fmt::Debug for WorldBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldBank")
            .field("config", &self.config)
            .field("cached_indicators", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Default for WorldBank {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldBank {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_fetcher(config, default_fetcher())
    }

    /// Construct with an explicit transport. No request is made here.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Self {
        let client = SourceClient::with_fetcher(PROVIDER, fetcher).http_config(&config.http);
        Self {
            counterparts: config.database == IDS,
            config,
            client,
            progress: global_progress(),
            data: KeyedCache::new(),
            metadata: KeyedCache::new(),
            databases: CacheSlot::new(),
            entities: CacheSlot::new(),
            indicators: CacheSlot::new(),
        }
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> u32 {
        self.config.database
    }

    /// Request counterpart areas (International Debt Statistics layout).
    pub(crate) fn counterpart_areas(mut self, enabled: bool) -> Self {
        self.counterparts = enabled;
        self
    }

    fn harmonizer(&self) -> &'static Harmonizer {
        if self.counterparts {
            &*schema::COUNTERPART_DATA
        } else {
            &*schema::DATA
        }
    }

    /// Switch database. The id must appear in [`Self::get_databases`].
    pub fn set_database(&mut self, database: u32) -> Result<()> {
        if database == self.config.database {
            return Ok(());
        }
        let known = self.get_databases()?;
        let ids = known
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<arrow::array::Int64Array>())
            .map(|ids| ids.iter().flatten().any(|id| id == database as i64))
            .unwrap_or(false);
        if !ids {
            return Err(ImportError::invalid(format!(
                "unknown {PROVIDER} database id {database}"
            )));
        }
        log::info!("{PROVIDER}: switching to database {database}");
        self.config.database = database;
        self.counterparts = database == IDS;
        self.data.clear();
        self.indicators.clear();
        Ok(())
    }

    /// Fetch the indicators not yet cached, batch by batch on the worker pool.
    ///
    /// All-or-nothing: the caller caches the result only when every batch
    /// succeeded.
    fn fetch_indicators(
        &self,
        query: &ResolvedQuery,
        codes: &[String],
    ) -> Result<Vec<(String, RecordBatch)>> {
        let pool = WorkerPool::new(self.config.workers)?;
        let groups = batches(codes, self.config.batch_size);
        log::info!(
            "{PROVIDER}: fetching {} indicator(s) in {} batch(es)",
            codes.len(),
            groups.len()
        );

        let bar = self.progress.count_bar("world bank", groups.len() as u64);
        let (client, config) = (&self.client, &self.config);
        let (harmonizer, counterparts) = (self.harmonizer(), self.counterparts);
        let results = pool.map_ordered(&groups, |group| {
            let result = fetch_batch(client, config, harmonizer, query, group, counterparts);
            bar.inc(1);
            result
        });
        bar.finish_and_clear();

        let mut out = Vec::with_capacity(codes.len());
        for result in results {
            out.extend(result?);
        }
        Ok(out)
    }

    fn aggregate_codes(&mut self) -> Result<FxHashSet<String>> {
        let entities = self.load_entities()?;
        let (Some(codes), Some(flags)) = (
            string_column(entities, devdata_core::fields::ENTITY_CODE),
            entities
                .column_by_name(IS_AGGREGATE)
                .and_then(|c| c.as_any().downcast_ref::<BooleanArray>()),
        ) else {
            return Err(ImportError::format(PROVIDER, "entity list without aggregate flags"));
        };
        Ok((0..entities.num_rows())
            .filter(|&i| flags.is_valid(i) && flags.value(i))
            .map(|i| codes.value(i).to_string())
            .collect())
    }

    fn load_entities(&mut self) -> Result<&RecordBatch> {
        let (client, config) = (&self.client, &self.config);
        self.entities.get_or_try_insert_with(|| {
            let items = api::fetch_list(client, config, "country")?;
            schema::ENTITIES.apply(&entity_table(&items))
        })
    }

    /// Economies and aggregates known to the API.
    pub fn get_entities(&mut self, skip_aggregates: bool) -> Result<RecordBatch> {
        let entities = self.load_entities()?.clone();
        if !skip_aggregates {
            return Ok(entities);
        }
        let flags = entities
            .column_by_name(IS_AGGREGATE)
            .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
            .cloned()
            .ok_or_else(|| ImportError::format(PROVIDER, "entity list without aggregate flags"))?;
        filter_rows(&entities, |i| !(flags.is_valid(i) && flags.value(i)))
    }

    /// Databases (sources) served by the API.
    pub fn get_databases(&mut self) -> Result<RecordBatch> {
        let (client, config) = (&self.client, &self.config);
        self.databases
            .get_or_try_insert_with(|| {
                let items = api::fetch_list(client, config, "sources")?;
                let raw = api::flatten(
                    &items,
                    &["id", "name", "code", "lastupdated", "dataavailability", "metadataavailability"],
                );
                schema::DATABASES.apply(&raw)
            })
            .cloned()
    }

    /// Series available in the current database.
    pub fn get_indicators(&mut self) -> Result<RecordBatch> {
        let (client, config) = (&self.client, &self.config);
        self.indicators
            .get_or_try_insert_with(|| schema::INDICATORS.apply(&api::fetch_series_list(client, config)?))
            .cloned()
    }

    fn apply_row_filters(&mut self, table: RecordBatch, query: &Query) -> Result<RecordBatch> {
        let mut table = table;
        if query.skip_blanks {
            let values = float_values(&table)?;
            table = filter_rows(&table, |i| values.is_valid(i))?;
        }
        if query.skip_aggregates {
            let aggregates = self.aggregate_codes()?;
            let codes = string_column(&table, devdata_core::fields::ENTITY_CODE)
                .cloned()
                .ok_or_else(|| ImportError::format(PROVIDER, "data without entity codes"))?;
            table = filter_rows(&table, |i| !aggregates.contains(codes.value(i)))?;
        }
        Ok(table)
    }
}

fn float_values(table: &RecordBatch) -> Result<arrow::array::Float64Array> {
    float64_column(table, devdata_core::fields::VALUE)
        .cloned()
        .ok_or_else(|| ImportError::format(PROVIDER, "data without a value column"))
}

/// `/country` items with an aggregate flag derived from the region.
fn entity_table(items: &[serde_json::Value]) -> RawTable {
    let flat = api::flatten(items, schema::ENTITY_PATHS);
    let region = flat.column_index("region/value");
    let mut columns = flat.columns().to_vec();
    columns.push(IS_AGGREGATE.to_string());
    let rows = flat
        .rows()
        .iter()
        .map(|row| {
            let aggregate = region
                .and_then(|i| row[i].as_str())
                .is_some_and(|r| r == "Aggregates");
            let mut row = row.clone();
            row.push(Cell::Bool(aggregate));
            row
        })
        .collect();
    RawTable::new(columns, rows)
}

/// Fetch and harmonize one batch, then split it per indicator.
fn fetch_batch(
    client: &SourceClient,
    config: &Config,
    harmonizer: &Harmonizer,
    query: &ResolvedQuery,
    codes: &[String],
    counterparts: bool,
) -> Result<Vec<(String, RecordBatch)>> {
    let raw = api::fetch_data(client, config, codes, query, counterparts)?;
    let mut table = harmonizer.apply(&raw)?;

    // The path may say "all" for long ranges
    if let Some(range) = &query.time {
        let years = int32_column(&table, devdata_core::fields::YEAR)
            .cloned()
            .ok_or_else(|| ImportError::format(PROVIDER, "data without a year column"))?;
        table = filter_rows(&table, |i| range.contains(&years.value(i)))?;
    }

    let indicator = string_column(&table, devdata_core::fields::INDICATOR_CODE)
        .cloned()
        .ok_or_else(|| ImportError::format(PROVIDER, "data without indicator codes"))?;
    codes
        .iter()
        .map(|code| {
            let part = filter_rows(&table, |i| indicator.value(i).eq_ignore_ascii_case(code))?;
            Ok((code.clone(), part))
        })
        .collect()
}

impl Importer for WorldBank {
    type Query = Query;
    type MetadataQuery = Vec<String>;
    type Metadata = RecordBatch;

    fn source(&self) -> &'static str {
        PROVIDER
    }

    fn schema(&self) -> SchemaRef {
        self.harmonizer().schema()
    }

    fn get_data(&mut self, query: &Query) -> Result<RecordBatch> {
        let resolved = query.resolve()?;
        let db = self.config.database;

        let missing: Vec<String> = resolved
            .indicators
            .iter()
            .filter(|code| !self.data.contains(&resolved.key(db, code)))
            .cloned()
            .collect();
        if missing.is_empty() {
            log::debug!("{PROVIDER}: serving {} indicator(s) from cache", resolved.indicators.len());
        } else {
            let fetched = self.fetch_indicators(&resolved, &missing)?;
            for (code, batch) in fetched {
                if batch.num_rows() == 0 {
                    log::warn!("{PROVIDER}: no data returned for indicator {code}");
                }
                self.data.insert(resolved.key(db, &code), batch);
            }
        }

        let parts: Vec<RecordBatch> = resolved
            .indicators
            .iter()
            .filter_map(|code| self.data.get(&resolved.key(db, code)))
            .filter(|batch| batch.num_rows() > 0)
            .cloned()
            .collect();
        if parts.is_empty() {
            return Err(ImportError::empty(
                PROVIDER,
                format!("no data for {}", resolved.indicators.join(", ")),
            ));
        }

        let table = concat(&self.schema(), &parts)?;
        let table = self.apply_row_filters(table, query)?;
        log::info!("{PROVIDER}: {} rows", fmt_num(table.num_rows()));
        Ok(table)
    }

    fn get_metadata(&mut self, indicators: &Vec<String>) -> Result<RecordBatch> {
        let db = self.config.database;
        let mut codes: Vec<String> = Vec::new();
        for code in indicators.iter().map(|c| c.trim()) {
            if code.is_empty() {
                return Err(ImportError::invalid("empty indicator code"));
            }
            if !codes.iter().any(|c| c == code) {
                codes.push(code.to_string());
            }
        }
        if codes.is_empty() {
            return Err(ImportError::invalid("at least one indicator is required"));
        }

        let missing: Vec<String> = codes
            .iter()
            .filter(|c| !self.metadata.contains(&(db, c.to_string())))
            .cloned()
            .collect();
        let mut fetched = Vec::new();
        for group in batches(&missing, METADATA_BATCH) {
            let raw = api::fetch_series_metadata(&self.client, &self.config, &group)?;
            let table = schema::METADATA.apply(&raw)?;
            let ids = string_column(&table, devdata_core::fields::INDICATOR_CODE)
                .cloned()
                .ok_or_else(|| ImportError::format(PROVIDER, "metadata without indicator codes"))?;
            for code in &group {
                let row = filter_rows(&table, |i| ids.value(i).eq_ignore_ascii_case(code))?;
                if row.num_rows() > 0 {
                    fetched.push((code.clone(), row));
                }
            }
        }
        for (code, row) in fetched {
            self.metadata.insert((db, code), row);
        }

        let mut parts = Vec::with_capacity(codes.len());
        let mut absent = Vec::new();
        for code in &codes {
            match self.metadata.get(&(db, code.clone())) {
                Some(row) => parts.push(row.clone()),
                None => absent.push(code.as_str()),
            }
        }
        if !absent.is_empty() {
            return Err(ImportError::empty(
                PROVIDER,
                format!("no metadata for {}", absent.join(", ")),
            ));
        }
        concat(&schema::METADATA.schema(), &parts)
    }

    fn clear_cache(&mut self) {
        self.data.clear();
        self.metadata.clear();
        self.databases.clear();
        self.entities.clear();
        self.indicators.clear();
        log::info!("{PROVIDER}: cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aggregates_flagged_from_region() {
        let items = vec![
            json!({"id": "KEN", "name": "Kenya", "region": {"id": "SSF", "value": "Sub-Saharan Africa "}}),
            json!({"id": "AFE", "name": "Africa Eastern and Southern", "region": {"id": "NA", "value": "Aggregates"}}),
        ];
        let table = schema::ENTITIES.apply(&entity_table(&items)).unwrap();
        let flags = table
            .column_by_name(IS_AGGREGATE)
            .unwrap()
            .as_any()
            .downcast_ref::<BooleanArray>()
            .unwrap();
        assert!(!flags.value(0));
        assert!(flags.value(1));
        let regions = string_column(&table, devdata_core::fields::REGION_CODE).unwrap();
        assert_eq!(regions.value(1), "NA");
    }

    #[test]
    fn construction_uses_counterparts_for_debt_database() {
        let wb = WorldBank::with_config(Config::default().database(IDS));
        assert!(wb.counterparts);
        assert_eq!(wb.schema().fields().len(), schema::counterpart_data().fields().len());
        assert!(!WorldBank::new().counterparts);
    }
}
