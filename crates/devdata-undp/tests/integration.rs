//! Importer contract tests against a counting mock transport.

use std::sync::Arc;

use devdata_core::testing::{MockFetcher, xlsx_bytes};
use devdata_core::{ImportError, Importer};
use devdata_undp::{HdiConfig, HumanDevelopmentIndex};

const CSV: &str = "iso3,country,region,hdicode,hdi_2021,hdi_2022\n\
    KEN,Kenya,SSA,Medium,0.575,0.601\n\
    NOR,Norway,,Very High,0.961,0.966\n";

fn metadata() -> Vec<u8> {
    let rows: &[&[&str]] = &[
        &["Full name", "Short name", "Time series", "Note"],
        &["Human Development Index", "hdi", "1990-2022", ""],
    ];
    xlsx_bytes(&[("Sheet1", rows)])
}

fn config() -> HdiConfig {
    let mut config = HdiConfig::default();
    config.http.max_retries = 0;
    config
}

fn mock() -> Arc<MockFetcher> {
    Arc::new(
        MockFetcher::new()
            .on("complete_time_series.csv", CSV)
            .on("metadata.xlsx", metadata()),
    )
}

#[test]
fn construction_does_no_io() {
    let fetcher = mock();
    let _hdi = HumanDevelopmentIndex::with_fetcher(config(), fetcher.clone());
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn data_pulls_metadata_once() {
    let fetcher = mock();
    let mut hdi = HumanDevelopmentIndex::with_fetcher(config(), fetcher.clone());

    let data = hdi.get_data(&()).unwrap();
    assert_eq!(data.num_rows(), 4);
    assert_eq!(fetcher.calls(), 2);

    hdi.get_metadata(&()).unwrap();
    hdi.get_data(&()).unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn metadata_alone_skips_data_download() {
    let fetcher = mock();
    let mut hdi = HumanDevelopmentIndex::with_fetcher(config(), fetcher.clone());
    assert_eq!(hdi.get_metadata(&()).unwrap().num_rows(), 1);
    assert_eq!(fetcher.calls_matching(".csv"), 0);
}

#[test]
fn clear_cache_forces_refetch() {
    let fetcher = mock();
    let mut hdi = HumanDevelopmentIndex::with_fetcher(config(), fetcher.clone());
    hdi.get_data(&()).unwrap();
    hdi.clear_cache();
    hdi.get_data(&()).unwrap();
    assert_eq!(fetcher.calls(), 4);
}

#[test]
fn failed_data_download_keeps_metadata_only() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .on_timeout("complete_time_series.csv")
            .on("metadata.xlsx", metadata()),
    );
    let mut hdi = HumanDevelopmentIndex::with_fetcher(config(), fetcher.clone());
    let err = hdi.get_data(&()).unwrap_err();
    assert!(matches!(err, ImportError::SourceUnavailable { .. }), "{err}");

    hdi.get_data(&()).unwrap_err();
    assert_eq!(fetcher.calls_matching("metadata.xlsx"), 1);
    assert_eq!(fetcher.calls_matching(".csv"), 2);
}

#[test]
#[ignore = "downloads the HDR files"]
fn live_hdi() {
    let mut hdi = HumanDevelopmentIndex::new();
    assert!(hdi.get_data(&()).unwrap().num_rows() > 10_000);
}
