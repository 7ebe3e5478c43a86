//! Importer contract tests against a counting mock transport.

use std::sync::Arc;

use devdata_core::testing::{MockFetcher, zip_bytes};
use devdata_core::{ImportError, Importer};
use devdata_unaids::{Dataset, Unaids, UnaidsConfig};

const CSV: &str = "Indicator,Unit,Subgroup,Area,Area ID,Time Period,Source,Data value,Formatted,Footnote\n\
    People living with HIV,Number,All ages estimate,Kenya,KEN,2022,UNAIDS_Estimates_,1400000,1 400 000,\n\
    People living with HIV,Number,All ages estimate,Kenya,KEN,2021,UNAIDS_Estimates_,1390000,1 390 000,\n";

fn config() -> UnaidsConfig {
    let mut config = UnaidsConfig::default();
    config.http.max_retries = 1;
    config.http.backoff_ms = 0;
    config
}

fn mock() -> Arc<MockFetcher> {
    Arc::new(
        MockFetcher::new()
            .on("Estimates_", zip_bytes(&[("Estimates.csv", CSV)]))
            .on("GAM_", zip_bytes(&[("GAM.csv", CSV), ("GAM_2.csv", CSV)])),
    )
}

#[test]
fn construction_does_no_io_and_disables_verification() {
    let fetcher = mock();
    let unaids = Unaids::with_fetcher(config(), fetcher.clone());
    assert!(!unaids.verify_ssl());
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn requests_skip_certificate_verification() {
    let fetcher = mock();
    let mut unaids = Unaids::with_fetcher(config(), fetcher.clone());
    unaids.get_data(&Dataset::Estimates).unwrap();
    assert!(fetcher.requests().iter().all(|r| !r.verify_ssl));
}

#[test]
fn datasets_are_cached_separately() {
    let fetcher = mock();
    let mut unaids = Unaids::with_fetcher(config(), fetcher.clone());

    let first = unaids.get_data(&Dataset::Estimates).unwrap();
    let second = unaids.get_data(&Dataset::Estimates).unwrap();
    let indicators = unaids.get_metadata(&Dataset::Estimates).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.num_rows(), 2);
    assert_eq!(indicators.num_rows(), 1);
    assert_eq!(fetcher.calls(), 1);

    // not published in the mock: 404 is not retried
    let err = unaids.get_data(&Dataset::KeyPopulations).unwrap_err();
    assert!(matches!(err, ImportError::SourceUnavailable { .. }), "{err}");
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn clear_cache_forces_refetch() {
    let fetcher = mock();
    let mut unaids = Unaids::with_fetcher(config(), fetcher.clone());
    unaids.get_data(&Dataset::Estimates).unwrap();
    unaids.clear_cache();
    unaids.get_data(&Dataset::Estimates).unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn archive_with_two_csv_files_is_data_format() {
    let fetcher = mock();
    let mut unaids = Unaids::with_fetcher(config(), fetcher.clone());
    let err = unaids.get_data(&Dataset::Gam).unwrap_err();
    assert!(matches!(err, ImportError::DataFormat { .. }), "{err}");
    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn timeouts_exhaust_retries_without_caching() {
    let fetcher = Arc::new(MockFetcher::new().on_timeout("aidsinfo"));
    let mut unaids = Unaids::with_fetcher(config(), fetcher.clone());
    let err = unaids.get_data(&Dataset::Estimates).unwrap_err();
    assert!(matches!(err, ImportError::SourceUnavailable { .. }), "{err}");
    assert_eq!(fetcher.calls(), 2);
    unaids.get_data(&Dataset::Estimates).unwrap_err();
    assert_eq!(fetcher.calls(), 4);
}

#[test]
#[ignore = "downloads from AIDSinfo"]
fn live_estimates() {
    let mut unaids = Unaids::new();
    assert!(unaids.get_data(&Dataset::Estimates).unwrap().num_rows() > 0);
}
