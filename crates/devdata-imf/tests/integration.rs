//! Importer contract tests against a counting mock transport.

use std::sync::Arc;

use chrono::NaiveDate;
use devdata_core::testing::MockFetcher;
use devdata_core::{ImportError, Importer};
use devdata_imf::{Dsa, DsaConfig, Month, Release, Weo, WeoConfig, WeoVersion};

const WEO_TSV: &str = "WEO Country Code\tISO\tWEO Subject Code\tCountry\tSubject Descriptor\tSubject Notes\tUnits\tScale\tCountry/Series-specific Notes\t2022\t2023\tEstimates Start After\n\
    664\tKEN\tNGDP_RPCH\tKenya\tGross domestic product, constant prices\tAnnual percentages\tPercent change\t\t\t4.852\t5.6\t2022\n\
    664\tKEN\tLUR\tKenya\tUnemployment rate\tPercent of labor force\tPercent of total labor force\t\t\tn/a\t5.7\t2022\n";

fn config() -> WeoConfig {
    let mut config = WeoConfig::default();
    config.base_url = "https://weo.test".to_string();
    config.reference_date = NaiveDate::from_ymd_opt(2024, 5, 10);
    config.http.max_retries = 0;
    config
}

fn weo(fetcher: Arc<MockFetcher>) -> Weo {
    Weo::with_fetcher(config(), fetcher)
}

#[test]
fn construction_does_no_io() {
    let fetcher = Arc::new(MockFetcher::new());
    let _weo = weo(fetcher.clone());
    let _dsa = Dsa::with_fetcher(DsaConfig::default(), fetcher.clone());
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn latest_skips_unpublished_release() {
    // April 2024 is not out yet at either location; October 2023 is.
    let fetcher = Arc::new(MockFetcher::new().on("WEOOct2023all.ashx", WEO_TSV));
    let mut weo = weo(fetcher.clone());

    let batch = weo.get_data(&WeoVersion::Latest).unwrap();
    assert_eq!(batch.num_rows(), 3);
    assert_eq!(weo.latest_release(), Some(Release::new(Month::October, 2023)));
    assert_eq!(fetcher.calls_matching("WEOApr2024all"), 2);
    assert_eq!(fetcher.calls(), 3);
}

#[test]
fn repeated_requests_hit_the_cache() {
    let fetcher = Arc::new(MockFetcher::new().on("WEOApr2024all.ashx", WEO_TSV));
    let mut weo = weo(fetcher.clone());

    let first = weo.get_data(&WeoVersion::Latest).unwrap();
    let calls = fetcher.calls();
    let second = weo.get_data(&WeoVersion::Latest).unwrap();
    let explicit = weo
        .get_data(&Release::new(Month::April, 2024).into())
        .unwrap();
    let metadata = weo.get_metadata(&WeoVersion::Latest).unwrap();

    assert_eq!(fetcher.calls(), calls);
    assert_eq!(first, second);
    assert_eq!(first, explicit);
    assert_eq!(metadata.num_rows(), 2);
}

#[test]
fn clear_cache_forces_refetch() {
    let fetcher = Arc::new(MockFetcher::new().on("WEOApr2024all.ashx", WEO_TSV));
    let mut weo = weo(fetcher.clone());

    weo.get_data(&WeoVersion::Latest).unwrap();
    let calls = fetcher.calls();
    weo.clear_cache();
    assert!(weo.cached_releases().is_empty());
    weo.get_data(&WeoVersion::Latest).unwrap();
    assert_eq!(fetcher.calls(), calls * 2);
}

#[test]
fn releases_out_of_range_are_rejected_without_io() {
    let fetcher = Arc::new(MockFetcher::new());
    let mut weo = weo(fetcher.clone());

    for release in [Release::new(Month::April, 2005), Release::new(Month::October, 2024)] {
        let err = weo.get_data(&release.into()).unwrap_err();
        assert!(matches!(err, ImportError::InvalidRequest(_)), "{err}");
    }
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn timeouts_exhaust_retries() {
    let fetcher = Arc::new(MockFetcher::new().on_timeout("weo.test"));
    let mut config = config();
    config.http.max_retries = 2;
    config.http.backoff_ms = 0;
    let mut weo = Weo::with_fetcher(config, fetcher.clone());

    let err = weo
        .get_data(&Release::new(Month::October, 2023).into())
        .unwrap_err();
    assert!(matches!(err, ImportError::SourceUnavailable { .. }), "{err}");
    assert_eq!(fetcher.calls(), 3);

    // failures are not cached
    weo.get_data(&Release::new(Month::October, 2023).into())
        .unwrap_err();
    assert_eq!(fetcher.calls(), 6);
}

#[test]
fn unexpected_payload_is_data_format() {
    let fetcher = Arc::new(
        MockFetcher::new().on("WEOApr2024all.ashx", "<html><body>Moved</body></html>"),
    );
    let mut weo = weo(fetcher);
    let err = weo.get_data(&WeoVersion::Latest).unwrap_err();
    assert!(matches!(err, ImportError::DataFormat { .. }), "{err}");
}

#[test]
fn dsa_failures_surface_as_error_kinds() {
    let fetcher = Arc::new(MockFetcher::new().on("DSAlist.pdf", "this is not a pdf"));
    let mut dsa = Dsa::with_fetcher(DsaConfig::default(), fetcher.clone());
    let err = dsa.get_data(&()).unwrap_err();
    assert!(matches!(err, ImportError::DataFormat { .. }), "{err}");

    let mut config = DsaConfig::default();
    config.http.max_retries = 0;
    let mut dsa = Dsa::with_fetcher(config, Arc::new(MockFetcher::new().on_status("DSAlist", 503)));
    let err = dsa.get_data(&()).unwrap_err();
    assert!(matches!(err, ImportError::SourceUnavailable { .. }), "{err}");
}

#[test]
fn dsa_metadata_needs_no_io() {
    let fetcher = Arc::new(MockFetcher::new());
    let mut dsa = Dsa::with_fetcher(DsaConfig::default(), fetcher.clone());
    let metadata = dsa.get_metadata(&()).unwrap();
    assert_eq!(metadata.num_rows(), 3);
    assert_eq!(fetcher.calls(), 0);
}

#[test]
#[ignore = "hits the IMF website"]
fn live_latest_weo() {
    let mut weo = Weo::new();
    let batch = weo.get_data(&WeoVersion::Latest).unwrap();
    assert!(batch.num_rows() > 10_000);
}
