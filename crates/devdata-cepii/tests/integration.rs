//! BACI importer against a mocked CEPII site.

use std::sync::Arc;

use arrow::array::{Array, Int64Array, StringArray};
use devdata_cepii::{Baci, BaciConfig, BaciQuery, BaciRelease, Filter};
use devdata_core::testing::{MockFetcher, zip_bytes};
use devdata_core::{ImportError, Importer};

const PAGE: &str = r#"<html><body>
    <div class="content_box">
        <div class="titre-rubrique">Download</div>
        <p>This is the 202501 version. Available classifications: HS22, HS17.</p>
    </div>
    <div class="content_box">
        <div class="titre-rubrique">Archives</div>
        <p>202401b version: HS22 HS17 HS12</p>
        <p>202401 version: HS96</p>
    </div>
</body></html>"#;

const README: &str = "Version: 202501\n\nRelease Date: 2025 01 30\n\n\
    Content:\nBilateral trade flows\nat the product level.\n";

fn archive() -> Vec<u8> {
    zip_bytes(&[
        (
            "country_codes_V202501.csv",
            "country_code,country_name,country_iso2,country_iso3\n4,Afghanistan,AF,AFG\n566,Nigeria,NG,NGA\n",
        ),
        ("product_codes_HS22_V202501.csv", "code,description\n010121,Horses\n520100,Cotton\n"),
        ("Readme.txt", README),
        (
            "BACI_HS22_Y2021_V202501.csv",
            "t,i,j,k,v,q\n2021,4,566,010121,10.5,2\n2021,566,4,520100,3,NA\n",
        ),
        ("BACI_HS22_Y2022_V202501.csv", "t,i,j,k,v,q\n2022,4,566,520100,7,1\n2022,4,999,520100,1,1\n"),
    ])
}

fn config() -> BaciConfig {
    let mut config = BaciConfig {
        page_url: "https://cepii.test/baci".to_string(),
        download_url: "https://cepii.test/data".to_string(),
        ..BaciConfig::default()
    };
    config.http.max_retries = 0;
    config
}

fn mock() -> Arc<MockFetcher> {
    Arc::new(
        MockFetcher::new()
            .on("cepii.test/baci", PAGE)
            .on("BACI_HS22_V202501.zip", archive()),
    )
}

fn total_rows(baci: &mut Baci, query: &BaciQuery) -> usize {
    baci.get_data(query).unwrap().num_rows()
}

#[test]
fn construction_does_no_io() {
    let fetcher = mock();
    let _baci = Baci::with_fetcher(config(), fetcher.clone());
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn downloads_once_and_scans_cached_parquet() {
    let fetcher = mock();
    let mut baci = Baci::with_fetcher(config(), fetcher.clone());

    let all = baci.get_data(&BaciQuery::default()).unwrap();
    assert_eq!(all.num_rows(), 4);
    assert_eq!(all.schema(), baci.schema());
    assert_eq!(fetcher.calls_matching("cepii.test/baci"), 1);
    assert_eq!(fetcher.calls_matching(".zip"), 1);
    assert!(fetcher.requests()[1].url.ends_with("/data/BACI_HS22_V202501.zip"));

    assert_eq!(total_rows(&mut baci, &BaciQuery::default().years(Filter::Single(2022))), 2);
    assert_eq!(total_rows(&mut baci, &BaciQuery::default().products(Filter::Single(10121))), 1);
    assert_eq!(
        total_rows(
            &mut baci,
            &BaciQuery::default()
                .years(Filter::Range(2021, 2022))
                .products(Filter::List(vec![520100]))
        ),
        3
    );
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn labels_join_code_lists() {
    let mut baci = Baci::with_fetcher(config(), mock());
    let batch = baci
        .get_data(&BaciQuery::default().years(Filter::Single(2022)).with_labels())
        .unwrap();
    assert_eq!(batch.num_rows(), 2);

    let strings = |name: &str| {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .cloned()
            .unwrap()
    };
    assert_eq!(strings("exporter_iso3_code").value(0), "AFG");
    assert_eq!(strings("importer_name").value(0), "Nigeria");
    assert_eq!(strings("product_description").value(0), "Cotton");
    // 999 is not in the country list
    assert!(strings("importer_iso3_code").is_null(1));
    assert!(strings("importer_name").is_null(1));

    let exporters = batch
        .column_by_name("exporter_code")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .unwrap();
    assert_eq!(exporters.value(0), 4);
}

#[test]
fn unknown_years_yield_no_rows() {
    let fetcher = mock();
    let mut baci = Baci::with_fetcher(config(), fetcher);
    let batch = baci
        .get_data(&BaciQuery::default().years(Filter::List(vec![1995, 2021])))
        .unwrap();
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(total_rows(&mut baci, &BaciQuery::default().years(Filter::Single(1995))), 0);
}

#[test]
fn invalid_requests_fail_before_download() {
    let fetcher = mock();
    let mut baci = Baci::with_fetcher(config(), fetcher.clone());

    let err = baci
        .get_data(&BaciQuery::default().years(Filter::Range(2022, 2020)))
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidRequest(_)));
    assert_eq!(fetcher.calls(), 0);

    let query = BaciQuery {
        release: BaciRelease::new("HS22", "199901"),
        ..BaciQuery::default()
    };
    let err = baci.get_data(&query).unwrap_err();
    assert!(matches!(err, ImportError::InvalidRequest(_)), "{err}");

    let query = BaciQuery {
        release: BaciRelease::new("96", "latest"),
        ..BaciQuery::default()
    };
    let err = baci.get_data(&query).unwrap_err();
    assert!(err.to_string().contains("HS96 is not available"));
    assert_eq!(fetcher.calls_matching(".zip"), 0);
}

#[test]
fn versions_are_scraped_once() {
    let fetcher = mock();
    let mut baci = Baci::with_fetcher(config(), fetcher.clone());
    let versions = baci.available_versions().unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(versions["202401b"].hs_versions, ["HS22", "HS17", "HS12"]);
    assert_eq!(baci.latest_version().unwrap(), "202501");
    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn metadata_and_code_lists() {
    let fetcher = mock();
    let mut baci = Baci::with_fetcher(config(), fetcher.clone());
    let release = BaciRelease::default();

    let metadata = baci.get_metadata(&release).unwrap();
    assert_eq!(metadata["Version"], "202501");
    assert_eq!(metadata["Content"], "Bilateral trade flows at the product level.");
    assert_eq!(baci.available_years(&release).unwrap(), [2021, 2022]);
    assert_eq!(baci.available_countries(&release).unwrap().num_rows(), 2);
    assert_eq!(baci.product_descriptions(&release).unwrap().num_rows(), 2);
    assert_eq!(fetcher.calls_matching(".zip"), 1);
}

#[test]
fn clear_cache_deletes_parquet_and_refetches() {
    let fetcher = mock();
    let dir = tempfile::TempDir::new().unwrap();
    let config = BaciConfig {
        cache_dir: Some(dir.path().to_path_buf()),
        ..config()
    };
    let mut baci = Baci::with_fetcher(config, fetcher.clone());

    baci.get_data(&BaciQuery::default()).unwrap();
    let entries = || std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries(), 1);

    baci.clear_cache();
    assert_eq!(entries(), 0);

    assert_eq!(total_rows(&mut baci, &BaciQuery::default()), 4);
    assert_eq!(fetcher.calls_matching("cepii.test/baci"), 2);
    assert_eq!(fetcher.calls_matching(".zip"), 2);
}

#[test]
fn shared_cache_dir_reuses_downloaded_archive() {
    let fetcher = mock();
    let dir = tempfile::TempDir::new().unwrap();
    let config = || BaciConfig {
        cache_dir: Some(dir.path().to_path_buf()),
        ..config()
    };

    let mut first = Baci::with_fetcher(config(), fetcher.clone());
    assert_eq!(total_rows(&mut first, &BaciQuery::default()), 4);
    drop(first);

    let mut second = Baci::with_fetcher(config(), fetcher.clone());
    assert_eq!(total_rows(&mut second, &BaciQuery::default()), 4);
    assert_eq!(second.available_years(&BaciRelease::default()).unwrap(), vec![2021, 2022]);
    assert_eq!(fetcher.calls_matching(".zip"), 1);
    // the version page is still read to resolve "latest"
    assert_eq!(fetcher.calls_matching("cepii.test/baci"), 2);
}

#[test]
fn save_raw_data_copies_archive() {
    let dir = tempfile::TempDir::new().unwrap();
    let bytes = archive();
    let fetcher = Arc::new(
        MockFetcher::new()
            .on("cepii.test/baci", PAGE)
            .on("BACI_HS22_V202501.zip", bytes.clone()),
    );
    let mut baci = Baci::with_fetcher(config(), fetcher);
    let release = BaciRelease::default();
    let target = dir.path().join("baci.zip");

    let saved = baci.save_raw_data(&release, &target, false).unwrap();
    assert_eq!(std::fs::read(&saved).unwrap(), bytes);

    let err = baci.save_raw_data(&release, &target, false).unwrap_err();
    assert!(matches!(err, ImportError::InvalidRequest(_)));
    assert!(baci.save_raw_data(&release, &target, true).is_ok());
}

#[test]
fn broken_archive_is_format_error_and_not_cached() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .on("cepii.test/baci", PAGE)
            .on("BACI_HS22_V202501.zip", "not a zip"),
    );
    let mut baci = Baci::with_fetcher(config(), fetcher.clone());
    let err = baci.get_data(&BaciQuery::default()).unwrap_err();
    assert!(matches!(err, ImportError::DataFormat { .. }), "{err}");

    assert!(baci.get_data(&BaciQuery::default()).is_err());
    assert_eq!(fetcher.calls_matching(".zip"), 2);
}

#[test]
fn unreachable_site_is_source_unavailable() {
    let fetcher = Arc::new(MockFetcher::new().on_status("cepii.test", 503));
    let mut baci = Baci::with_fetcher(config(), fetcher);
    let err = baci.get_data(&BaciQuery::default()).unwrap_err();
    assert!(matches!(err, ImportError::SourceUnavailable { .. }), "{err}");
}

#[test]
#[ignore = "downloads a multi-gigabyte archive from cepii.fr"]
fn live_latest_release() {
    let mut baci = Baci::new();
    let versions = baci.available_versions().unwrap();
    assert!(!versions.is_empty());
    let batch = baci
        .get_data(&BaciQuery::default().products(Filter::Single(10121)).with_labels())
        .unwrap();
    assert!(batch.num_rows() > 0);
}
