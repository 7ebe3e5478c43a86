//! Building importers from the shared [`Settings`] file.

use std::sync::Arc;

use devdata_cepii::{Baci, BaciConfig};
use devdata_core::{Fetcher, HttpConfig, Settings, default_fetcher, global_progress, init_logging};
use devdata_imf::{Dsa, DsaConfig, Weo, WeoConfig};
use devdata_unaids::{Unaids, UnaidsConfig};
use devdata_undp::{HdiConfig, HumanDevelopmentIndex};
use devdata_wfp::{WfpConfig, WfpFoodSecurity, WfpInflation};
use devdata_who::{Ghed, GhedConfig};
use devdata_worldbank::{Config as WorldBankConfig, IDS, InternationalDebtStatistics, WorldBank};

/// Importer that can be configured from [`Settings`].
pub trait FromSettings: Sized {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self;
}

/// Importer configured from `settings`, fetching over HTTP. No request is made.
pub fn from_settings<T: FromSettings>(settings: &Settings) -> T {
    T::from_settings_with(settings, default_fetcher())
}

/// Install the logger, drawing above progress bars on a terminal.
pub fn init(settings: &Settings, quiet: bool, debug: bool) -> anyhow::Result<()> {
    let progress = global_progress();
    let multi = progress.is_tty().then(|| progress.multi());
    init_logging(quiet, debug, multi)?;
    log::debug!(
        "http timeout {}s, {} retries, {} worker(s)",
        settings.http.timeout_secs,
        settings.http.max_retries,
        settings.workers.threads
    );
    Ok(())
}

/// Shared settings, keeping a source's own SSL exception.
fn http(settings: &Settings, source_default: &HttpConfig) -> HttpConfig {
    HttpConfig {
        verify_ssl: settings.http.verify_ssl && source_default.verify_ssl,
        ..settings.http.clone()
    }
}

impl FromSettings for Weo {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        let default = WeoConfig::default();
        let config = WeoConfig {
            http: http(settings, &default.http),
            ..default
        };
        Weo::with_fetcher(config, fetcher)
    }
}

impl FromSettings for Dsa {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        let default = DsaConfig::default();
        let config = DsaConfig {
            http: http(settings, &default.http),
            ..default
        };
        Dsa::with_fetcher(config, fetcher)
    }
}

impl FromSettings for WorldBank {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        WorldBank::with_fetcher(WorldBankConfig::from_settings(settings), fetcher)
    }
}

impl FromSettings for InternationalDebtStatistics {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        let config = WorldBankConfig::from_settings(settings).database(IDS);
        InternationalDebtStatistics::with_fetcher(config, fetcher)
    }
}

impl FromSettings for Ghed {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        let default = GhedConfig::default();
        let config = GhedConfig {
            http: http(settings, &default.http),
            ..default
        };
        Ghed::with_fetcher(config, fetcher)
    }
}

impl FromSettings for Unaids {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        let default = UnaidsConfig::default();
        let config = UnaidsConfig {
            http: http(settings, &default.http),
            ..default
        };
        Unaids::with_fetcher(config, fetcher)
    }
}

impl FromSettings for HumanDevelopmentIndex {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        let default = HdiConfig::default();
        let config = HdiConfig {
            http: http(settings, &default.http),
            ..default
        };
        HumanDevelopmentIndex::with_fetcher(config, fetcher)
    }
}

fn wfp_config(settings: &Settings) -> WfpConfig {
    let default = WfpConfig::default();
    WfpConfig {
        http: http(settings, &default.http),
        ..default
    }
}

impl FromSettings for WfpInflation {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        WfpInflation::with_fetcher(wfp_config(settings), fetcher)
    }
}

impl FromSettings for WfpFoodSecurity {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        WfpFoodSecurity::with_fetcher(wfp_config(settings), fetcher)
    }
}

impl FromSettings for Baci {
    fn from_settings_with(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        Baci::with_fetcher(BaciConfig::from_settings(settings), fetcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ssl_exception_survives() {
        let settings = Settings::default();
        let unaids = UnaidsConfig::default();
        assert!(!http(&settings, &unaids.http).verify_ssl);
        assert!(http(&settings, &HttpConfig::default()).verify_ssl);

        let mut strict_off = Settings::default();
        strict_off.http.verify_ssl = false;
        assert!(!http(&strict_off, &HttpConfig::default()).verify_ssl);
    }

    #[test]
    fn wfp_takes_shared_retries() {
        let mut settings = Settings::default();
        settings.http.max_retries = 7;
        settings.http.timeout_secs = 5;
        let config = wfp_config(&settings);
        assert_eq!(config.http.max_retries, 7);
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.vam_api, WfpConfig::default().vam_api);
    }
}
