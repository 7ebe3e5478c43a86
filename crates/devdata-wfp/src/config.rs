//! WFP endpoints and network settings

use devdata_core::HttpConfig;

pub const VAM_API: &str = "https://api.vam.wfp.org";
pub const HUNGERMAP_API: &str = "https://api.hungermapdata.org/v2";

pub(crate) const VAM_REFERRER: &str = "https://dataviz.vam.wfp.org/";
pub(crate) const HUNGERMAP_REFERRER: &str = "https://hungermap.wfp.org/";

/// Configuration shared by the WFP importers
#[derive(Debug, Clone)]
pub struct WfpConfig {
    pub vam_api: String,
    pub hungermap_api: String,
    pub http: HttpConfig,
}

impl Default for WfpConfig {
    fn default() -> Self {
        Self {
            vam_api: VAM_API.to_string(),
            hungermap_api: HUNGERMAP_API.to_string(),
            http: HttpConfig {
                timeout_secs: 20,
                max_retries: 2,
                ..HttpConfig::default()
            },
        }
    }
}

impl WfpConfig {
    pub fn countries_url(&self) -> String {
        format!("{}/adm0data.json", self.hungermap_api)
    }

    pub fn inflation_url(&self) -> String {
        format!("{}/economicExplorer/TradingEconomics/InflationExport", self.vam_api)
    }
}
