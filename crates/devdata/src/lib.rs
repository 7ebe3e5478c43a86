//! Development data importers
//!
//! One crate per provider, all behind the [`Importer`] contract:
//! construction does no I/O, `get_data` returns a harmonized Arrow
//! `RecordBatch`, results are cached per instance until `clear_cache`.
//!
//! ```no_run
//! use devdata::{Importer, Settings, worldbank::{Query, WorldBank}};
//!
//! let settings = Settings::load()?;
//! devdata::init(&settings, false, false)?;
//! let mut wb = devdata::from_settings::<WorldBank>(&settings);
//! let gdp = wb.get_data(&Query::new(["NY.GDP.MKTP.CD"]).entities(["KEN", "UGA"]))?;
//! println!("{} rows", gdp.num_rows());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod settings;

pub use devdata_cepii as cepii;
pub use devdata_imf as imf;
pub use devdata_unaids as unaids;
pub use devdata_undp as undp;
pub use devdata_wfp as wfp;
pub use devdata_who as who;
pub use devdata_worldbank as worldbank;

pub use devdata_core::{
    Entity, ErrorKind, Fetcher, HttpConfig, ImportError, Importer, Result, Settings, fields,
    init_logging, resolve_entity,
};
pub use settings::{FromSettings, from_settings, init};
