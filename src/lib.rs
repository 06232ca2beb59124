/*!
# CLEAR grism pipeline

Orchestration of the CLEAR (HST program 14227) grism data reduction:
interlacing of the G102 visits, contamination models, 2D/1D spectral
extraction, stacking and redshift/emission line fits.

The science itself is done by external reduction software reached through the
[`Reducer`] trait; this crate decides which visits, catalogs and objects go
through which step, and archives the products.

```rust,no_run
use clear_pipeline::{
    CatalogSet, DryRunReducer, Field, Paths, Pipeline, RefFilter, RunRequest, Step, SurveyConfig,
};

let config = SurveyConfig::default();
let paths = Paths::from_env()?;
let request = RunRequest::new(vec![Field::new("GS5")?])
    .steps([Step::Extract, Step::Stack])
    .catalogs(CatalogSet::Full)
    .mag_lim(26.)
    .ref_filter(RefFilter::F125W);
let summary = Pipeline::new(&config, &paths, DryRunReducer::default()).run(&request)?;
summary.summary();
# Ok::<(), clear_pipeline::Error>(())
```
*/

pub mod archive;
pub mod catalog;
pub mod config;
mod error;
pub mod field;
pub mod pipeline;
pub mod reducer;
pub mod resolver;

pub use archive::{make_timestamp_dir, Archiver};
pub use catalog::{Catalog, CatalogPurpose, CatalogRegistry, CatalogSet, SourceTable};
pub use config::{Paths, RefFilter, SurveyConfig};
pub use error::{Error, Result};
pub use field::{Field, Program, Region};
pub use pipeline::{contam_mag_limit, Pipeline, RunRequest, RunSummary, Step};
pub use reducer::{DryRunReducer, ExternalReducer, Reducer};
pub use resolver::Visit;

/// Grism element of the CLEAR observations
pub const GRISM: &str = "G102";
/// Filter of the direct images paired with the grism exposures
pub const DIRECT_FILTER: &str = "F105W";
/// Faintest magnitude the contamination models are ever built to
pub const CONTAM_MAG_FLOOR: f64 = 24.;
/// The 12 CLEAR pointings
pub const CLEAR_FIELDS: [&str; 12] = [
    "GS1", "GS2", "GS3", "GS4", "GS5", "ERSPRIME", "GN1", "GN2", "GN3", "GN4", "GN5", "GN7",
];
