use std::{fmt, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::field::Region;

mod registry;
mod table;
pub use registry::{CatalogEntry, CatalogRegistry};
pub use table::SourceTable;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("no {purpose} catalog is defined for {region}")]
    Undefined {
        region: Region,
        purpose: CatalogPurpose,
    },
    #[error("catalog {0} is registered for both GOODS-N and GOODS-S")]
    SharedFile(String),
    #[error("failed to read catalog {1:?}")]
    ReadFile(#[source] io::Error, PathBuf),
    #[error("failed to parse CSV catalog")]
    Csv(#[from] csv::Error),
    #[error("invalid catalog header regex")]
    Regex(#[from] regex::Error),
    #[error("catalog {0:?} has no column header")]
    NoHeader(PathBuf),
    #[error("row {row} of catalog {path:?} has {found} values, expected {expected}")]
    RowLength {
        path: PathBuf,
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("none of the ID, id or NUMBER columns found in {columns:?}")]
    MissingIdColumn { columns: Vec<String> },
    #[error(r#"cannot read an object id from "{0}""#)]
    BadId(String),
}
pub type Result<T> = std::result::Result<T, CatalogError>;

/// What a source catalog selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CatalogPurpose {
    /// UVJ selected quiescent galaxies
    Quiescent,
    /// Emission line sources
    Emitters,
    /// Sources in the redshift bin z~n
    RedshiftBin(u8),
    /// Full catalog, used to extract down to a magnitude limit
    Full,
    /// Iva's GOODS-N source list
    Ivas,
}
impl CatalogPurpose {
    /// Name given to the extractions of that catalog
    pub fn name(&self) -> String {
        match self {
            CatalogPurpose::Quiescent => "quiescent".into(),
            CatalogPurpose::Emitters => "emitters".into(),
            CatalogPurpose::RedshiftBin(z) => format!("z{z}"),
            CatalogPurpose::Full => "maglim".into(),
            CatalogPurpose::Ivas => "ivas".into(),
        }
    }
}
impl fmt::Display for CatalogPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Catalog selection of a pipeline run
#[derive(EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CatalogSet {
    Quiescent,
    Emitters,
    Zn,
    #[default]
    Full,
    Ivas,
}
impl CatalogSet {
    /// The catalog purposes of the set, in processing order
    pub fn purposes(&self) -> Vec<CatalogPurpose> {
        match self {
            CatalogSet::Quiescent => vec![CatalogPurpose::Quiescent],
            CatalogSet::Emitters => vec![CatalogPurpose::Emitters],
            CatalogSet::Zn => (3..=8).map(CatalogPurpose::RedshiftBin).collect(),
            CatalogSet::Full => vec![CatalogPurpose::Full],
            CatalogSet::Ivas => vec![CatalogPurpose::Ivas],
        }
    }
}

/// A source catalog resolved for a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub region: Region,
    pub purpose: CatalogPurpose,
    /// File name in the reference directory
    pub file: String,
    pub name: String,
}
