use std::{
    fmt,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{config::SurveyConfig, field::Field, DIRECT_FILTER, GRISM};

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("invalid association file pattern")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to read an association file path")]
    Glob(#[from] glob::GlobError),
    #[error("{0:?} is not a valid UTF-8 path")]
    NonUtf8(PathBuf),
}
type Result<T> = std::result::Result<T, ResolverError>;

/// A grism visit, identified by its `<field>-<visit>-<orientation>` root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Visit {
    root: String,
}
impl Visit {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
    /// Gets the visit from the name of its grism association table, e.g. `GN2-51-345-G102_asn.fits`
    pub fn from_asn<P: AsRef<Path>>(path: P) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_str()?;
        let (root, _) = name.split_once(&format!("-{GRISM}"))?;
        Some(Self::new(root))
    }
    pub fn root(&self) -> &str {
        &self.root
    }
    /// Grism pointing name, `<root>-G102`
    pub fn grism_pointing(&self) -> String {
        format!("{}-{GRISM}", self.root)
    }
    /// Direct image pointing name, `<root>-F105W`
    pub fn direct_pointing(&self) -> String {
        format!("{}-{DIRECT_FILTER}", self.root)
    }
    /// Refined background mask of the visit contamination model
    pub fn mask_background_file(&self) -> String {
        format!("{}-{GRISM}_maskbg.dat", self.root)
    }
    /// Root of an object products, `<root>-G102_<id:05>`
    pub fn object_root(&self, id: u64) -> String {
        format!("{}-{GRISM}_{id:05}", self.root)
    }
}
impl fmt::Display for Visit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

/// Finds the visits of `field` from the `<field>*G102_asn.fits` files in `workdir`
///
/// A field without association files has no visits.
pub fn discover_visits(workdir: &Path, field: &Field) -> Result<Vec<Visit>> {
    let dir = workdir
        .to_str()
        .ok_or_else(|| ResolverError::NonUtf8(workdir.to_path_buf()))?;
    let pattern = Path::new(&glob::Pattern::escape(dir)).join(field.asn_pattern());
    let pattern = pattern
        .to_str()
        .ok_or_else(|| ResolverError::NonUtf8(pattern.clone()))?;
    let paths = glob::glob(pattern)?.collect::<std::result::Result<Vec<PathBuf>, glob::GlobError>>()?;
    let visits: Vec<Visit> = paths
        .iter()
        .filter_map(Visit::from_asn)
        .sorted()
        .dedup()
        .collect();
    if visits.is_empty() {
        warn!("no {} association files found for {field}", GRISM);
    } else {
        debug!("{field} visits: {}", visits.iter().join(", "));
    }
    Ok(visits)
}

/// Finds the 2D spectra of object `id` left in `workdir` by the extractions of any visit
///
/// The file names are returned relative to `workdir`.
pub fn discover_spectra(workdir: &Path, id: u64) -> Result<Vec<PathBuf>> {
    let dir = workdir
        .to_str()
        .ok_or_else(|| ResolverError::NonUtf8(workdir.to_path_buf()))?;
    let pattern = format!(
        "{}/*-*-*-{GRISM}_{id:05}.2D.fits",
        glob::Pattern::escape(dir)
    );
    let files: Vec<PathBuf> = glob::glob(&pattern)?
        .collect::<std::result::Result<Vec<PathBuf>, glob::GlobError>>()?
        .into_iter()
        .filter_map(|path| path.file_name().map(PathBuf::from))
        .sorted()
        .collect();
    debug!("{} 2D spectra found for object {id}", files.len());
    Ok(files)
}

/// Fields processed for `field`: the overlapping archival pointings first, then the field itself
///
/// Only GOODS-N CLEAR pointings have overlapping pointings; a pointing listed
/// twice is processed once.
pub fn expand_field(config: &SurveyConfig, field: &Field) -> Vec<Field> {
    let overlaps = config.overlapping(field);
    if field.is_clear_north() && overlaps.is_empty() {
        warn!("no overlapping pointings registered for {field}");
    }
    overlaps
        .iter()
        .chain(std::iter::once(field))
        .unique()
        .cloned()
        .collect()
}
