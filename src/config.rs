use std::{
    collections::BTreeMap,
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    catalog::{CatalogError, CatalogRegistry},
    field::{Field, FieldError, Program, Region},
};

mod references;
pub use references::{RefFilter, ReferenceImages, References, RegionReferences};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(r#"path is not set, use the command line option or the "{0}" env var"#)]
    MissingPath(&'static str),
    #[error("failed to read {1:?}")]
    ReadFile(#[source] io::Error, PathBuf),
    #[error("failed to parse the survey configuration")]
    Json(#[from] serde_json::Error),
    #[error("invalid catalog registry")]
    Catalog(#[from] CatalogError),
    #[error("invalid field in the survey configuration")]
    Field(#[from] FieldError),
    #[error("{overlap} cannot overlap with {field}: only GOODS-N CLEAR pointings have overlapping GOODS-N fields")]
    Overlap { field: String, overlap: Field },
}
type Result<T> = std::result::Result<T, ConfigError>;

/// Env var with the directory holding the `REF` folder
pub const REF_PATH_ENV: &str = "CLEAR_REF_PATH";
/// Env var with the root directory of the archived extractions
pub const EXTRACTIONS_PATH_ENV: &str = "CLEAR_EXTRACTIONS_PATH";
/// Env var with the working (outputs) directory
pub const OUTPUTS_PATH_ENV: &str = "CLEAR_OUTPUTS_PATH";

/// Survey directories
#[derive(Debug, Clone, PartialEq)]
pub struct Paths {
    pub ref_files: PathBuf,
    pub extractions: PathBuf,
    pub outputs: PathBuf,
}
impl Paths {
    pub fn new<P: AsRef<Path>>(ref_files: P, extractions: P, outputs: P) -> Self {
        Self {
            ref_files: ref_files.as_ref().to_path_buf(),
            extractions: extractions.as_ref().to_path_buf(),
            outputs: outputs.as_ref().to_path_buf(),
        }
    }
    /// Reads the paths from the `CLEAR_*_PATH` env vars
    ///
    /// The outputs directory defaults to the current directory.
    pub fn from_env() -> Result<Self> {
        Self::from_env_or(None, None, None)
    }
    /// Uses the given paths, falling back to the `CLEAR_*_PATH` env vars for the missing ones
    pub fn from_env_or(
        ref_files: Option<PathBuf>,
        extractions: Option<PathBuf>,
        outputs: Option<PathBuf>,
    ) -> Result<Self> {
        let var = |name: &'static str| env::var_os(name).map(PathBuf::from);
        Ok(Self {
            ref_files: ref_files
                .or_else(|| var(REF_PATH_ENV))
                .ok_or(ConfigError::MissingPath(REF_PATH_ENV))?,
            extractions: extractions
                .or_else(|| var(EXTRACTIONS_PATH_ENV))
                .ok_or(ConfigError::MissingPath(EXTRACTIONS_PATH_ENV))?,
            outputs: outputs
                .or_else(|| var(OUTPUTS_PATH_ENV))
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
    /// Directory with the reference images and the source catalogs
    pub fn ref_dir(&self) -> PathBuf {
        self.ref_files.join("REF")
    }
}

/// Survey wide settings: catalogs, overlapping pointings and reference images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyConfig {
    pub catalogs: CatalogRegistry,
    /// Archival GOODS-N pointings processed together with a CLEAR GOODS-N pointing
    pub overlaps: BTreeMap<String, Vec<Field>>,
    pub references: References,
}
impl Default for SurveyConfig {
    fn default() -> Self {
        let overlaps = [
            ("GN1", vec![20]),
            ("GN2", vec![8, 12, 21, 25]),
            ("GN3", vec![18, 19, 22, 23]),
            ("GN4", vec![21, 22, 25, 26]),
            ("GN5", vec![17, 18]),
            ("GN7", vec![3, 6, 7, 11]),
        ]
        .into_iter()
        .map(|(field, gdn)| {
            (
                field.to_string(),
                gdn.into_iter()
                    .filter_map(|n| Field::new(&format!("GDN{n}")).ok())
                    .collect(),
            )
        })
        .collect();
        Self {
            catalogs: CatalogRegistry::default(),
            overlaps,
            references: References::default(),
        }
    }
}
impl SurveyConfig {
    /// Loads a survey configuration from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::ReadFile(e, path.to_path_buf()))?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
    /// Checks that catalogs are not shared between regions and that only
    /// GOODS-N CLEAR pointings have overlapping pointings, all in GOODS-N
    pub fn validate(&self) -> Result<()> {
        self.catalogs.validate()?;
        for (name, overlaps) in &self.overlaps {
            let field = Field::new(name)?;
            if let Some(overlap) = overlaps
                .iter()
                .find(|o| !field.is_clear_north() || o.region() != Region::North)
            {
                return Err(ConfigError::Overlap {
                    field: field.to_string(),
                    overlap: overlap.clone(),
                });
            }
        }
        Ok(())
    }
    /// Archival pointings overlapping with `field`, empty for anything but CLEAR GOODS-N
    pub fn overlapping(&self, field: &Field) -> &[Field] {
        match field.program() {
            Program::Clear if field.region() == Region::North => self
                .overlaps
                .get(field.name())
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        }
    }
}
