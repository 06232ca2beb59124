//! Interface to the grism reduction software
//!
//! Interlacing, contamination modeling, spectral extraction, stacking and
//! redshift fitting are done by external software. Each call is described by
//! a job and answered with the files it produced.

use std::{io, path::PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::{config::ReferenceImages, field::Field, resolver::Visit, DIRECT_FILTER, GRISM};

mod external;
#[cfg(test)]
pub(crate) mod mock;
pub use external::ExternalReducer;

#[derive(Debug, thiserror::Error)]
pub enum ReducerError {
    #[error("failed to start the reducer {1:?}")]
    Spawn(#[source] io::Error, PathBuf),
    #[error("reducer I/O error")]
    Io(#[from] io::Error),
    #[error("reducer {task} failed ({status}): {stderr}")]
    Failed {
        task: Task,
        status: String,
        stderr: String,
    },
    #[error("invalid reducer job or reply")]
    Json(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, ReducerError>;

/// Reduction tasks
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum Task {
    Interlace,
    BuildModel,
    RefineMaskBackground,
    Extract,
    Stack,
    FitRedshift,
    FitEmissionLines,
}

/// Files written by a reduction task
///
/// No files from [Reducer::extract] or [Reducer::fit_redshift] means that
/// the object has no usable spectrum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Products {
    pub files: Vec<PathBuf>,
}
impl Products {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
impl FromIterator<PathBuf> for Products {
    fn from_iter<T: IntoIterator<Item = PathBuf>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Visit whose direct images had a bad dither and are interlaced 1x1
pub const ONE_BY_ONE_VISITS: [&str; 1] = ["GN5-42-346"];

/// Interlacing of the direct and grism images of a visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterlaceJob {
    pub grism_pointing: String,
    pub direct_pointing: String,
    pub grism: String,
    pub pad: u32,
    pub ngrowx: u32,
    pub ngrowy: u32,
    pub grism_grow: (u32, u32),
    pub direct_grow: (u32, u32),
    pub ref_exp: u32,
    pub auto_offsets: bool,
    pub references: ReferenceImages,
}
impl InterlaceJob {
    pub fn new(field: &Field, visit: &Visit, references: ReferenceImages) -> Self {
        let direct_grow = if ONE_BY_ONE_VISITS
            .iter()
            .any(|root| visit.root().contains(root))
        {
            (1, 1)
        } else {
            (2, 2)
        };
        Self {
            grism_pointing: visit.grism_pointing(),
            direct_pointing: visit.direct_pointing(),
            grism: GRISM.into(),
            pad: field.pad(),
            ngrowx: 200,
            ngrowy: 30,
            grism_grow: (2, 2),
            direct_grow,
            ref_exp: 0,
            auto_offsets: true,
            references,
        }
    }
}

/// Contamination model of a visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelJob {
    pub root: String,
    pub direct: String,
    pub grism: String,
    /// Magnitude down to which contaminating objects are modeled
    pub mag_limit: f64,
    pub refine_mag_limit: f64,
    pub template_mag_limit: f64,
    pub template_dr_min: f64,
    pub grow_factor: u32,
    pub beams: Vec<String>,
}
impl ModelJob {
    pub fn new(visit: &Visit, mag_limit: f64) -> Self {
        Self {
            root: visit.root().into(),
            direct: DIRECT_FILTER.into(),
            grism: GRISM.into(),
            mag_limit,
            refine_mag_limit: 21.,
            template_mag_limit: 25.,
            template_dr_min: 0.5,
            grow_factor: 2,
            beams: ["A", "B", "C", "D", "E"].map(String::from).to_vec(),
        }
    }
}

/// An object of a contamination model catalog
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: u64,
    pub mag: f64,
}

/// Contamination model of a visit: the objects it contains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContaminationModel {
    pub root: String,
    #[serde(default)]
    pub objects: Vec<ModelObject>,
}
impl ContaminationModel {
    pub fn contains(&self, id: u64) -> bool {
        self.objects.iter().any(|o| o.id == id)
    }
}

/// Background mask refinement of a contamination model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskJob {
    pub root: String,
    pub threshold: f64,
    pub grow_mask: u32,
    pub resid_threshold: f64,
    pub clip_left: u32,
}
impl MaskJob {
    pub fn new(visit: &Visit) -> Self {
        Self {
            root: visit.root().into(),
            threshold: 0.002,
            grow_mask: 14,
            resid_threshold: 4.,
            clip_left: 640,
        }
    }
}

/// 2D and 1D spectra extraction of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractJob {
    pub root: String,
    pub id: u64,
    pub contaminating_mag_limit: f64,
    pub miny: i32,
    pub grow: u32,
    pub flux_radius_scale: u32,
}
impl ExtractJob {
    pub fn new(visit: &Visit, id: u64, contaminating_mag_limit: f64) -> Self {
        Self {
            root: visit.root().into(),
            id,
            contaminating_mag_limit,
            miny: -36,
            grow: 1,
            flux_radius_scale: 3,
        }
    }
}

/// Stacking of all the 2D spectra of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackJob {
    /// Stack root, `<field>-G102`
    pub root: String,
    pub id: u64,
    pub files: Vec<PathBuf>,
    pub fcontam: f64,
    pub ref_wave: f64,
    pub scale: (f64, f64),
}
impl StackJob {
    pub fn new(field: &Field, id: u64, files: Vec<PathBuf>) -> Self {
        Self {
            root: format!("{field}-{GRISM}"),
            id,
            files,
            fcontam: 2.,
            ref_wave: 1.05e4,
            scale: (1., 99.),
        }
    }
}

/// Redshift and emission lines fit of an object spectrum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitJob {
    pub root: String,
    /// Object root, `<root>-G102_<id:05>`
    pub object_root: String,
    pub id: u64,
    pub contaminating_mag_limit: f64,
    pub miny: i32,
    pub lowz_thresh: f64,
    pub line_steps: u32,
}
impl FitJob {
    pub fn new(visit: &Visit, id: u64, contaminating_mag_limit: f64) -> Self {
        Self {
            root: visit.root().into(),
            object_root: visit.object_root(id),
            id,
            contaminating_mag_limit,
            miny: 40,
            lowz_thresh: 0.01,
            line_steps: 600,
        }
    }
    /// Redshift fit product, its presence skips the redshift fit
    pub fn redshift_file(&self) -> String {
        format!("{}.new_zfit.pz.fits", self.object_root)
    }
    /// Emission lines fit product, its presence skips the lines fit
    pub fn linefit_file(&self) -> String {
        format!("{}.linefit.fits", self.object_root)
    }
}

/// The grism reduction software
pub trait Reducer {
    fn interlace(&mut self, job: &InterlaceJob) -> Result<Products>;
    fn build_model(&mut self, job: &ModelJob) -> Result<ContaminationModel>;
    fn refine_mask_background(&mut self, job: &MaskJob) -> Result<Products>;
    fn extract(&mut self, job: &ExtractJob) -> Result<Products>;
    fn stack(&mut self, job: &StackJob) -> Result<Products>;
    fn fit_redshift(&mut self, job: &FitJob) -> Result<Products>;
    fn fit_emission_lines(&mut self, job: &FitJob) -> Result<Products>;
}

/// Logs the jobs without running them
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunReducer;
impl DryRunReducer {
    fn log<J: Serialize>(task: Task, job: &J) -> Result<()> {
        info!("dry run {task}: {}", serde_json::to_string(job)?);
        Ok(())
    }
}
impl Reducer for DryRunReducer {
    fn interlace(&mut self, job: &InterlaceJob) -> Result<Products> {
        Self::log(Task::Interlace, job)?;
        Ok(Products::default())
    }
    fn build_model(&mut self, job: &ModelJob) -> Result<ContaminationModel> {
        Self::log(Task::BuildModel, job)?;
        Ok(ContaminationModel {
            root: job.root.clone(),
            ..Default::default()
        })
    }
    fn refine_mask_background(&mut self, job: &MaskJob) -> Result<Products> {
        Self::log(Task::RefineMaskBackground, job)?;
        Ok(Products::default())
    }
    fn extract(&mut self, job: &ExtractJob) -> Result<Products> {
        Self::log(Task::Extract, job)?;
        Ok(Products::default())
    }
    fn stack(&mut self, job: &StackJob) -> Result<Products> {
        Self::log(Task::Stack, job)?;
        Ok(Products::default())
    }
    fn fit_redshift(&mut self, job: &FitJob) -> Result<Products> {
        Self::log(Task::FitRedshift, job)?;
        Ok(Products::default())
    }
    fn fit_emission_lines(&mut self, job: &FitJob) -> Result<Products> {
        Self::log(Task::FitEmissionLines, job)?;
        Ok(Products::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RefFilter, References};

    #[test]
    fn gn5_bad_dither_visit() {
        let field = Field::new("GN5").unwrap();
        let refs = References::default().for_field(&field, RefFilter::F105W);
        let bad = InterlaceJob::new(&field, &Visit::new("GN5-42-346"), refs.clone());
        assert_eq!(bad.direct_grow, (1, 1));
        assert_eq!(bad.grism_grow, (2, 2));
        let good = InterlaceJob::new(&field, &Visit::new("GN5-41-346"), refs);
        assert_eq!(good.direct_grow, (2, 2));
        assert_eq!(good.pad, 60);
        assert_eq!(good.direct_pointing, "GN5-41-346-F105W");
    }

    #[test]
    fn fit_products() {
        let job = FitJob::new(&Visit::new("GS5-13-000"), 42, 24.);
        assert_eq!(job.redshift_file(), "GS5-13-000-G102_00042.new_zfit.pz.fits");
        assert_eq!(job.linefit_file(), "GS5-13-000-G102_00042.linefit.fits");
    }

    #[test]
    fn task_names() {
        assert_eq!(Task::BuildModel.to_string(), "build-model");
        assert_eq!(Task::FitEmissionLines.to_string(), "fit-emission-lines");
    }

    #[test]
    fn dry_run_models_are_empty() {
        let model = DryRunReducer
            .build_model(&ModelJob::new(&Visit::new("GS5-13-000"), 24.))
            .unwrap();
        assert_eq!(model.root, "GS5-13-000");
        assert!(model.objects.is_empty());
    }
}
