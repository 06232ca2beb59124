use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use super::{
    ContaminationModel, ExtractJob, FitJob, InterlaceJob, MaskJob, ModelJob, ModelObject,
    Products, Reducer, ReducerError, Result, StackJob, Task,
};

/// Reducer writing empty product files in the working directory and recording the jobs
#[derive(Debug, Default)]
pub struct MockReducer {
    pub workdir: PathBuf,
    /// Model objects by visit root
    pub objects: BTreeMap<String, Vec<ModelObject>>,
    /// Objects whose extraction fails
    pub failing: BTreeSet<u64>,
    /// Objects without a spectrum to extract or fit
    pub blank: BTreeSet<u64>,
    pub calls: Vec<(Task, String)>,
    pub interlace_jobs: Vec<InterlaceJob>,
    pub model_jobs: Vec<ModelJob>,
    pub stack_jobs: Vec<StackJob>,
}
impl MockReducer {
    pub fn new<P: AsRef<Path>>(workdir: P) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
    pub fn with_objects(mut self, root: &str, objects: &[(u64, f64)]) -> Self {
        self.objects.insert(
            root.into(),
            objects
                .iter()
                .map(|&(id, mag)| ModelObject { id, mag })
                .collect(),
        );
        self
    }
    fn touch(&self, names: &[String]) -> Result<Products> {
        names
            .iter()
            .map(|name| {
                fs::write(self.workdir.join(name), b"")?;
                Ok(PathBuf::from(name))
            })
            .collect::<Result<Vec<PathBuf>>>()
            .map(|files| Products { files })
    }
    pub fn count(&self, task: Task) -> usize {
        self.calls.iter().filter(|(t, _)| *t == task).count()
    }
    pub fn keys(&self, task: Task) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|(t, _)| *t == task)
            .map(|(_, key)| key.as_str())
            .collect()
    }
}
impl Reducer for MockReducer {
    fn interlace(&mut self, job: &InterlaceJob) -> Result<Products> {
        self.calls.push((Task::Interlace, job.grism_pointing.clone()));
        self.interlace_jobs.push(job.clone());
        self.touch(&[
            format!("{}_inter.fits", job.direct_pointing),
            format!("{}_inter.fits", job.grism_pointing),
        ])
    }
    fn build_model(&mut self, job: &ModelJob) -> Result<ContaminationModel> {
        self.calls.push((Task::BuildModel, job.root.clone()));
        self.model_jobs.push(job.clone());
        Ok(ContaminationModel {
            root: job.root.clone(),
            objects: self.objects.get(&job.root).cloned().unwrap_or_default(),
        })
    }
    fn refine_mask_background(&mut self, job: &MaskJob) -> Result<Products> {
        self.calls
            .push((Task::RefineMaskBackground, job.root.clone()));
        self.touch(&[format!("{}-G102_maskbg.dat", job.root)])
    }
    fn extract(&mut self, job: &ExtractJob) -> Result<Products> {
        self.calls
            .push((Task::Extract, format!("{}:{}", job.root, job.id)));
        if self.failing.contains(&job.id) {
            return Err(ReducerError::Failed {
                task: Task::Extract,
                status: "exit status: 1".into(),
                stderr: format!("no trace for {}", job.id),
            });
        }
        if self.blank.contains(&job.id) {
            return Ok(Products::default());
        }
        let root = format!("{}-G102_{:05}", job.root, job.id);
        self.touch(&[
            format!("{root}.2D.fits"),
            format!("{root}.1D.fits"),
            format!("{root}.2D.png"),
        ])
    }
    fn stack(&mut self, job: &StackJob) -> Result<Products> {
        self.calls.push((Task::Stack, format!("{}:{}", job.root, job.id)));
        self.stack_jobs.push(job.clone());
        let root = format!("{}_{:05}", job.root, job.id);
        self.touch(&[format!("{root}.stack.fits"), format!("{root}.stack.png")])
    }
    fn fit_redshift(&mut self, job: &FitJob) -> Result<Products> {
        self.calls.push((Task::FitRedshift, job.object_root.clone()));
        if self.blank.contains(&job.id) {
            return Ok(Products::default());
        }
        self.touch(&[job.redshift_file()])
    }
    fn fit_emission_lines(&mut self, job: &FitJob) -> Result<Products> {
        self.calls
            .push((Task::FitEmissionLines, job.object_root.clone()));
        self.touch(&[job.linefit_file()])
    }
}
