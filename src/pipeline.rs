//! Step dispatcher
//!
//! Interlacing and contamination modeling are done once for a field and each
//! of its overlapping pointings. Extraction, stacking, fitting and archiving
//! are done catalog after catalog, so that the products of one catalog are out
//! of the working directory before the next catalog is extracted.

use std::{collections::HashSet, fs::File, path::PathBuf};

use chrono::Local;
use indicatif::ProgressBar;
use itertools::Itertools;
use log::{debug, info};

use crate::{
    archive::{archive_basename, ArchiveError, Archiver},
    catalog::{Catalog, SourceTable},
    config::{Paths, RefFilter, SurveyConfig},
    field::Field,
    reducer::{
        ContaminationModel, ExtractJob, FitJob, InterlaceJob, MaskJob, ModelJob, Reducer, StackJob,
    },
    resolver::{self, Visit},
    Result, CONTAM_MAG_FLOOR, GRISM,
};

mod manifest;
mod report;
mod request;
pub use manifest::{ArchiveManifest, CatalogManifest, FieldManifest};
pub use report::{
    write_outcomes, ObjectOutcome, ObjectRecord, RunSummary, SkipReason, StepReport,
};
pub use request::{RequestError, RunRequest, Step};

/// Magnitude limit of the contamination models: never brighter than [CONTAM_MAG_FLOOR]
pub fn contam_mag_limit(mag_lim: Option<f64>) -> f64 {
    mag_lim.map_or(CONTAM_MAG_FLOOR, |m| m.max(CONTAM_MAG_FLOOR))
}

/// Runs the steps of a [RunRequest] with a [Reducer]
pub struct Pipeline<'a, R> {
    config: &'a SurveyConfig,
    paths: &'a Paths,
    reducer: R,
    progress: bool,
}
impl<'a, R: Reducer> Pipeline<'a, R> {
    pub fn new(config: &'a SurveyConfig, paths: &'a Paths, reducer: R) -> Self {
        Self {
            config,
            paths,
            reducer,
            progress: false,
        }
    }
    /// Shows a progress bar for the objects of each visit
    pub fn progress(self, progress: bool) -> Self {
        Self { progress, ..self }
    }
    pub fn reducer(&self) -> &R {
        &self.reducer
    }
    pub fn into_reducer(self) -> R {
        self.reducer
    }
    /// Runs the requested steps on each field
    ///
    /// Per-object failures are recorded in the step reports; a failure at the
    /// visit, catalog or archive level stops the run.
    pub fn run(&mut self, request: &RunRequest) -> Result<RunSummary> {
        request.validate()?;
        let mut summary = RunSummary::default();
        for field in &request.fields {
            info!("***Beginning field {field}***");
            let catalogs = if request.needs_catalog() {
                self.config
                    .catalogs
                    .lookup_all(field.region(), &request.catalogs.purposes())?
            } else {
                vec![]
            };
            let fields = resolver::expand_field(self.config, field);
            if fields.len() > 1 {
                info!(
                    "{field} is processed with the overlapping pointings {}",
                    fields.iter().filter(|f| *f != field).join(", ")
                );
            }
            let mut manifest = FieldManifest::new(field);

            if request.has(Step::Interlace) {
                for field in &fields {
                    let report = self.interlace(field, request.ref_filter, &mut manifest)?;
                    summary.push(report);
                }
            }
            if request.has(Step::Model) {
                for field in &fields {
                    let report = self.model(field, request.mag_lim, &mut manifest)?;
                    summary.push(report);
                }
            }

            for catalog in &catalogs {
                info!("***Beginning catalog {}***", catalog.file);
                let table = SourceTable::from_path(self.paths.ref_dir().join(&catalog.file))?;
                let ids = table.ids()?;
                debug!("{} objects in {:?}", ids.len(), table.path);
                let mut products = CatalogManifest::new(catalog);
                let first = summary.reports.len();

                if request.has(Step::Extract) {
                    products.extraction_ran = true;
                    for field in &fields {
                        let report = self.extract(
                            field,
                            catalog,
                            &ids,
                            request.mag_lim,
                            &mut manifest,
                            &mut products,
                        )?;
                        summary.push(report);
                    }
                }
                if request.has(Step::Stack) {
                    let report = self.stack(
                        field,
                        catalog,
                        &ids,
                        request.mag_lim,
                        &mut manifest,
                        &mut products,
                    )?;
                    summary.push(report);
                }
                if request.has(Step::Fit) {
                    let report = self.fit(
                        field,
                        catalog,
                        &ids,
                        request,
                        &mut manifest,
                        &mut products,
                    )?;
                    summary.push(report);
                }
                if request.archives() {
                    let tarball = self.archive(
                        field,
                        catalog,
                        request,
                        &manifest,
                        &products,
                        &summary.reports[first..],
                    )?;
                    summary.archives.push(tarball);
                }
            }
        }
        Ok(summary)
    }

    fn visits(&self, field: &Field, manifest: &mut FieldManifest) -> Result<Vec<Visit>> {
        if let Some(visits) = manifest.visits.get(field.name()) {
            return Ok(visits.clone());
        }
        let visits = resolver::discover_visits(&self.paths.outputs, field)?;
        manifest
            .visits
            .insert(field.name().to_string(), visits.clone());
        Ok(visits)
    }
    /// Contamination model of the visit, built now if the model step did not run
    fn model_for(
        &mut self,
        visit: &Visit,
        contam: f64,
        manifest: &mut FieldManifest,
    ) -> Result<ContaminationModel> {
        if let Some(model) = manifest.models.get(visit.root()) {
            return Ok(model.clone());
        }
        debug!("loading the contamination model of {visit}");
        let model = self.reducer.build_model(&ModelJob::new(visit, contam))?;
        manifest
            .models
            .insert(visit.root().to_string(), model.clone());
        Ok(model)
    }
    fn progress_bar(&self, len: usize, visit: &Visit) -> ProgressBar {
        if self.progress {
            let bar = ProgressBar::new(len as u64);
            bar.set_message(visit.root().to_string());
            bar
        } else {
            ProgressBar::hidden()
        }
    }

    fn interlace(
        &mut self,
        field: &Field,
        ref_filter: RefFilter,
        manifest: &mut FieldManifest,
    ) -> Result<StepReport> {
        info!("Interlacing {field} on the {ref_filter} reference image");
        let references = self
            .config
            .references
            .for_field(field, ref_filter)
            .within(&self.paths.ref_dir());
        let mut report = StepReport::new(Step::Interlace, field, None);
        for visit in self.visits(field, manifest)? {
            let job = InterlaceJob::new(field, &visit, references.clone());
            if job.direct_grow == (1, 1) {
                info!("{visit} direct images interlaced 1x1");
            }
            let products = self.reducer.interlace(&job)?;
            manifest
                .interlaced
                .insert(visit.root().to_string(), products.files.clone());
            report.products.extend(products.files);
            report.visits += 1;
        }
        Ok(report)
    }

    fn model(
        &mut self,
        field: &Field,
        mag_lim: Option<f64>,
        manifest: &mut FieldManifest,
    ) -> Result<StepReport> {
        let contam = contam_mag_limit(mag_lim);
        info!("Modeling the contamination of {field} down to magnitude {contam}");
        let mut report = StepReport::new(Step::Model, field, None);
        for visit in self.visits(field, manifest)? {
            let model = self.reducer.build_model(&ModelJob::new(&visit, contam))?;
            debug!("{} objects in the {visit} model", model.objects.len());
            manifest.models.insert(visit.root().to_string(), model);
            let mask = self.paths.outputs.join(visit.mask_background_file());
            if mask.exists() {
                debug!("{mask:?} found, background mask not refined");
            } else {
                let products = self.reducer.refine_mask_background(&MaskJob::new(&visit))?;
                manifest
                    .masks
                    .insert(visit.root().to_string(), products.files.clone());
                report.products.extend(products.files);
            }
            report.visits += 1;
        }
        Ok(report)
    }

    fn extract(
        &mut self,
        field: &Field,
        catalog: &Catalog,
        ids: &[u64],
        mag_lim: Option<f64>,
        manifest: &mut FieldManifest,
        products: &mut CatalogManifest,
    ) -> Result<StepReport> {
        let contam = contam_mag_limit(mag_lim);
        let wanted: HashSet<u64> = ids.iter().copied().collect();
        info!("Extracting the {} objects of {field}", catalog.name);
        let mut report = StepReport::new(Step::Extract, field, Some(catalog));
        for visit in self.visits(field, manifest)? {
            let model = self.model_for(&visit, contam, manifest)?;
            let objects: Vec<_> = model
                .objects
                .iter()
                .filter(|o| wanted.contains(&o.id))
                .copied()
                .collect();
            let bar = self.progress_bar(objects.len(), &visit);
            for object in objects {
                bar.inc(1);
                if let Some(limit) = mag_lim.filter(|&limit| object.mag > limit) {
                    report.push(
                        visit.root(),
                        object.id,
                        ObjectOutcome::Skipped(SkipReason::Fainter {
                            mag: object.mag,
                            limit,
                        }),
                    );
                    continue;
                }
                let outcome = match self
                    .reducer
                    .extract(&ExtractJob::new(&visit, object.id, contam))
                {
                    Ok(spectra) if spectra.is_empty() => {
                        ObjectOutcome::Skipped(SkipReason::NoSpectrum)
                    }
                    Ok(spectra) => {
                        products.add_extraction(object.id, spectra.clone());
                        ObjectOutcome::Done(spectra.files)
                    }
                    Err(e) => ObjectOutcome::failed(&e),
                };
                report.push(visit.root(), object.id, outcome);
            }
            bar.finish_and_clear();
            report.visits += 1;
        }
        Ok(report)
    }

    fn stack(
        &mut self,
        field: &Field,
        catalog: &Catalog,
        ids: &[u64],
        mag_lim: Option<f64>,
        manifest: &mut FieldManifest,
        products: &mut CatalogManifest,
    ) -> Result<StepReport> {
        let contam = contam_mag_limit(mag_lim);
        let wanted: HashSet<u64> = ids.iter().copied().collect();
        info!("Stacking the {} objects of {field}", catalog.name);
        let mut report = StepReport::new(Step::Stack, field, Some(catalog));
        let mut targets = vec![];
        for visit in self.visits(field, manifest)? {
            let model = self.model_for(&visit, contam, manifest)?;
            targets.extend(
                model
                    .objects
                    .iter()
                    .filter(|o| wanted.contains(&o.id))
                    .filter(|o| mag_lim.map_or(true, |limit| o.mag <= limit))
                    .map(|o| o.id),
            );
            report.visits += 1;
        }
        let targets: Vec<u64> = targets.into_iter().unique().collect();
        let root = format!("{field}-{GRISM}");
        for id in targets {
            let spectra = match products.spectra_2d(id) {
                Some(spectra) => spectra,
                None => resolver::discover_spectra(&self.paths.outputs, id)?,
            };
            if spectra.is_empty() {
                report.push(&root, id, ObjectOutcome::Skipped(SkipReason::NoInputs));
                continue;
            }
            debug!("stacking {} 2D spectra of object {id}", spectra.len());
            let outcome = match self.reducer.stack(&StackJob::new(field, id, spectra)) {
                Ok(stack) => {
                    products.stacked.insert(id, stack.files.clone());
                    ObjectOutcome::Done(stack.files)
                }
                Err(e) => ObjectOutcome::failed(&e),
            };
            report.push(&root, id, outcome);
        }
        Ok(report)
    }

    fn fit(
        &mut self,
        field: &Field,
        catalog: &Catalog,
        ids: &[u64],
        request: &RunRequest,
        manifest: &mut FieldManifest,
        products: &mut CatalogManifest,
    ) -> Result<StepReport> {
        let contam = CONTAM_MAG_FLOOR;
        info!("Fitting the {} objects of {field}", catalog.name);
        let mut report = StepReport::new(Step::Fit, field, Some(catalog));
        for visit in self.visits(field, manifest)? {
            let model = self.model_for(&visit, contam, manifest)?;
            let objects: Vec<u64> = ids
                .iter()
                .copied()
                .unique()
                .filter(|&id| model.contains(id))
                .collect();
            let bar = self.progress_bar(objects.len(), &visit);
            // objects without a spectrum do not count against the limit
            let mut fitted = 0;
            for id in objects {
                bar.inc(1);
                if let Some(limit) = request.fit_limit.filter(|&limit| fitted >= limit) {
                    report.push(
                        visit.root(),
                        id,
                        ObjectOutcome::Skipped(SkipReason::FitLimit(limit)),
                    );
                    continue;
                }
                let outcome = self.fit_object(&visit, id, contam);
                if matches!(
                    outcome,
                    ObjectOutcome::Done(_) | ObjectOutcome::Skipped(SkipReason::AlreadyDone)
                ) {
                    fitted += 1;
                }
                if let ObjectOutcome::Done(files) = &outcome {
                    products
                        .fitted
                        .entry(id)
                        .or_default()
                        .extend(files.iter().cloned());
                }
                report.push(visit.root(), id, outcome);
            }
            bar.finish_and_clear();
            report.visits += 1;
        }
        Ok(report)
    }
    /// Redshift then emission lines fit, each skipped if its product exists
    fn fit_object(&mut self, visit: &Visit, id: u64, contam: f64) -> ObjectOutcome {
        let job = FitJob::new(visit, id, contam);
        let redshift = self.paths.outputs.join(job.redshift_file());
        let lines = self.paths.outputs.join(job.linefit_file());
        if redshift.exists() && lines.exists() {
            return ObjectOutcome::Skipped(SkipReason::AlreadyDone);
        }
        let mut files = vec![];
        if redshift.exists() {
            debug!("{redshift:?} found, redshift not fitted");
        } else {
            match self.reducer.fit_redshift(&job) {
                Ok(fit) if fit.is_empty() => {
                    return ObjectOutcome::Skipped(SkipReason::NoSpectrum)
                }
                Ok(fit) => files.extend(fit.files),
                Err(e) => return ObjectOutcome::failed(&e),
            }
        }
        if !lines.exists() {
            match self.reducer.fit_emission_lines(&job) {
                Ok(fit) => files.extend(fit.files),
                Err(e) => return ObjectOutcome::failed(&e),
            }
        }
        ObjectOutcome::Done(files)
    }

    fn archive(
        &self,
        field: &Field,
        catalog: &Catalog,
        request: &RunRequest,
        manifest: &FieldManifest,
        products: &CatalogManifest,
        reports: &[StepReport],
    ) -> Result<PathBuf> {
        let archiver = Archiver::from_paths(self.paths);
        let basename = archive_basename(&catalog.name, request.mag_lim);
        let archive = archiver.collect(
            field,
            &basename,
            request.ref_filter,
            Local::now().date_naive(),
        )?;
        // catalogs sharing a magnitude limited directory keep their own records
        let suffix = if request.mag_lim.is_some() && request.catalogs.purposes().len() > 1 {
            format!("_{}", catalog.name)
        } else {
            String::new()
        };
        write_outcomes(archive.dir.join(format!("outcomes{suffix}.csv")), reports)
            .map_err(ArchiveError::from)?;
        let path = archive.dir.join(format!("manifest{suffix}.json"));
        let file = File::create(&path).map_err(|e| ArchiveError::Io(e, path.clone()))?;
        serde_json::to_writer_pretty(
            file,
            &ArchiveManifest {
                field: manifest,
                catalog: products,
            },
        )
        .map_err(ArchiveError::from)?;
        Ok(archiver.compress(&archive)?)
    }
}
