use std::{
    error::Error,
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::Serialize;

use super::Step;
use crate::{catalog::Catalog, field::Field};

/// Why an object was not processed
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Fainter than the magnitude limit of the run
    Fainter { mag: f64, limit: f64 },
    /// The reducer found nothing to extract or fit
    NoSpectrum,
    /// No 2D spectrum to stack
    NoInputs,
    /// The products are already in the working directory
    AlreadyDone,
    /// Beyond the number of objects fitted per visit
    FitLimit(usize),
}
impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fainter { mag, limit } => {
                write!(f, "magnitude {mag:.2} fainter than {limit}")
            }
            SkipReason::NoSpectrum => write!(f, "no spectrum"),
            SkipReason::NoInputs => write!(f, "no 2D spectra"),
            SkipReason::AlreadyDone => write!(f, "already done"),
            SkipReason::FitLimit(n) => write!(f, "more than {n} objects fitted"),
        }
    }
}

/// Outcome of a step on one object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectOutcome {
    Done(Vec<PathBuf>),
    Skipped(SkipReason),
    Failed(String),
}
impl ObjectOutcome {
    /// Failure with the chain of error sources
    pub fn failed(error: &dyn Error) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(e) = source {
            message.push_str(": ");
            message.push_str(&e.to_string());
            source = e.source();
        }
        ObjectOutcome::Failed(message)
    }
    pub fn status(&self) -> &'static str {
        match self {
            ObjectOutcome::Done(_) => "done",
            ObjectOutcome::Skipped(_) => "skipped",
            ObjectOutcome::Failed(_) => "failed",
        }
    }
    pub fn detail(&self) -> String {
        match self {
            ObjectOutcome::Done(files) => files
                .iter()
                .map(|f| f.display().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            ObjectOutcome::Skipped(reason) => reason.to_string(),
            ObjectOutcome::Failed(error) => error.clone(),
        }
    }
}

/// Outcome of a step on an object of a visit, or of a field for stacks
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub root: String,
    pub id: u64,
    pub outcome: ObjectOutcome,
}

#[derive(Serialize)]
struct OutcomeRow<'a> {
    step: Step,
    field: &'a str,
    catalog: &'a str,
    root: &'a str,
    id: u64,
    status: &'static str,
    detail: String,
}

/// Record of a step run on a field
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: Step,
    pub field: String,
    pub catalog: Option<String>,
    pub visits: usize,
    /// Visit-level products: interlaced images and background masks
    pub products: Vec<PathBuf>,
    pub records: Vec<ObjectRecord>,
}
impl StepReport {
    pub fn new(step: Step, field: &Field, catalog: Option<&Catalog>) -> Self {
        Self {
            step,
            field: field.to_string(),
            catalog: catalog.map(|c| c.name.clone()),
            visits: 0,
            products: vec![],
            records: vec![],
        }
    }
    pub fn push(&mut self, root: &str, id: u64, outcome: ObjectOutcome) {
        match &outcome {
            ObjectOutcome::Failed(error) => warn!("{} failed on {root} #{id}: {error}", self.step),
            ObjectOutcome::Skipped(reason) => {
                debug!("{} skipped {root} #{id}: {reason}", self.step)
            }
            ObjectOutcome::Done(_) => debug!("{} done on {root} #{id}", self.step),
        }
        self.records.push(ObjectRecord {
            root: root.to_string(),
            id,
            outcome,
        });
    }
    fn count(&self, status: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.status() == status)
            .count()
    }
    pub fn done(&self) -> usize {
        self.count("done")
    }
    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }
    pub fn failed(&self) -> usize {
        self.count("failed")
    }
    pub fn log(&self) {
        if self.records.is_empty() {
            info!(
                "*** {} step complete on {}: {} visits ***",
                self.step, self.field, self.visits
            );
        } else {
            info!(
                "*** {} step complete on {}: {} done, {} skipped, {} failed ***",
                self.step,
                self.field,
                self.done(),
                self.skipped(),
                self.failed()
            );
        }
    }
}

/// Writes the object outcomes of the step reports to a CSV file
pub fn write_outcomes<P: AsRef<Path>>(path: P, reports: &[StepReport]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    for report in reports {
        for record in &report.records {
            wtr.serialize(OutcomeRow {
                step: report.step,
                field: &report.field,
                catalog: report.catalog.as_deref().unwrap_or_default(),
                root: &record.root,
                id: record.id,
                status: record.outcome.status(),
                detail: record.outcome.detail(),
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Reports of all the steps of a run and the archives written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub reports: Vec<StepReport>,
    pub archives: Vec<PathBuf>,
}
impl RunSummary {
    pub fn push(&mut self, report: StepReport) {
        report.log();
        self.reports.push(report);
    }
    pub fn failed(&self) -> usize {
        self.reports.iter().map(StepReport::failed).sum()
    }
    /// Print out a run summary
    pub fn summary(&self) {
        println!("SUMMARY:");
        println!(" - # of steps run: {}", self.reports.len());
        println!(
            "    {:<10} {:<8} {:<10}: {:>6} {:>8} {:>8} {:>8}",
            "STEP", "FIELD", "CATALOG", "VISITS", "DONE", "SKIPPED", "FAILED"
        );
        self.reports.iter().for_each(|report| {
            println!(
                "  - {:<10} {:<8} {:<10}: {:>6} {:>8} {:>8} {:>8}",
                report.step.to_string(),
                report.field,
                report.catalog.as_deref().unwrap_or("-"),
                report.visits,
                report.done(),
                report.skipped(),
                report.failed()
            );
        });
        if !self.archives.is_empty() {
            println!(" - archives:");
            self.archives
                .iter()
                .for_each(|archive| println!("  - {}", archive.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> StepReport {
        let mut report = StepReport::new(Step::Extract, &Field::new("GS5").unwrap(), None);
        report.push(
            "GS5-13-000",
            1,
            ObjectOutcome::Done(vec!["GS5-13-000-G102_00001.2D.fits".into()]),
        );
        report.push("GS5-13-000", 2, ObjectOutcome::Skipped(SkipReason::NoSpectrum));
        report.push("GS5-13-000", 3, ObjectOutcome::Failed("no trace".into()));
        report.push(
            "GS5-13-000",
            4,
            ObjectOutcome::Skipped(SkipReason::Fainter {
                mag: 26.5,
                limit: 26.,
            }),
        );
        report
    }

    #[test]
    fn counts() {
        let report = report();
        assert_eq!(
            (report.done(), report.skipped(), report.failed()),
            (1, 2, 1)
        );
        let summary = RunSummary {
            reports: vec![report.clone(), report],
            archives: vec![],
        };
        assert_eq!(summary.failed(), 2);
    }

    #[test]
    fn outcomes_csv() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("outcomes.csv");
        write_outcomes(&path, &[report()])?;
        let mut rdr = csv::Reader::from_path(&path)?;
        let headers = rdr.headers()?.clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["step", "field", "catalog", "root", "id", "status", "detail"]
        );
        let rows = rdr.records().collect::<Result<Vec<_>, _>>()?;
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][0], "extract");
        assert_eq!(&rows[0][6], "GS5-13-000-G102_00001.2D.fits");
        assert_eq!(&rows[2][5], "failed");
        assert_eq!(&rows[3][6], "magnitude 26.50 fainter than 26");
        Ok(())
    }
}
