use std::{collections::BTreeSet, str::FromStr};

use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::{catalog::CatalogSet, config::RefFilter, field::Field};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("no field to process")]
    NoFields,
    #[error("no step to run")]
    NoSteps,
    #[error(r#"step "{0}" is not recognized, expected 1 to 5 or interlace, model, extract, stack or fit"#)]
    Step(String),
    #[error("magnitude limit {0} is not a finite number")]
    MagLimit(f64),
    #[error("the {0} catalogs are extracted without stacking, their extractions would be mixed in the working directory")]
    InterleavedExtraction(CatalogSet),
}
type Result<T> = std::result::Result<T, RequestError>;

/// Pipeline steps, in processing order
#[derive(
    EnumIter, Display, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Interlaces the direct and grism images of the visits
    Interlace = 1,
    /// Builds the contamination models
    Model,
    /// Extracts the 2D and 1D spectra
    Extract,
    /// Stacks the 2D spectra of each object
    Stack,
    /// Fits redshifts and emission lines
    Fit,
}
impl Step {
    pub fn number(&self) -> u8 {
        *self as u8
    }
    pub fn from_number(number: u8) -> Result<Self> {
        Step::iter()
            .find(|step| step.number() == number)
            .ok_or_else(|| RequestError::Step(number.to_string()))
    }
    /// Steps working on a source catalog
    pub fn needs_catalog(&self) -> bool {
        matches!(self, Step::Extract | Step::Stack | Step::Fit)
    }
}
impl FromStr for Step {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.parse::<u8>() {
            Ok(number) => Step::from_number(number),
            Err(_) => Step::iter()
                .find(|step| step.to_string().eq_ignore_ascii_case(s))
                .ok_or_else(|| RequestError::Step(s.to_string())),
        }
    }
}

/// What to run and on which fields
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub fields: Vec<Field>,
    pub steps: BTreeSet<Step>,
    pub catalogs: CatalogSet,
    /// Faintest magnitude extracted, everything in the catalog if `None`
    pub mag_lim: Option<f64>,
    pub ref_filter: RefFilter,
    /// Maximum number of objects fitted per visit
    pub fit_limit: Option<usize>,
    /// Archives the products after the stack and fit steps
    pub archive: bool,
}
impl RunRequest {
    /// All the steps on the full catalog with the F105W reference image
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            steps: Step::iter().collect(),
            catalogs: CatalogSet::default(),
            mag_lim: None,
            ref_filter: RefFilter::default(),
            fit_limit: None,
            archive: true,
        }
    }
    pub fn steps<I: IntoIterator<Item = Step>>(self, steps: I) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..self
        }
    }
    pub fn catalogs(self, catalogs: CatalogSet) -> Self {
        Self { catalogs, ..self }
    }
    pub fn mag_lim(self, mag_lim: f64) -> Self {
        Self {
            mag_lim: Some(mag_lim),
            ..self
        }
    }
    pub fn ref_filter(self, ref_filter: RefFilter) -> Self {
        Self { ref_filter, ..self }
    }
    pub fn fit_limit(self, fit_limit: usize) -> Self {
        Self {
            fit_limit: Some(fit_limit),
            ..self
        }
    }
    pub fn archive(self, archive: bool) -> Self {
        Self { archive, ..self }
    }
    pub fn has(&self, step: Step) -> bool {
        self.steps.contains(&step)
    }
    pub fn needs_catalog(&self) -> bool {
        self.steps.iter().any(Step::needs_catalog)
    }
    /// Products are archived once per catalog, after stacking or fitting
    pub fn archives(&self) -> bool {
        self.archive && (self.has(Step::Stack) || self.has(Step::Fit))
    }
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(RequestError::NoFields);
        }
        if self.steps.is_empty() {
            return Err(RequestError::NoSteps);
        }
        if let Some(mag_lim) = self.mag_lim.filter(|m| !m.is_finite()) {
            return Err(RequestError::MagLimit(mag_lim));
        }
        if self.has(Step::Extract)
            && !self.has(Step::Stack)
            && self.catalogs.purposes().len() > 1
        {
            return Err(RequestError::InterleavedExtraction(self.catalogs));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gs5() -> Vec<Field> {
        vec![Field::new("GS5").unwrap()]
    }

    #[test]
    fn step_numbers() {
        let numbers: Vec<_> = Step::iter().map(|s| s.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!("3".parse::<Step>().unwrap(), Step::Extract);
        assert_eq!("Stack".parse::<Step>().unwrap(), Step::Stack);
        assert!("6".parse::<Step>().is_err());
        assert!("drizzle".parse::<Step>().is_err());
    }

    #[test]
    fn default_request() {
        let request = RunRequest::new(gs5());
        request.validate().unwrap();
        assert_eq!(request.steps.len(), 5);
        assert!(request.archives());
        assert!(!request.clone().archive(false).archives());
        assert!(!request.steps([Step::Interlace, Step::Model]).archives());
    }

    #[test]
    fn archives_after_stack_or_fit() {
        assert!(RunRequest::new(gs5()).steps([Step::Stack]).archives());
        assert!(RunRequest::new(gs5()).steps([Step::Fit]).archives());
        assert!(!RunRequest::new(gs5()).steps([Step::Extract]).archives());
    }

    #[test]
    fn interleaved_extraction() {
        let request = RunRequest::new(gs5())
            .steps([Step::Extract])
            .catalogs(CatalogSet::Zn);
        assert!(matches!(
            request.validate(),
            Err(RequestError::InterleavedExtraction(CatalogSet::Zn))
        ));
        request.clone().catalogs(CatalogSet::Emitters).validate().unwrap();
        request.steps([Step::Extract, Step::Stack]).validate().unwrap();
    }

    #[test]
    fn invalid_requests() {
        assert!(matches!(
            RunRequest::new(vec![]).validate(),
            Err(RequestError::NoFields)
        ));
        assert!(matches!(
            RunRequest::new(gs5()).steps([]).validate(),
            Err(RequestError::NoSteps)
        ));
        assert!(matches!(
            RunRequest::new(gs5()).mag_lim(f64::NAN).validate(),
            Err(RequestError::MagLimit(_))
        ));
    }
}
