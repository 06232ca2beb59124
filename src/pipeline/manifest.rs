use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    catalog::Catalog,
    field::Field,
    reducer::{ContaminationModel, Products},
    resolver::Visit,
};

/// Products of the catalog independent steps of a field and of its overlapping pointings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldManifest {
    pub field: String,
    /// Visits by field name
    pub visits: BTreeMap<String, Vec<Visit>>,
    /// Interlaced images by visit root
    pub interlaced: BTreeMap<String, Vec<PathBuf>>,
    /// Background masks by visit root
    pub masks: BTreeMap<String, Vec<PathBuf>>,
    /// Contamination models by visit root
    pub models: BTreeMap<String, ContaminationModel>,
}
impl FieldManifest {
    pub fn new(field: &Field) -> Self {
        Self {
            field: field.to_string(),
            ..Default::default()
        }
    }
}

/// Products of the catalog dependent steps, by object id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogManifest {
    pub catalog: String,
    pub file: String,
    /// Set once the extract step has run on the catalog
    pub extraction_ran: bool,
    pub extracted: BTreeMap<u64, Vec<PathBuf>>,
    pub stacked: BTreeMap<u64, Vec<PathBuf>>,
    pub fitted: BTreeMap<u64, Vec<PathBuf>>,
}
impl CatalogManifest {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            catalog: catalog.name.clone(),
            file: catalog.file.clone(),
            ..Default::default()
        }
    }
    pub fn add_extraction(&mut self, id: u64, products: Products) {
        self.extracted.entry(id).or_default().extend(products.files);
    }
    /// 2D spectra extracted for object `id`, if the extract step ran
    pub fn spectra_2d(&self, id: u64) -> Option<Vec<PathBuf>> {
        self.extraction_ran.then(|| {
            self.extracted
                .get(&id)
                .map(|files| files.iter().filter(|f| is_spectrum_2d(f)).cloned().collect())
                .unwrap_or_default()
        })
    }
}

fn is_spectrum_2d(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".2D.fits"))
}

/// What a run left in an archive directory
#[derive(Debug, Serialize)]
pub struct ArchiveManifest<'a> {
    pub field: &'a FieldManifest,
    pub catalog: &'a CatalogManifest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::CatalogPurpose, field::Region};

    fn catalog() -> Catalog {
        Catalog {
            region: Region::South,
            purpose: CatalogPurpose::Emitters,
            file: "emitters.cat".into(),
            name: "emitters".into(),
        }
    }

    #[test]
    fn spectra_only_after_extraction() {
        let mut manifest = CatalogManifest::new(&catalog());
        assert_eq!(manifest.spectra_2d(1), None);
        manifest.extraction_ran = true;
        assert_eq!(manifest.spectra_2d(1), Some(vec![]));
        manifest.add_extraction(
            1,
            [
                "GS5-13-000-G102_00001.2D.fits",
                "GS5-13-000-G102_00001.1D.fits",
                "GS5-13-000-G102_00001.2D.png",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
        );
        assert_eq!(
            manifest.spectra_2d(1),
            Some(vec![PathBuf::from("GS5-13-000-G102_00001.2D.fits")])
        );
    }

    #[test]
    fn json_keys() {
        let mut manifest = CatalogManifest::new(&catalog());
        manifest.add_extraction(312, Products::default());
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains(r#""extracted":{"312":[]}"#), "{json}");
    }
}
