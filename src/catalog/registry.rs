use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Catalog, CatalogError, CatalogPurpose, Result};
use crate::field::Region;

/// A catalog file registered for a (region, purpose) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub region: Region,
    pub purpose: CatalogPurpose,
    pub file: String,
}

/// Source catalog files of the survey, partitioned by region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogRegistry(Vec<CatalogEntry>);
impl Default for CatalogRegistry {
    fn default() -> Self {
        use CatalogPurpose::*;
        use Region::*;
        let mut entries = vec![
            (North, Quiescent, "UVJ_quiescent_goodsn.dat".to_string()),
            (South, Quiescent, "UVJ_quiescent_goodss.dat".to_string()),
            (North, Emitters, "Steves_source_goodsn_w_ids.dat".to_string()),
            (South, Emitters, "Steves_source_goodss_w_ids.dat".to_string()),
            (North, Ivas, "Ivas_goodsn.dat".to_string()),
            (North, Full, "GoodsN_plus.cat".to_string()),
            (South, Full, "GoodsS_plus.cat".to_string()),
        ];
        for z in 3..=8 {
            for region in [North, South] {
                entries.push((
                    region,
                    RedshiftBin(z),
                    format!("added_sources_{}_key_z{z}.dat", region.tag()),
                ));
            }
        }
        entries
            .into_iter()
            .map(|(region, purpose, file)| CatalogEntry {
                region,
                purpose,
                file,
            })
            .collect()
    }
}
impl FromIterator<CatalogEntry> for CatalogRegistry {
    fn from_iter<T: IntoIterator<Item = CatalogEntry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
impl CatalogRegistry {
    /// Returns the catalog of the given region and purpose
    pub fn lookup(&self, region: Region, purpose: CatalogPurpose) -> Result<Catalog> {
        self.0
            .iter()
            .find(|e| e.region == region && e.purpose == purpose)
            .map(|e| Catalog {
                region,
                purpose,
                file: e.file.clone(),
                name: purpose.name(),
            })
            .ok_or(CatalogError::Undefined { region, purpose })
    }
    /// Resolves a list of purposes for a region
    pub fn lookup_all(&self, region: Region, purposes: &[CatalogPurpose]) -> Result<Vec<Catalog>> {
        purposes
            .iter()
            .map(|purpose| self.lookup(region, *purpose))
            .collect()
    }
    /// Checks that no catalog file is registered for both regions
    pub fn validate(&self) -> Result<()> {
        let north: BTreeSet<_> = self.files(Region::North).collect();
        match self.files(Region::South).find(|file| north.contains(file)) {
            Some(file) => Err(CatalogError::SharedFile(file.to_string())),
            None => Ok(()),
        }
    }
    fn files(&self, region: Region) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(move |e| e.region == region)
            .map(|e| e.file.as_str())
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::catalog::CatalogSet;

    #[test]
    fn regions_do_not_share_catalogs() {
        let registry = CatalogRegistry::default();
        registry.validate().unwrap();
        let purposes: Vec<_> = CatalogSet::iter().flat_map(|set| set.purposes()).collect();
        for purpose in purposes {
            let north = registry.lookup(Region::North, purpose).unwrap();
            assert!(!north.file.contains("goodss"), "{}", north.file);
            assert!(!north.file.contains("_S_"), "{}", north.file);
            if let Ok(south) = registry.lookup(Region::South, purpose) {
                assert_ne!(north.file, south.file);
                assert!(!south.file.contains("goodsn"), "{}", south.file);
                assert!(!south.file.contains("_N_"), "{}", south.file);
            }
        }
    }

    #[test]
    fn ivas_is_north_only() {
        let registry = CatalogRegistry::default();
        assert!(registry.lookup(Region::North, CatalogPurpose::Ivas).is_ok());
        assert!(matches!(
            registry.lookup(Region::South, CatalogPurpose::Ivas),
            Err(CatalogError::Undefined { .. })
        ));
    }

    #[test]
    fn catalog_names() {
        let registry = CatalogRegistry::default();
        let full = registry.lookup(Region::South, CatalogPurpose::Full).unwrap();
        assert_eq!(full.file, "GoodsS_plus.cat");
        assert_eq!(full.name, "maglim");
        let z5 = registry
            .lookup(Region::North, CatalogPurpose::RedshiftBin(5))
            .unwrap();
        assert_eq!(z5.file, "added_sources_N_key_z5.dat");
        assert_eq!(z5.name, "z5");
    }

    #[test]
    fn shared_file_rejected() {
        let registry: CatalogRegistry = [Region::North, Region::South]
            .into_iter()
            .map(|region| CatalogEntry {
                region,
                purpose: CatalogPurpose::Full,
                file: "GoodsN_plus.cat".into(),
            })
            .collect();
        assert!(matches!(
            registry.validate(),
            Err(CatalogError::SharedFile(_))
        ));
    }
}
