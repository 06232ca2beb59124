use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::field::{Field, Program, Region};

/// Filter of the reference mosaic the grism visits are aligned to
#[derive(
    EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum RefFilter {
    #[default]
    F105W,
    F125W,
}

/// Reference mosaic, segmentation map and catalog used to interlace a visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImages {
    pub catalog: PathBuf,
    pub image: PathBuf,
    pub image_ext: u32,
    pub segmentation: PathBuf,
    pub filter: RefFilter,
}
impl ReferenceImages {
    /// Prefixes every file with the reference directory
    pub fn within(self, ref_dir: &Path) -> Self {
        Self {
            catalog: ref_dir.join(self.catalog),
            image: ref_dir.join(self.image),
            segmentation: ref_dir.join(self.segmentation),
            ..self
        }
    }
}

/// Reference files of one GOODS region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionReferences {
    pub catalog: String,
    pub segmentation: String,
    pub f105w_image: String,
    pub f125w_image: String,
}
impl RegionReferences {
    fn images(&self, filter: RefFilter) -> ReferenceImages {
        let image = match filter {
            RefFilter::F105W => &self.f105w_image,
            RefFilter::F125W => &self.f125w_image,
        };
        ReferenceImages {
            catalog: self.catalog.clone().into(),
            image: image.into(),
            image_ext: 0,
            segmentation: self.segmentation.clone().into(),
            filter,
        }
    }
}

/// Reference files for both regions
///
/// ERSPRIME is not covered by the GOODS-S F105W mosaic and always uses the F125W one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub north: RegionReferences,
    pub south: RegionReferences,
}
impl Default for References {
    fn default() -> Self {
        Self {
            north: RegionReferences {
                catalog: "GoodsN_plus_merged.cat".into(),
                segmentation: "Goods_N_plus_seg.fits".into(),
                f105w_image: "gn_all_candels_wfc3_f105w_060mas_v0.8_drz.fits".into(),
                f125w_image: "goodsn_3dhst.v4.0.F125W_orig_sci.fits".into(),
            },
            south: RegionReferences {
                catalog: "GoodsS_plus_merged.cat".into(),
                segmentation: "Goods_S_plus_seg.fits".into(),
                f105w_image: "gs_all_candels_ers_udf_f105w_060mas_v0.5_drz.trim.fits".into(),
                f125w_image: "goodss_3dhst.v4.0.F125W_orig_sci.fits".into(),
            },
        }
    }
}
impl References {
    /// Returns the reference files for `field`, relative to the reference directory
    pub fn for_field(&self, field: &Field, filter: RefFilter) -> ReferenceImages {
        match (field.region(), field.program()) {
            (Region::South, Program::ErsPrime) => self.south.images(RefFilter::F125W),
            (Region::South, _) => self.south.images(filter),
            (Region::North, _) => self.north.images(filter),
        }
    }
}
