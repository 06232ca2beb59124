use std::{fmt, str::FromStr};

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

use crate::GRISM;

#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error(r#"field "{0}" is not recognized, expected GN<n>, GS<n>, GDN<n>, GDS<n> or ERSPRIME"#)]
    Unknown(String),
    #[error("invalid field name regex")]
    Regex(#[from] regex::Error),
    #[error("field number parsing error")]
    Number(#[from] std::num::ParseIntError),
}
type Result<T> = std::result::Result<T, FieldError>;

/// GOODS region of the sky
#[derive(
    EnumIter, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Region {
    North,
    South,
}
impl Region {
    /// Single letter tag used in the catalog file names
    pub fn tag(&self) -> &'static str {
        match self {
            Region::North => "N",
            Region::South => "S",
        }
    }
}
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::North => write!(f, "GOODS-N"),
            Region::South => write!(f, "GOODS-S"),
        }
    }
}

/// HST program a pointing was observed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Program {
    /// CLEAR pointings (GN*, GS*)
    Clear,
    /// Early Release Science pointing
    ErsPrime,
    /// Archival 3D-HST pointings (GDN*, GDS*)
    ThreeDHst,
}

/// A survey pointing, e.g. `GN2`, `GS5`, `GDN21` or `ERSPRIME`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Field {
    name: String,
    region: Region,
    program: Program,
}
impl Field {
    /// Parses a field identifier
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim().to_uppercase();
        if name == "ERSPRIME" {
            return Ok(Self {
                name,
                region: Region::South,
                program: Program::ErsPrime,
            });
        }
        let re = Regex::new(r"^(GN|GS|GDN|GDS)(\d+)$")?;
        let capts = re
            .captures(&name)
            .ok_or_else(|| FieldError::Unknown(name.clone()))?;
        let (region, program) = match &capts[1] {
            "GN" => (Region::North, Program::Clear),
            "GS" => (Region::South, Program::Clear),
            "GDN" => (Region::North, Program::ThreeDHst),
            "GDS" => (Region::South, Program::ThreeDHst),
            _ => return Err(FieldError::Unknown(name.clone())),
        };
        let number: u32 = capts[2].parse()?;
        Ok(Self {
            name: format!("{}{}", &capts[1], number),
            region,
            program,
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn region(&self) -> Region {
        self.region
    }
    pub fn program(&self) -> Program {
        self.program
    }
    /// CLEAR GOODS-N pointings overlap with archival 3D-HST pointings
    pub fn is_clear_north(&self) -> bool {
        self.region == Region::North && self.program == Program::Clear
    }
    /// Interlaced image padding in pixels
    pub fn pad(&self) -> u32 {
        match (self.region, self.program) {
            (Region::North, Program::ThreeDHst) => 500,
            _ => 60,
        }
    }
    /// Glob pattern of the field grism association tables
    pub fn asn_pattern(&self) -> String {
        format!("{}*{}_asn.fits", self.name, GRISM)
    }
}
impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
impl FromStr for Field {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self> {
        Field::new(s)
    }
}
impl TryFrom<String> for Field {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self> {
        Field::new(&value)
    }
}
impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.name
    }
}
