//! Cable and calculator model tags.

use std::fmt::Display;
use std::str::FromStr;

use crate::HpError;

/// Supported cable models
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CableModel {
    /// Dummy cable, every operation succeeds without touching hardware
    Nul,
    /// HP Prime connected over USB HID
    PrimeHid,
}

impl CableModel {
    pub const ALL: &'static [CableModel] = &[CableModel::Nul, CableModel::PrimeHid];
}

impl FromStr for CableModel {
    type Err = HpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', ' '], "-").as_str() {
            "nul" | "null" | "none" => Ok(Self::Nul),
            "prime-hid" | "primehid" | "hid" => Ok(Self::PrimeHid),
            _ => Err(HpError::InvalidModel(s.to_string())),
        }
    }
}

impl Display for CableModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Nul => "nul",
            Self::PrimeHid => "prime-hid",
        })
    }
}

/// Supported calculator models
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CalcModel {
    Prime,
}

impl CalcModel {
    pub const ALL: &'static [CalcModel] = &[CalcModel::Prime];
}

impl FromStr for CalcModel {
    type Err = HpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', ' '], "-").as_str() {
            "prime" | "hp-prime" | "hpprime" => Ok(Self::Prime),
            _ => Err(HpError::InvalidModel(s.to_string())),
        }
    }
}

impl Display for CalcModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Prime => "prime",
        })
    }
}
