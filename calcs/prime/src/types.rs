use std::fmt::Display;
use std::str::FromStr;

use num_enum::{FromPrimitive, IntoPrimitive};

/// Variable type codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PrimeType {
    Settings = 0x00,
    App = 0x02,
    /// L0-L9
    List = 0x03,
    /// M0-M9
    Matrix = 0x04,
    Note = 0x05,
    Prgm = 0x06,
    AppNote = 0x07,
    AppPrgm = 0x08,
    /// Z0-Z9
    Complex = 0x09,
    /// A-Z
    Real = 0x0A,
    TestModeConfig = 0x0B,
    #[num_enum(default)]
    Unknown = 0xFF,
}

impl PrimeType {
    /// Types whose content is UTF-16 text, sent without a byte order mark
    pub fn is_text(self) -> bool {
        matches!(self, Self::Note | Self::Prgm)
    }
}

impl FromStr for PrimeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "settings" => Ok(Self::Settings),
            "app" => Ok(Self::App),
            "list" => Ok(Self::List),
            "matrix" => Ok(Self::Matrix),
            "note" => Ok(Self::Note),
            "prgm" | "program" => Ok(Self::Prgm),
            "appnote" => Ok(Self::AppNote),
            "appprgm" => Ok(Self::AppPrgm),
            "complex" => Ok(Self::Complex),
            "real" => Ok(Self::Real),
            "testmodeconfig" => Ok(Self::TestModeConfig),
            _ => Err(format!(
                "unknown variable type: {s}. Available: settings, app, list, matrix, note, \
                 prgm, appnote, appprgm, complex, real, testmodeconfig"
            )),
        }
    }
}

impl Display for PrimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Settings => "SETTINGS",
            Self::App => "APP",
            Self::List => "LIST",
            Self::Matrix => "MATRIX",
            Self::Note => "NOTE",
            Self::Prgm => "PRGM",
            Self::AppNote => "APPNOTE",
            Self::AppPrgm => "APPPRGM",
            Self::Complex => "COMPLEX",
            Self::Real => "REAL",
            Self::TestModeConfig => "TESTMODECONFIG",
            Self::Unknown => "UNKNOWN",
        })
    }
}
