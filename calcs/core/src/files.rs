//! Variable entries, the unit of calculator storage.

use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::{HpError, Result};

/// Longest name, in UTF-16 code units, a var entry can carry
pub const MAX_NAME_UNITS: usize = 256;

/// One named variable, as stored on the calculator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VarEntry {
    pub name: String,
    /// Calculator specific type code
    pub var_type: u8,
    /// Set when a CRC mismatch suggests the data was damaged in transit
    pub invalid: bool,
    pub data: Vec<u8>,
}

/// Cut a name down to [`MAX_NAME_UNITS`] UTF-16 code units, on a char boundary
fn truncate_name(name: &str) -> String {
    let mut units = 0;
    name.chars()
        .take_while(|c| {
            units += c.len_utf16();
            units <= MAX_NAME_UNITS
        })
        .collect()
}

impl VarEntry {
    /// Empty, unnamed entry
    pub fn new() -> Self {
        Self::default()
    }

    /// Unnamed entry with `size` zeroed data bytes
    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![0; size],
            ..Self::default()
        }
    }

    /// Unnamed entry holding a copy of `data`
    pub fn with_data(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_data_and_name(name: &str, var_type: u8, data: &[u8]) -> Self {
        Self {
            name: truncate_name(name),
            var_type,
            invalid: false,
            data: data.to_vec(),
        }
    }

    /// Read an entry's content until EOF
    pub fn from_reader(name: &str, var_type: u8, mut reader: impl Read) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self {
            name: truncate_name(name),
            var_type,
            invalid: false,
            data,
        })
    }

    /// Load an entry from disk, naming it after the file stem
    pub fn from_file(path: &Path, var_type: u8) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| HpError::Filename(path.display().to_string()))?;
        let file = std::fs::File::open(path)?;
        Self::from_reader(name, var_type, file)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Name as UTF-16LE bytes, the encoding used on the wire
    pub fn name_utf16le(&self) -> Vec<u8> {
        self.name.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    /// Log the entry
    pub fn display(&self) {
        info!(
            name = %self.name,
            var_type = format_args!("{:#04x}", self.var_type),
            size = self.size(),
            invalid = self.invalid,
            "var entry"
        );
    }
}
