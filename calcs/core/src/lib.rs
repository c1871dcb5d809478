//! Core traits and types for hpcalcs cable and calculator drivers.
//!
//! This crate provides:
//! - The `Cable` trait and the `CableHandle` owning an endpoint's open state
//! - The `Calc` trait and the `CalcHandle` session facade
//! - `HpError` with stable numeric codes and message lookup
//! - Common types like `VarEntry`, `CalcOps`, `ScreenshotFormat`

mod cable;
mod calc;
mod error;
mod files;
mod models;

pub use cable::{Cable, CableHandle, CableInfo, NulCable, NUL_INFO};
pub use calc::{
    AttachError, Backup, Calc, CalcHandle, CalcInfo, CalcInfos, CalcOps, ScreenshotFormat,
};
pub use error::{
    cables_error_message, calcs_error_message, error_message, files_error_message,
    generic_error_message, ErrorCode, HpError, Result, Subsystem,
};
pub use files::{VarEntry, MAX_NAME_UNITS};
pub use models::{CableModel, CalcModel};
