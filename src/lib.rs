//! Communication library for HP calculators.
//!
//! Handles are created from a model tag: a [`CableHandle`] for the link and
//! a [`CalcHandle`] for the calculator session. Attaching the cable to the
//! calculator opens it; every calculator operation then runs a single
//! request/reply exchange over it.
//!
//! ```no_run
//! use hpcalcs::{cable_new, calc_new, CableModel, CalcModel, ScreenshotFormat};
//!
//! let calc = calc_new(CalcModel::Prime);
//! calc.attach(cable_new(CableModel::PrimeHid))?;
//! let png = calc.recv_screen(ScreenshotFormat::Png320x240x16)?;
//! # Ok::<(), hpcalcs::HpError>(())
//! ```

pub mod config;

use tracing::debug;

pub use hp_prime::{Prime, PrimeType};
pub use hpcalcs_core::*;
pub use prime_hid::PrimeHid;

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Create a closed cable handle of the given model
pub fn cable_new(model: CableModel) -> CableHandle {
    match model {
        CableModel::Nul => CableHandle::new(Box::new(NulCable)),
        CableModel::PrimeHid => CableHandle::new(Box::new(PrimeHid::new())),
    }
}

/// Create a detached calculator handle of the given model
pub fn calc_new(model: CalcModel) -> CalcHandle {
    match model {
        CalcModel::Prime => CalcHandle::new(Box::new(Prime::new())),
    }
}

/// Static description of a cable model
pub fn cable_info(model: CableModel) -> &'static CableInfo {
    match model {
        CableModel::Nul => &NUL_INFO,
        CableModel::PrimeHid => &prime_hid::INFO,
    }
}

/// Static description of a calculator model
pub fn calc_info(model: CalcModel) -> &'static CalcInfo {
    match model {
        CalcModel::Prime => &hp_prime::INFO,
    }
}

/// Cable models whose device is currently present
pub fn probe_cables() -> Vec<CableModel> {
    CableModel::ALL
        .iter()
        .copied()
        .filter(|model| *model != CableModel::Nul)
        .filter(|model| {
            let found = cable_new(*model).probe().is_ok();
            debug!(%model, found, "probed cable");
            found
        })
        .collect()
}
