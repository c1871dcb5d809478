//! Cable trait, the owning cable handle, and the dummy cable.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{CableModel, HpError, Result};

/// Static information about a cable model
#[derive(Debug, Clone, Copy)]
pub struct CableInfo {
    pub model: CableModel,
    pub name: &'static str,
    pub description: &'static str,
    /// Read timeout applied by a fresh handle
    pub default_read_timeout: Duration,
}

/// Transport driver - object-safe for `dyn Cable`
///
/// Drivers only talk to their resource. Open/closed bookkeeping lives in
/// [`CableHandle`], which never forwards a call the current state forbids.
pub trait Cable: Send {
    fn info(&self) -> &'static CableInfo;

    /// Check whether the device is present, without claiming it
    fn probe(&mut self) -> Result<()> {
        Err(HpError::CableInvalidFncts("probe"))
    }

    /// Claim the device
    fn open(&mut self) -> Result<()>;

    /// Release the device
    fn close(&mut self) -> Result<()>;

    /// Write one report verbatim
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read at most `buf.len()` bytes, waiting up to `timeout`.
    /// Returns the number of bytes actually read.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

/// One transport endpoint, opened or not.
///
/// All methods take `&mut self`, so a handle cannot be driven by two
/// operations at once. While attached to a calculator it is owned by that
/// calculator handle.
pub struct CableHandle {
    cable: Box<dyn Cable>,
    read_timeout: Duration,
    open: bool,
}

impl CableHandle {
    /// Wrap a driver. The handle starts closed.
    pub fn new(cable: Box<dyn Cable>) -> Self {
        let read_timeout = cable.info().default_read_timeout;
        Self {
            cable,
            read_timeout,
            open: false,
        }
    }

    pub fn info(&self) -> &'static CableInfo {
        self.cable.info()
    }

    pub fn model(&self) -> CableModel {
        self.info().model
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Set the read timeout, returning the previous one
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Duration {
        debug!(model = %self.model(), ?timeout, "set read timeout");
        std::mem::replace(&mut self.read_timeout, timeout)
    }

    pub fn probe(&mut self) -> Result<()> {
        self.cable.probe()
    }

    pub fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(HpError::CableAlreadyOpen);
        }
        self.cable.open()?;
        self.open = true;
        debug!(model = %self.model(), "cable opened");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(HpError::CableNotOpen);
        }
        self.cable.close()?;
        self.open = false;
        debug!(model = %self.model(), "cable closed");
        Ok(())
    }

    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(HpError::CableNotOpen);
        }
        self.cable.send(data)
    }

    /// Read with the handle's configured timeout
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.open {
            return Err(HpError::CableNotOpen);
        }
        self.cable.recv(buf, self.read_timeout)
    }

    /// Log the handle state
    pub fn display(&self) {
        info!(
            model = %self.model(),
            name = self.info().name,
            open = self.open,
            read_timeout = ?self.read_timeout,
            "cable handle"
        );
    }
}

impl std::fmt::Debug for CableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CableHandle")
            .field("model", &self.model())
            .field("open", &self.open)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl Drop for CableHandle {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.close() {
                warn!("failed to close cable on drop: {e}");
            }
        }
    }
}

pub const NUL_INFO: CableInfo = CableInfo {
    model: CableModel::Nul,
    name: "Nul",
    description: "Dummy cable",
    default_read_timeout: Duration::from_secs(2),
};

/// Cable that accepts everything and never receives anything
#[derive(Debug, Default)]
pub struct NulCable;

impl Cable for NulCable {
    fn info(&self) -> &'static CableInfo {
        &NUL_INFO
    }

    fn probe(&mut self) -> Result<()> {
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn recv(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        Ok(0)
    }
}
