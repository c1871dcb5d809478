//! hidapi cable for the HP Prime

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use hpcalcs_core::{Cable, CableInfo, CableModel, HpError, Result};
use tracing::{debug, info};

pub mod consts {
    pub const PRIME_VENDOR_ID: u16 = 0x03F0;
    pub const PRIME_PRODUCT_ID: u16 = 0x0441;
}

/// Static cable info
pub static INFO: CableInfo = CableInfo {
    model: CableModel::PrimeHid,
    name: "Prime HID",
    description: "HP Prime USB HID cable",
    default_read_timeout: Duration::from_secs(2),
};

/// Shared hidapi context, created on first use
static API: Mutex<Option<HidApi>> = Mutex::new(None);

/// Run `f` against a freshly refreshed device list
fn with_api<R>(f: impl FnOnce(&HidApi) -> Result<R>) -> Result<R> {
    let mut guard = API.lock().unwrap_or_else(PoisonError::into_inner);
    let api = match guard.take() {
        Some(mut api) => {
            api.refresh_devices()?;
            api
        },
        None => HidApi::new()?,
    };
    f(guard.insert(api))
}

fn is_prime(device: &hidapi::DeviceInfo) -> bool {
    device.vendor_id() == consts::PRIME_VENDOR_ID
        && device.product_id() == consts::PRIME_PRODUCT_ID
}

/// USB HID link to an HP Prime
#[derive(Default)]
pub struct PrimeHid {
    device: Option<HidDevice>,
}

impl PrimeHid {
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&self) -> Result<&HidDevice> {
        self.device.as_ref().ok_or(HpError::InvalidHandle)
    }
}

impl Cable for PrimeHid {
    fn info(&self) -> &'static CableInfo {
        &INFO
    }

    fn probe(&mut self) -> Result<()> {
        with_api(|api| {
            let found = api.device_list().any(is_prime);
            debug!(found, "probed for calculator");
            found.then_some(()).ok_or(HpError::CableProbeFailed)
        })
    }

    fn open(&mut self) -> Result<()> {
        let device = with_api(|api| {
            api.open(consts::PRIME_VENDOR_ID, consts::PRIME_PRODUCT_ID)
                .map_err(HpError::from)
        })?;
        if let Ok(Some(product)) = device.get_product_string() {
            info!(%product, "opened calculator");
        }
        self.device = Some(device);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.device.take().map(drop).ok_or(HpError::InvalidHandle)
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let written = self
            .device()?
            .write(data)
            .map_err(|e| HpError::CableWrite(e.to_string()))?;
        if written < data.len() {
            debug!(written, len = data.len(), "short write");
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.device()?
            .read_timeout(buf, millis)
            .map_err(|e| HpError::CableRead(e.to_string()))
    }
}
