//! Calculator trait and the session facade guarding it.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, TryLockError};

use chrono::{Local, NaiveDateTime, TimeZone};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::{debug, error, info, info_span, Span};

use crate::{CableHandle, CalcModel, HpError, Result, VarEntry};

bitflags::bitflags! {
    /// Operations a calculator model provides
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CalcOps: u32 {
        const CHECK_READY = 1 << 0;
        const GET_INFOS = 1 << 1;
        const SET_DATE_TIME = 1 << 2;
        const RECV_SCREEN = 1 << 3;
        const SEND_FILE = 1 << 4;
        const RECV_FILE = 1 << 5;
        const RECV_BACKUP = 1 << 6;
        const SEND_KEY = 1 << 7;
        const SEND_KEYS = 1 << 8;
        const SEND_CHAT = 1 << 9;
        const RECV_CHAT = 1 << 10;
        const EXTENDED_PROTOCOL = 1 << 11;
    }
}

/// Static information about a calculator model
#[derive(Debug, Clone, Copy)]
pub struct CalcInfo {
    pub model: CalcModel,
    pub name: &'static str,
    pub description: &'static str,
    pub ops: CalcOps,
}

/// Screenshot encodings the calculator can produce
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ScreenshotFormat {
    #[default]
    Png320x240x16 = 8,
    Png320x240x4 = 9,
    Png160x120x16 = 10,
    Png160x120x4 = 11,
}

impl FromStr for ScreenshotFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png-320x240x16" | "320x240x16" => Ok(Self::Png320x240x16),
            "png-320x240x4" | "320x240x4" => Ok(Self::Png320x240x4),
            "png-160x120x16" | "160x120x16" => Ok(Self::Png160x120x16),
            "png-160x120x4" | "160x120x4" => Ok(Self::Png160x120x4),
            _ => Err(format!(
                "unknown screenshot format: {s}. Available: 320x240x16, 320x240x4, 160x120x16, 160x120x4"
            )),
        }
    }
}

/// Opaque device information blob
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CalcInfos {
    pub data: Vec<u8>,
}

/// Outcome of a backup.
///
/// Entries parsed before a failure are kept; `error` tells whether the
/// transfer ran to its end marker.
#[derive(Debug, Default)]
pub struct Backup {
    pub entries: Vec<VarEntry>,
    pub error: Option<HpError>,
}

impl Backup {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Drop partial results, keeping only a complete backup
    pub fn into_result(self) -> Result<Vec<VarEntry>> {
        match self.error {
            None => Ok(self.entries),
            Some(e) => Err(e),
        }
    }
}

/// Calculator driver - object-safe for `dyn Calc`
///
/// Every operation is a request/reply pair over the given cable. Models
/// override the operations they support and advertise them in
/// [`CalcInfo::ops`]; the rest report `CalcInvalidFncts`.
pub trait Calc: Send {
    fn info(&self) -> &'static CalcInfo;

    fn check_ready(&mut self, _cable: &mut CableHandle) -> Result<Vec<u8>> {
        Err(HpError::CalcInvalidFncts("check_ready"))
    }
    fn get_infos(&mut self, _cable: &mut CableHandle) -> Result<CalcInfos> {
        Err(HpError::CalcInvalidFncts("get_infos"))
    }
    fn set_date_time(&mut self, _cable: &mut CableHandle, _time: NaiveDateTime) -> Result<()> {
        Err(HpError::CalcInvalidFncts("set_date_time"))
    }
    fn recv_screen(
        &mut self,
        _cable: &mut CableHandle,
        _format: ScreenshotFormat,
    ) -> Result<Vec<u8>> {
        Err(HpError::CalcInvalidFncts("recv_screen"))
    }
    fn send_file(&mut self, _cable: &mut CableHandle, _file: &VarEntry) -> Result<()> {
        Err(HpError::CalcInvalidFncts("send_file"))
    }
    fn recv_file(
        &mut self,
        _cable: &mut CableHandle,
        _request: &VarEntry,
    ) -> Result<Option<VarEntry>> {
        Err(HpError::CalcInvalidFncts("recv_file"))
    }
    fn recv_backup(&mut self, _cable: &mut CableHandle) -> Result<Backup> {
        Err(HpError::CalcInvalidFncts("recv_backup"))
    }
    fn send_key(&mut self, _cable: &mut CableHandle, _code: u8) -> Result<()> {
        Err(HpError::CalcInvalidFncts("send_key"))
    }
    fn send_keys(&mut self, _cable: &mut CableHandle, _codes: &[u8]) -> Result<()> {
        Err(HpError::CalcInvalidFncts("send_keys"))
    }
    fn send_chat(&mut self, _cable: &mut CableHandle, _text: &str) -> Result<()> {
        Err(HpError::CalcInvalidFncts("send_chat"))
    }
    fn recv_chat(&mut self, _cable: &mut CableHandle) -> Result<String> {
        Err(HpError::CalcInvalidFncts("recv_chat"))
    }
    fn enable_extended_protocol(&mut self, _cable: &mut CableHandle) -> Result<()> {
        Err(HpError::CalcInvalidFncts("enable_extended_protocol"))
    }
}

/// Attaching failed; the cable is handed back
#[derive(Debug, thiserror::Error)]
#[error("failed to attach cable: {error}")]
pub struct AttachError {
    pub error: HpError,
    pub cable: CableHandle,
}

impl From<AttachError> for HpError {
    fn from(e: AttachError) -> Self {
        e.error
    }
}

struct Session {
    calc: Box<dyn Calc>,
    cable: Option<CableHandle>,
}

/// One calculator session.
///
/// At most one operation runs at a time: a second caller gets `CalcBusy`
/// instead of waiting. Operations require an attached, open cable and a
/// model that provides them, and fail before any I/O otherwise.
pub struct CalcHandle {
    info: &'static CalcInfo,
    session: Mutex<Session>,
    span: Span,
}

impl CalcHandle {
    /// Wrap a driver. The handle starts detached.
    pub fn new(calc: Box<dyn Calc>) -> Self {
        let info = calc.info();
        Self {
            info,
            session: Mutex::new(Session { calc, cable: None }),
            span: info_span!("calc", model = %info.model),
        }
    }

    pub fn info(&self) -> &'static CalcInfo {
        self.info
    }

    pub fn model(&self) -> CalcModel {
        self.info.model
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session>> {
        match self.session.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(HpError::CalcBusy),
            // a panicking operation leaves no half-written state behind
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
        }
    }

    /// Whether an operation is currently in flight
    pub fn is_busy(&self) -> bool {
        matches!(self.session.try_lock(), Err(TryLockError::WouldBlock))
    }

    pub fn is_attached(&self) -> Result<bool> {
        Ok(self.lock()?.cable.is_some())
    }

    /// Take ownership of `cable`, opening it if needed
    pub fn attach(&self, mut cable: CableHandle) -> std::result::Result<(), AttachError> {
        let mut session = match self.lock() {
            Ok(session) => session,
            Err(error) => return Err(AttachError { error, cable }),
        };
        if session.cable.is_some() {
            let error = HpError::InvalidParameter("a cable is already attached");
            return Err(AttachError { error, cable });
        }
        if !cable.is_open() {
            if let Err(error) = cable.open() {
                return Err(AttachError { error, cable });
            }
        }
        let _enter = self.span.enter();
        debug!(cable = %cable.model(), "cable attached");
        session.cable = Some(cable);
        Ok(())
    }

    /// Close the attached cable and hand it back.
    ///
    /// If closing fails the cable stays attached.
    pub fn detach(&self) -> Result<CableHandle> {
        let mut session = self.lock()?;
        let cable = session.cable.as_mut().ok_or(HpError::NoCable)?;
        if cable.is_open() {
            cable.close()?;
        }
        let _enter = self.span.enter();
        debug!("cable detached");
        session.cable.take().ok_or(HpError::NoCable)
    }

    /// Run `f` on the attached cable, holding the session
    pub fn with_cable<R>(&self, f: impl FnOnce(&mut CableHandle) -> R) -> Result<R> {
        let mut session = self.lock()?;
        let cable = session.cable.as_mut().ok_or(HpError::NoCable)?;
        Ok(f(cable))
    }

    fn call<T>(
        &self,
        op: CalcOps,
        name: &'static str,
        f: impl FnOnce(&mut dyn Calc, &mut CableHandle) -> Result<T>,
    ) -> Result<T> {
        let mut session = self.lock()?;
        let Session { calc, cable } = &mut *session;
        let cable = cable.as_mut().ok_or(HpError::NoCable)?;
        if !cable.is_open() {
            return Err(HpError::CableNotOpen);
        }
        if !self.info.ops.contains(op) {
            return Err(HpError::CalcInvalidFncts(name));
        }

        let _enter = self.span.enter();
        debug!(op = name, "calc operation");
        f(calc.as_mut(), cable).inspect_err(|e| error!(op = name, "{e}"))
    }

    pub fn check_ready(&self) -> Result<Vec<u8>> {
        self.call(CalcOps::CHECK_READY, "check_ready", |calc, cable| {
            calc.check_ready(cable)
        })
    }

    pub fn get_infos(&self) -> Result<CalcInfos> {
        self.call(CalcOps::GET_INFOS, "get_infos", |calc, cable| {
            calc.get_infos(cable)
        })
    }

    /// Set the calculator clock to the local time of a unix timestamp
    pub fn set_date_time(&self, timestamp: i64) -> Result<()> {
        self.call(CalcOps::SET_DATE_TIME, "set_date_time", |calc, cable| {
            let time = Local
                .timestamp_opt(timestamp, 0)
                .single()
                .ok_or(HpError::SplitTimestamp)?
                .naive_local();
            calc.set_date_time(cable, time)
        })
    }

    pub fn recv_screen(&self, format: ScreenshotFormat) -> Result<Vec<u8>> {
        self.call(CalcOps::RECV_SCREEN, "recv_screen", |calc, cable| {
            calc.recv_screen(cable, format)
        })
    }

    pub fn send_file(&self, file: &VarEntry) -> Result<()> {
        self.call(CalcOps::SEND_FILE, "send_file", |calc, cable| {
            calc.send_file(cable, file)
        })
    }

    /// Request one variable. `None` means the calculator has no such file.
    pub fn recv_file(&self, request: &VarEntry) -> Result<Option<VarEntry>> {
        self.call(CalcOps::RECV_FILE, "recv_file", |calc, cable| {
            calc.recv_file(cable, request)
        })
    }

    pub fn recv_backup(&self) -> Result<Backup> {
        self.call(CalcOps::RECV_BACKUP, "recv_backup", |calc, cable| {
            calc.recv_backup(cable)
        })
    }

    pub fn send_key(&self, code: u8) -> Result<()> {
        self.call(CalcOps::SEND_KEY, "send_key", |calc, cable| {
            calc.send_key(cable, code)
        })
    }

    pub fn send_keys(&self, codes: &[u8]) -> Result<()> {
        self.call(CalcOps::SEND_KEYS, "send_keys", |calc, cable| {
            calc.send_keys(cable, codes)
        })
    }

    pub fn send_chat(&self, text: &str) -> Result<()> {
        self.call(CalcOps::SEND_CHAT, "send_chat", |calc, cable| {
            calc.send_chat(cable, text)
        })
    }

    pub fn recv_chat(&self) -> Result<String> {
        self.call(CalcOps::RECV_CHAT, "recv_chat", |calc, cable| {
            calc.recv_chat(cable)
        })
    }

    pub fn enable_extended_protocol(&self) -> Result<()> {
        self.call(
            CalcOps::EXTENDED_PROTOCOL,
            "enable_extended_protocol",
            |calc, cable| calc.enable_extended_protocol(cable),
        )
    }

    /// Log the handle state
    pub fn display(&self) {
        let _enter = self.span.enter();
        match self.session.try_lock() {
            Ok(session) => info!(
                name = self.info.name,
                attached = session.cable.is_some(),
                open = session.cable.as_ref().is_some_and(CableHandle::is_open),
                busy = false,
                "calc handle"
            ),
            Err(_) => info!(name = self.info.name, busy = true, "calc handle"),
        }
    }
}

impl std::fmt::Debug for CalcHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalcHandle")
            .field("model", &self.info.model)
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl Drop for CalcHandle {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // the cable closes itself when dropped
        if session.cable.take().is_some() {
            let _enter = self.span.enter();
            debug!("cable detached on drop");
        }
    }
}
