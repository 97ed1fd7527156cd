//! Shared listener state - thread-safe settings that can change while a session runs
//!
//! The session reads these on every frame, so updates from the UI or dispatcher
//! take effect immediately without restarting capture or losing buffered text.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::ListeningConfig;

/// Listener status reported to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerStatus {
    Idle = 0,
    Listening = 1,
    Executing = 2,
}

impl From<u8> for ListenerStatus {
    fn from(v: u8) -> Self {
        match v {
            1 => ListenerStatus::Listening,
            2 => ListenerStatus::Executing,
            _ => ListenerStatus::Idle,
        }
    }
}

impl fmt::Display for ListenerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerStatus::Idle => write!(f, "Idle"),
            ListenerStatus::Listening => write!(f, "Listening"),
            ListenerStatus::Executing => write!(f, "Executing"),
        }
    }
}

/// Thread-safe f32 using bit casting to AtomicU32
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    pub fn store(&self, v: f32, order: Ordering) {
        self.0.store(v.to_bits(), order);
    }
}

/// Live-tunable listener settings
pub struct ListenerSettings {
    command_timeout_secs: AtomicU64,
    silence_timeout_ms: AtomicU64,
    rms_threshold: AtomicF32,
    device_index: Mutex<Option<usize>>,
    direct_mode: AtomicBool,
    debug_transcripts: AtomicBool,
    status: AtomicU8,
}

impl ListenerSettings {
    pub fn new(config: &ListeningConfig) -> Arc<Self> {
        Arc::new(Self {
            command_timeout_secs: AtomicU64::new(config.command_timeout_secs),
            silence_timeout_ms: AtomicU64::new(config.silence_timeout_ms),
            rms_threshold: AtomicF32::new(config.rms_threshold),
            device_index: Mutex::new(config.device_index),
            direct_mode: AtomicBool::new(config.direct_mode),
            debug_transcripts: AtomicBool::new(config.debug_transcripts),
            status: AtomicU8::new(ListenerStatus::Idle as u8),
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.load(Ordering::SeqCst))
    }

    pub fn set_command_timeout_secs(&self, secs: u64) {
        self.command_timeout_secs.store(secs, Ordering::SeqCst);
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms.load(Ordering::SeqCst))
    }

    pub fn set_silence_timeout_ms(&self, ms: u64) {
        self.silence_timeout_ms.store(ms, Ordering::SeqCst);
    }

    pub fn rms_threshold(&self) -> f32 {
        self.rms_threshold.load(Ordering::SeqCst)
    }

    pub fn set_rms_threshold(&self, threshold: f32) {
        self.rms_threshold.store(threshold.max(0.0), Ordering::SeqCst);
    }

    pub fn device_index(&self) -> Option<usize> {
        *self
            .device_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes effect on the next capture start
    pub fn set_device_index(&self, index: Option<usize>) {
        *self
            .device_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = index;
    }

    pub fn direct_mode(&self) -> bool {
        self.direct_mode.load(Ordering::SeqCst)
    }

    pub fn set_direct_mode(&self, enabled: bool) {
        self.direct_mode.store(enabled, Ordering::SeqCst);
    }

    /// Toggle direct mode, returns new state
    pub fn toggle_direct_mode(&self) -> bool {
        !self.direct_mode.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn debug_transcripts(&self) -> bool {
        self.debug_transcripts.load(Ordering::SeqCst)
    }

    pub fn set_debug_transcripts(&self, enabled: bool) {
        self.debug_transcripts.store(enabled, Ordering::SeqCst);
    }

    pub fn status(&self) -> ListenerStatus {
        ListenerStatus::from(self.status.load(Ordering::SeqCst))
    }

    pub fn set_status(&self, status: ListenerStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }
}

impl fmt::Debug for ListenerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSettings")
            .field("status", &self.status())
            .field("command_timeout", &self.command_timeout())
            .field("silence_timeout", &self.silence_timeout())
            .field("rms_threshold", &self.rms_threshold())
            .field("device_index", &self.device_index())
            .field("direct_mode", &self.direct_mode())
            .finish()
    }
}

/// Type alias for shared settings
pub type SharedSettings = Arc<ListenerSettings>;
