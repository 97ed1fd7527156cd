//! Offline voice-command core: wake-phrase listening, command matching,
//! timer and arithmetic handling.

#[cfg(feature = "mic")]
pub mod capture;
pub mod command;
pub mod config;
pub mod duration;
pub mod matcher;
pub mod math;
pub mod normalize;
pub mod segmenter;
pub mod session;
pub mod state;
pub mod timers;
pub mod transcriber;
pub mod ui;
pub mod vad;
pub mod wake;
