use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::matcher::CommandTemplate;
use crate::math::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_LENGTH};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// One or more wake phrases separated by `|`, `,` or `;`
    #[serde(default = "default_wake_word")]
    pub wake_word: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub listening: ListeningConfig,
    #[serde(default)]
    pub math: MathConfig,
    #[serde(default)]
    pub transcriber: TranscriberConfig,
    /// Command templates; the built-in set is used when empty
    #[serde(default)]
    pub commands: Vec<CommandTemplate>,
    /// Site aliases handed to the dispatch layer
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_word: default_wake_word(),
            sample_rate: default_sample_rate(),
            listening: ListeningConfig::default(),
            math: MathConfig::default(),
            transcriber: TranscriberConfig::default(),
            commands: Vec::new(),
            targets: HashMap::new(),
        }
    }
}

fn default_wake_word() -> String {
    "джарвис|jarvis".into()
}

fn default_sample_rate() -> u32 {
    16000
}

// ============================================================================
// Listening Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ListeningConfig {
    /// Length of a command-capture window
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Quiet time after speech that ends a command
    #[serde(default = "default_silence_timeout")]
    pub silence_timeout_ms: u64,

    /// RMS level (f32 samples) above which a frame counts as speech
    #[serde(default = "default_rms_threshold")]
    pub rms_threshold: f32,

    /// Input device index, default device when unset
    #[serde(default)]
    pub device_index: Option<usize>,

    /// Re-arm capture after each command without a wake phrase
    #[serde(default)]
    pub direct_mode: bool,

    /// Log every hypothesis
    #[serde(default)]
    pub debug_transcripts: bool,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            silence_timeout_ms: default_silence_timeout(),
            rms_threshold: default_rms_threshold(),
            device_index: None,
            direct_mode: false,
            debug_transcripts: false,
        }
    }
}

fn default_command_timeout() -> u64 {
    8
}

fn default_silence_timeout() -> u64 {
    1200
}

fn default_rms_threshold() -> f32 {
    0.015
}

// ============================================================================
// Math Config
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MathConfig {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for MathConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

// ============================================================================
// Transcriber Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriberConfig {
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_vad_model_path")]
    pub vad_model_path: String,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            vad_model_path: default_vad_model_path(),
        }
    }
}

fn default_model_path() -> String {
    "models/parakeet-tdt-0.6b-v3-int8".into()
}

fn default_vad_model_path() -> String {
    "models/silero_vad.onnx".into()
}

// ============================================================================
// Built-in commands
// ============================================================================

const BUILTIN_COMMANDS: &str = r#"
[[commands]]
id = "time"
patterns = ["который час", "сколько времени", "what time is it", "what's the time"]
action = { type = "time_now" }

[[commands]]
id = "date"
patterns = ["какое сегодня число", "какая сегодня дата", "what is the date", "what day is it"]
action = { type = "date_today" }

[[commands]]
id = "timer_status"
patterns = ["сколько осталось", "статус таймера", "how much time is left", "timer status"]
action = { type = "timer_status" }

[[commands]]
id = "timer_cancel"
patterns = ["отмени таймер {name}", "отмени таймер", "cancel the {name} timer", "cancel timer {name}", "cancel the timer", "cancel timer"]
action = { type = "timer_cancel", param = "name" }

[[commands]]
id = "timer_set"
patterns = ["поставь таймер {text}", "таймер {text}", "засеки {text}", "set a timer {text}", "set timer {text}", "timer {text}"]
action = { type = "timer_set", param = "text" }

[[commands]]
id = "math"
patterns = ["сколько будет {expr}", "посчитай {expr}", "calculate {expr}", "what is {expr}"]
action = { type = "math_eval", param = "expr" }

[[commands]]
id = "search"
patterns = ["найди {query}", "search for {query}", "google {query}"]
action = { type = "google_search", param = "query", tts = "Searching for {query}" }

[[commands]]
id = "say"
patterns = ["скажи {text}", "say {text}", "repeat {text}"]
action = { type = "say", tts = "{text}" }
"#;

#[derive(Deserialize)]
struct CommandFile {
    #[serde(default)]
    commands: Vec<CommandTemplate>,
}

/// Templates used when the config file defines none
pub fn builtin_commands() -> Vec<CommandTemplate> {
    match toml::from_str::<CommandFile>(BUILTIN_COMMANDS) {
        Ok(file) => file.commands,
        Err(e) => {
            log::error!("Built-in command table is invalid: {}", e);
            Vec::new()
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when missing or invalid
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Config::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{}; using defaults", e);
                Config::default()
            }
        }
    }

    /// Strict load: any read or parse failure is an error
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Configured templates, or the built-in set
    pub fn command_templates(&self) -> Vec<CommandTemplate> {
        if self.commands.is_empty() {
            builtin_commands()
        } else {
            self.commands.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.wake_word, "джарвис|jarvis");
        assert_eq!(config.listening.command_timeout_secs, 8);
        assert_eq!(config.listening.silence_timeout_ms, 1200);
        assert_eq!(config.math.max_depth, 6);
        assert!(config.commands.is_empty());
    }

    #[test]
    fn test_builtin_commands_parse() {
        let commands = builtin_commands();
        assert!(commands.len() >= 6);
        assert!(commands.iter().all(|c| c.action.contains_key("type")));
        assert_eq!(Config::default().command_templates().len(), commands.len());
    }

    #[test]
    fn test_partial_section() {
        let config = Config::parse(
            r#"
            wake_word = "computer"
            [listening]
            direct_mode = true
            device_index = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.wake_word, "computer");
        assert!(config.listening.direct_mode);
        assert_eq!(config.listening.device_index, Some(2));
        assert_eq!(config.listening.rms_threshold, 0.015);
    }
}
