//! Command dispatch - turns captured utterances into replies or resolved actions
//!
//! Utterances are processed in order:
//! 1. Wake phrase prefix is stripped
//! 2. PatternMatcher resolves against the command templates
//! 3. Fallbacks - timer keyword sets a timer, any digit evaluates math
//! 4. Anything else is reported as not recognized
//!
//! Actions the assistant can answer itself (time, timers, math...) produce a
//! `Reply`. OS-level actions are resolved into a `ResolvedCommand` for the
//! external dispatch layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Local};

use crate::config::Config;
use crate::duration::{format_spoken, parse_timer_request};
use crate::matcher::{ActionDescriptor, MatchResult, PatternMatcher};
use crate::math::{MathEvaluator, format_value};
use crate::normalize::normalize_text;
use crate::state::ListenerSettings;
use crate::timers::TimerRegistry;
use crate::wake::WakePhrases;

pub const NOT_RECOGNIZED: &str = "Command not recognized";

/// Every action type a template may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    // Answered by the assistant itself
    Say,
    Joke,
    TimeNow,
    DateToday,
    TimerSet,
    TimerStatus,
    TimerCancel,
    MathEval,
    // Handed to the external dispatch layer
    OpenBrowser,
    OpenUrl,
    OpenSite,
    GoogleSearch,
    WikiSearch,
    WeatherSearch,
    Translate,
    RunAllowlist,
    TypeText,
    Hotkey,
    NoteAdd,
    NoteList,
    VolumeUp,
    VolumeDown,
    VolumeMax,
    VolumeMute,
    VolumeUnmute,
    BrightnessUp,
    BrightnessDown,
    MediaPlayPause,
    MediaNext,
    MediaPrev,
    ShowDesktop,
    CloseWindow,
    SwitchWindow,
    Screenshot,
    SystemShutdown,
    SystemRestart,
    SystemSleep,
    SystemLock,
    BatteryStatus,
}

static ACTION_TABLE: LazyLock<HashMap<&'static str, ActionKind>> = LazyLock::new(|| {
    use ActionKind::*;
    HashMap::from([
        ("say", Say),
        ("joke", Joke),
        ("time_now", TimeNow),
        ("date_today", DateToday),
        ("timer_set", TimerSet),
        ("timer_status", TimerStatus),
        ("timer_cancel", TimerCancel),
        ("math_eval", MathEval),
        ("open_browser", OpenBrowser),
        ("open_url", OpenUrl),
        ("open_site", OpenSite),
        ("google_search", GoogleSearch),
        ("wiki_search", WikiSearch),
        ("weather_search", WeatherSearch),
        ("translate", Translate),
        ("run_allowlist", RunAllowlist),
        ("type_text", TypeText),
        ("hotkey", Hotkey),
        ("note_add", NoteAdd),
        ("note_list", NoteList),
        ("volume_up", VolumeUp),
        ("volume_down", VolumeDown),
        ("volume_max", VolumeMax),
        ("volume_mute", VolumeMute),
        ("volume_unmute", VolumeUnmute),
        ("brightness_up", BrightnessUp),
        ("brightness_down", BrightnessDown),
        ("media_play_pause", MediaPlayPause),
        ("media_next", MediaNext),
        ("media_prev", MediaPrev),
        ("show_desktop", ShowDesktop),
        ("close_window", CloseWindow),
        ("switch_window", SwitchWindow),
        ("screenshot", Screenshot),
        ("system_shutdown", SystemShutdown),
        ("system_restart", SystemRestart),
        ("system_sleep", SystemSleep),
        ("system_lock", SystemLock),
        ("battery_status", BatteryStatus),
    ])
});

impl ActionKind {
    pub fn from_type(name: &str) -> Option<Self> {
        ACTION_TABLE.get(name.trim()).copied()
    }

    /// Answered without the external dispatch layer
    pub fn is_builtin(self) -> bool {
        use ActionKind::*;
        matches!(
            self,
            Say | Joke | TimeNow | DateToday | TimerSet | TimerStatus | TimerCancel | MathEval
        )
    }
}

/// User-facing text plus optional text to speak
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: String,
    pub speech: Option<String>,
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            speech: None,
        }
    }

    /// Shown and spoken
    pub fn spoken(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            speech: Some(message.clone()),
            message,
        }
    }
}

/// An action for the external dispatch layer
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommand {
    pub kind: ActionKind,
    pub command_id: String,
    pub action: ActionDescriptor,
    pub params: HashMap<String, String>,
    /// Target URL for `open_url` / `open_site`
    pub url: Option<String>,
    pub speech: Option<String>,
    pub raw_text: String,
}

/// Result of command processing
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Handled here, show/speak the reply
    Reply(Reply),
    /// Resolved, to be executed by the dispatch layer
    Action(ResolvedCommand),
    /// Unresolved or failed, message explains why
    Failed(Reply),
    /// Request application shutdown
    Shutdown,
}

const JOKES: &[&str] = &[
    "Programmers don't skydive, they make a backup first.",
    "Sometimes it's best to turn it off and on again.",
    "My cat isn't afraid of bugs. It likes them.",
];

/// Command processor - resolves utterances and answers built-in actions
pub struct CommandProcessor {
    matcher: PatternMatcher,
    wake: WakePhrases,
    timers: Arc<TimerRegistry>,
    math: MathEvaluator,
    targets: HashMap<String, String>,
    next_joke: AtomicUsize,
}

impl CommandProcessor {
    /// Create new command processor from config
    pub fn new(config: &Config, timers: Arc<TimerRegistry>) -> Self {
        let targets = config
            .targets
            .iter()
            .map(|(alias, url)| (normalize_text(alias), url.clone()))
            .collect();
        Self {
            matcher: PatternMatcher::new(config.command_templates()),
            wake: WakePhrases::new(&config.wake_word),
            timers,
            math: MathEvaluator::new(config.math.max_length, config.math.max_depth),
            targets,
            next_joke: AtomicUsize::new(0),
        }
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Process an utterance
    #[hotpath::measure]
    pub fn process(&self, text: &str) -> CommandResult {
        self.process_at(text, Local::now())
    }

    pub fn process_at(&self, text: &str, now: DateTime<Local>) -> CommandResult {
        let normalized = normalize_text(text);
        let cleaned = self.wake.strip_prefix(&normalized);
        if cleaned.is_empty() {
            return CommandResult::Failed(Reply::text(NOT_RECOGNIZED));
        }

        // wake-stripped but otherwise as written, operator symbols intact
        let spoken = self.wake.strip_raw_prefix(text);

        if let Some(matched) = self.matcher.resolve(cleaned) {
            log::debug!("Matched command '{}' {:?}", matched.command_id, matched.params);
            return self.dispatch(matched, text, cleaned, spoken, now);
        }

        if cleaned.contains("таймер") || cleaned.contains("timer") {
            return self.set_timer(cleaned);
        }
        if cleaned.chars().any(|c| c.is_ascii_digit()) {
            return self.evaluate(spoken);
        }
        CommandResult::Failed(Reply::text(NOT_RECOGNIZED))
    }

    fn dispatch(
        &self,
        matched: MatchResult,
        raw_text: &str,
        cleaned: &str,
        spoken: &str,
        now: DateTime<Local>,
    ) -> CommandResult {
        let action_type = matched
            .action
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let Some(kind) = ActionKind::from_type(action_type) else {
            log::warn!(
                "Command '{}' has unknown action type {:?}",
                matched.command_id,
                action_type
            );
            return CommandResult::Failed(Reply::text(NOT_RECOGNIZED));
        };

        let payload = action_str(&matched.action, "param")
            .and_then(|p| matched.params.get(p))
            .map(String::as_str);

        match kind {
            ActionKind::Say => {
                let speech = format_template(&matched.action, &matched.params)
                    .or_else(|| action_str(&matched.action, "text").map(str::to_string))
                    .filter(|s| !s.is_empty());
                let message = action_str(&matched.action, "log")
                    .map(str::to_string)
                    .or_else(|| speech.clone())
                    .unwrap_or_else(|| "OK".to_string());
                CommandResult::Reply(Reply { message, speech })
            }
            ActionKind::Joke => {
                let i = self.next_joke.fetch_add(1, Ordering::Relaxed);
                CommandResult::Reply(Reply::spoken(JOKES[i % JOKES.len()]))
            }
            ActionKind::TimeNow => {
                CommandResult::Reply(Reply::spoken(format!("It's {}", now.format("%H:%M"))))
            }
            ActionKind::DateToday => CommandResult::Reply(Reply::spoken(format!(
                "Today is {}",
                now.format("%A, %-d %B %Y")
            ))),
            ActionKind::TimerSet => self.set_timer(payload.unwrap_or(cleaned)),
            ActionKind::TimerStatus => CommandResult::Reply(Reply::spoken(self.timers.describe_status())),
            ActionKind::TimerCancel => self.cancel_timer(payload),
            // operator symbols are lost in normalization
            ActionKind::MathEval => self.evaluate(spoken),
            _ => CommandResult::Action(self.resolve_external(kind, matched, raw_text)),
        }
    }

    fn set_timer(&self, text: &str) -> CommandResult {
        let parsed = parse_timer_request(text);
        let Some(seconds) = parsed.seconds else {
            return CommandResult::Failed(Reply::text("Couldn't understand the time"));
        };
        let entry = self.timers.add(seconds, parsed.label);
        let label = entry.display_name();
        CommandResult::Reply(Reply {
            message: format!("Timer {} started", label),
            speech: Some(format!("Timer {} for {}", label, format_spoken(entry.duration_secs))),
        })
    }

    fn cancel_timer(&self, name: Option<&str>) -> CommandResult {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            if self.timers.cancel_by_name(name) {
                return CommandResult::Reply(Reply::spoken(format!("Timer {} cancelled", name)));
            }
            return CommandResult::Failed(Reply::text("Timer not found"));
        }

        let timers = self.timers.list();
        match timers.as_slice() {
            [] => CommandResult::Failed(Reply::text("No active timers")),
            [only] => {
                self.timers.cancel(&only.id);
                CommandResult::Reply(Reply::spoken("Timer cancelled"))
            }
            _ => CommandResult::Failed(Reply::text("Which timer should I cancel?")),
        }
    }

    fn evaluate(&self, text: &str) -> CommandResult {
        match self.math.evaluate(text) {
            Ok(value) => {
                let formatted = format_value(value);
                if formatted.is_empty() {
                    return CommandResult::Failed(Reply::text("Couldn't calculate that"));
                }
                CommandResult::Reply(Reply::spoken(format!("Answer: {}", formatted)))
            }
            Err(e) => {
                log::debug!("Math evaluation of {:?} failed: {}", text, e);
                CommandResult::Failed(Reply::text("Couldn't calculate that"))
            }
        }
    }

    fn resolve_external(&self, kind: ActionKind, matched: MatchResult, raw_text: &str) -> ResolvedCommand {
        let url = match kind {
            ActionKind::OpenUrl => action_str(&matched.action, "url").map(str::to_string),
            ActionKind::OpenSite => action_str(&matched.action, "param")
                .and_then(|p| matched.params.get(p))
                .map(|site| self.resolve_site(site)),
            _ => None,
        };
        let speech = format_template(&matched.action, &matched.params);
        ResolvedCommand {
            kind,
            command_id: matched.command_id,
            action: matched.action,
            params: matched.params,
            url,
            speech,
            raw_text: raw_text.to_string(),
        }
    }

    /// Alias from `[targets]`, otherwise the site name itself as https URL
    fn resolve_site(&self, site: &str) -> String {
        if let Some(url) = self.targets.get(&normalize_text(site)) {
            return url.clone();
        }
        if site.starts_with("http") {
            site.to_string()
        } else {
            format!("https://{}", site)
        }
    }
}

fn action_str<'a>(action: &'a ActionDescriptor, key: &str) -> Option<&'a str> {
    action.get(key).and_then(|v| v.as_str())
}

/// Fill the action's `tts` template; unchanged when a placeholder has no value
fn format_template(action: &ActionDescriptor, params: &HashMap<String, String>) -> Option<String> {
    let template = action_str(action, "tts")?;
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let Some(value) = params.get(name) else {
            return Some(template.to_string());
        };
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Check if input is a slash command (keyboard input)
pub fn process_slash_command(
    input: &str,
    settings: &ListenerSettings,
    timers: &TimerRegistry,
) -> Option<CommandResult> {
    let input = input.trim();
    let cmd = input.strip_prefix('/')?.to_lowercase();

    let reply = match cmd.as_str() {
        "direct" => {
            let enabled = settings.toggle_direct_mode();
            let state = if enabled { "on" } else { "off" };
            format!("Direct mode {}", state)
        }
        "debug" => {
            let enabled = !settings.debug_transcripts();
            settings.set_debug_transcripts(enabled);
            let state = if enabled { "on" } else { "off" };
            format!("Transcript logging {}", state)
        }
        "timers" => timers.describe_status(),
        "status" => format!(
            "Status: {}, Direct: {}, Timeout: {}s, Silence: {}ms, Timers: {}",
            settings.status(),
            if settings.direct_mode() { "on" } else { "off" },
            settings.command_timeout().as_secs(),
            settings.silence_timeout().as_millis(),
            timers.len(),
        ),
        "quit" | "exit" => return Some(CommandResult::Shutdown),
        "help" | "commands" => "\
Commands:
  /direct - Toggle direct mode (no wake phrase between commands)
  /debug - Toggle transcript logging
  /timers - Show the next timer
  /status - Show current status
  /quit - Exit application
  /help or /commands - Show this help"
            .to_string(),
        _ => return None,
    };
    Some(CommandResult::Reply(Reply::text(reply)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListeningConfig;

    fn descriptor(pairs: &[(&str, &str)]) -> ActionDescriptor {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), toml::Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_action_table() {
        assert_eq!(ActionKind::from_type("timer_set"), Some(ActionKind::TimerSet));
        assert_eq!(ActionKind::from_type("open_site"), Some(ActionKind::OpenSite));
        assert_eq!(ActionKind::from_type("launch_rockets"), None);
        assert!(ActionKind::MathEval.is_builtin());
        assert!(!ActionKind::Screenshot.is_builtin());
        assert_eq!(ACTION_TABLE.len(), 39);
    }

    #[test]
    fn test_format_template() {
        let params = HashMap::from([("query".to_string(), "rust".to_string())]);
        let action = descriptor(&[("tts", "Searching for {query}")]);
        assert_eq!(format_template(&action, &params).as_deref(), Some("Searching for rust"));

        let action = descriptor(&[("tts", "Opening {site}")]);
        assert_eq!(format_template(&action, &params).as_deref(), Some("Opening {site}"));

        assert_eq!(format_template(&descriptor(&[]), &params), None);
    }

    #[test]
    fn test_slash_commands() {
        let settings = ListenerSettings::new(&ListeningConfig::default());
        let timers = TimerRegistry::new();

        let result = process_slash_command("/direct", &settings, &timers);
        assert!(matches!(result, Some(CommandResult::Reply(_))));
        assert!(settings.direct_mode());

        assert!(process_slash_command("/status", &settings, &timers).is_some());
        assert_eq!(
            process_slash_command("/quit", &settings, &timers),
            Some(CommandResult::Shutdown)
        );
        assert!(process_slash_command("not a command", &settings, &timers).is_none());
        assert!(process_slash_command("/unknown", &settings, &timers).is_none());
    }
}
