use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::command::{CommandResult, Reply};
use crate::duration::format_clock;
use crate::state::ListenerStatus;
use crate::timers::TimerEntry;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

static FRAME: AtomicUsize = AtomicUsize::new(0);

pub fn clear_line() {
    print!("\r\x1b[K");
    std::io::stdout().flush().ok();
}

pub fn show_status(status: ListenerStatus) {
    match status {
        ListenerStatus::Listening => {
            let frame = FRAME.fetch_add(1, Ordering::Relaxed);
            print!("\r\x1b[K\x1b[90m{} Listening...\x1b[0m", SPINNER[frame % SPINNER.len()]);
        }
        ListenerStatus::Executing => print!("\r\x1b[K\x1b[33m⠋ Executing...\x1b[0m"),
        ListenerStatus::Idle => print!("\r\x1b[K"),
    }
    std::io::stdout().flush().ok();
}

pub fn show_wake() {
    print!("\r\x1b[K\x1b[32m● Yes?\x1b[0m");
    std::io::stdout().flush().ok();
}

pub fn show_preview(text: &str) {
    print!("\r\x1b[K\x1b[90m{}\x1b[0m", text);
    std::io::stdout().flush().ok();
}

pub fn show_final(text: &str) {
    print!("\r\x1b[K> {}\n", text);
    std::io::stdout().flush().ok();
}

pub fn show_reply(reply: &Reply) {
    println!("\r\x1b[K\x1b[36m{}\x1b[0m", reply.message);
}

pub fn show_failure(reply: &Reply) {
    println!("\r\x1b[K\x1b[31m{}\x1b[0m", reply.message);
}

pub fn show_error(message: &str) {
    println!("\r\x1b[K\x1b[31mError: {}\x1b[0m", message);
}

pub fn show_result(result: &CommandResult) {
    match result {
        CommandResult::Reply(reply) => show_reply(reply),
        CommandResult::Failed(reply) => show_failure(reply),
        CommandResult::Action(action) => {
            let detail = action
                .url
                .as_deref()
                .or(action.speech.as_deref())
                .unwrap_or(&action.raw_text);
            println!(
                "\r\x1b[K\x1b[35m→ {} ({:?}) {}\x1b[0m",
                action.command_id, action.kind, detail
            );
        }
        CommandResult::Shutdown => {}
    }
}

/// One-line summary of live timers, closest first
pub fn timer_line(timers: &[TimerEntry]) -> String {
    timers
        .iter()
        .map(|t| format!("{} {}", t.display_name(), format_clock(t.remaining_secs)))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn show_timers(timers: &[TimerEntry]) {
    if timers.is_empty() {
        return;
    }
    print!("\r\x1b[K\x1b[90m⏱ {}\x1b[0m", timer_line(timers));
    std::io::stdout().flush().ok();
}

pub fn timer_finished(entry: &TimerEntry) {
    println!("\r\x1b[K\x1b[1;33m⏰ Timer {} finished\x1b[0m", entry.display_name());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timers::TimerStatus;

    fn entry(name: Option<&str>, remaining: u64) -> TimerEntry {
        TimerEntry {
            id: "x".into(),
            name: name.map(str::to_string),
            duration_secs: remaining,
            remaining_secs: remaining,
            status: TimerStatus::Running,
            deadline: None,
        }
    }

    #[test]
    fn test_timer_line() {
        let line = timer_line(&[entry(Some("tea"), 65), entry(None, 3700)]);
        assert_eq!(line, "tea 01:05 | timer 01:01:40");
        assert_eq!(timer_line(&[]), "");
    }
}
