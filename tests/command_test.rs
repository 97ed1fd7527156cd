use std::sync::Arc;

use chrono::{Local, TimeZone};
use voicefuzzy::command::{ActionKind, CommandProcessor, CommandResult, NOT_RECOGNIZED};
use voicefuzzy::config::Config;
use voicefuzzy::timers::TimerRegistry;

fn processor(config: &Config) -> (CommandProcessor, Arc<TimerRegistry>) {
    let timers = Arc::new(TimerRegistry::new());
    (CommandProcessor::new(config, Arc::clone(&timers)), timers)
}

fn message(result: &CommandResult) -> &str {
    match result {
        CommandResult::Reply(reply) | CommandResult::Failed(reply) => &reply.message,
        other => panic!("expected a reply, got {:?}", other),
    }
}

#[test]
fn test_time_with_wake_prefix() {
    let (processor, _) = processor(&Config::default());
    let now = Local.with_ymd_and_hms(2026, 10, 14, 14, 5, 0).single().unwrap();

    let result = processor.process_at("Jarvis, what time is it?", now);
    assert_eq!(result, CommandResult::Reply(voicefuzzy::command::Reply::spoken("It's 14:05")));

    let result = processor.process_at("какое сегодня число", now);
    assert_eq!(message(&result), "Today is Wednesday, 14 October 2026");
}

#[test]
fn test_math_template_keeps_operators() {
    let (processor, _) = processor(&Config::default());
    assert_eq!(message(&processor.process("сколько будет 2+2")), "Answer: 4");
    assert_eq!(message(&processor.process("what is 7 times 6")), "Answer: 42");
    assert_eq!(message(&processor.process("посчитай 10 разделить на 4")), "Answer: 2.5");
}

#[test]
fn test_math_fallback_on_digits() {
    let (processor, _) = processor(&Config::default());
    assert_eq!(message(&processor.process("12 * 3")), "Answer: 36");

    let result = processor.process("1 / 0");
    assert!(matches!(result, CommandResult::Failed(_)));
    assert_eq!(message(&result), "Couldn't calculate that");
}

#[test]
fn test_timer_set_and_cancel() {
    let (processor, timers) = processor(&Config::default());

    let result = processor.process("поставь таймер чай на 5 минут");
    match &result {
        CommandResult::Reply(reply) => {
            assert_eq!(reply.message, "Timer чай started");
            assert_eq!(reply.speech.as_deref(), Some("Timer чай for 5 minutes"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(timers.len(), 1);

    processor.process("set a timer pasta for 10 minutes");
    assert_eq!(timers.len(), 2);

    assert_eq!(
        message(&processor.process("cancel timer")),
        "Which timer should I cancel?"
    );
    assert_eq!(
        message(&processor.process("cancel the pasta timer")),
        "Timer pasta cancelled"
    );
    assert_eq!(message(&processor.process("cancel timer")), "Timer cancelled");
    assert_eq!(message(&processor.process("cancel timer")), "No active timers");
    assert!(timers.is_empty());
}

#[test]
fn test_timer_fallback_on_keyword() {
    let (processor, timers) = processor(&Config::default());
    let result = processor.process("через 10 минут таймер");
    assert!(matches!(result, CommandResult::Reply(_)));
    assert_eq!(timers.list()[0].duration_secs, 600);

    let result = processor.process("таймер как-нибудь потом");
    assert_eq!(message(&result), "Couldn't understand the time");
}

#[test]
fn test_timer_status() {
    let (processor, timers) = processor(&Config::default());
    assert_eq!(message(&processor.process("timer status")), "No active timers");
    timers.add(90, Some("pasta".into()));
    assert!(message(&processor.process("сколько осталось")).ends_with("left until pasta"));
}

#[test]
fn test_unrecognized() {
    let (processor, _) = processor(&Config::default());
    assert_eq!(message(&processor.process("hello there")), NOT_RECOGNIZED);
    assert_eq!(message(&processor.process("jarvis")), NOT_RECOGNIZED);
    assert_eq!(message(&processor.process("")), NOT_RECOGNIZED);
}

#[test]
fn test_external_actions() {
    let config = Config::parse(
        r#"
[targets]
github = "https://github.com"

[[commands]]
id = "open"
patterns = ["open {site}"]
action = { type = "open_site", param = "site", tts = "Opening {site}" }

[[commands]]
id = "search"
patterns = ["google {query}"]
action = { type = "google_search", param = "query", tts = "Searching for {query}" }

[[commands]]
id = "rocket"
patterns = ["launch rockets"]
action = { type = "launch_rockets" }
"#,
    )
    .unwrap();
    let (processor, _) = processor(&config);

    match processor.process("open github") {
        CommandResult::Action(action) => {
            assert_eq!(action.kind, ActionKind::OpenSite);
            assert_eq!(action.url.as_deref(), Some("https://github.com"));
            assert_eq!(action.speech.as_deref(), Some("Opening github"));
        }
        other => panic!("unexpected {:?}", other),
    }

    match processor.process("open example.com") {
        CommandResult::Action(action) => {
            assert_eq!(action.url.as_deref(), Some("https://example.com"))
        }
        other => panic!("unexpected {:?}", other),
    }

    match processor.process("Google rust lifetimes") {
        CommandResult::Action(action) => {
            assert_eq!(action.kind, ActionKind::GoogleSearch);
            assert_eq!(action.command_id, "search");
            assert_eq!(action.params["query"], "rust lifetimes");
            assert_eq!(action.raw_text, "Google rust lifetimes");
        }
        other => panic!("unexpected {:?}", other),
    }

    // unknown action type is a failure, not a crash
    assert_eq!(message(&processor.process("launch rockets")), NOT_RECOGNIZED);
}

#[test]
fn test_wake_phrase_not_used_as_label() {
    let (processor, timers) = processor(&Config::default());

    let result = processor.process("джарвис поставь 5 минут таймер");
    assert_eq!(message(&result), "Timer timer started");
    let entry = &timers.list()[0];
    assert_eq!(entry.name, None);
    assert_eq!(entry.duration_secs, 300);

    assert_eq!(message(&processor.process("Jarvis, 6*7")), "Answer: 42");
    assert_eq!(message(&processor.process("Jarvis, what is 2+2?")), "Answer: 4");
}

#[test]
fn test_oversize_timer_request() {
    let (processor, timers) = processor(&Config::default());
    let result = processor.process("timer for 99999999999999999999 hours");
    assert_eq!(message(&result), "Couldn't understand the time");
    assert!(timers.is_empty());

    assert_eq!(
        message(&processor.process("99999999999999999999 * 99999999999999999999")),
        "Answer: 10000000000000000303786028427003666890752"
    );
}
