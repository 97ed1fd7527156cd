use anyhow::Result;
use clap::{Parser, Subcommand};
use flume::Receiver;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use voicefuzzy::command::{CommandProcessor, CommandResult, process_slash_command};
use voicefuzzy::config::{Config, DEFAULT_CONFIG_PATH};
use voicefuzzy::duration::{format_clock, parse_timer_request};
use voicefuzzy::math::{MathEvaluator, format_value};
use voicefuzzy::session::SessionEvent;
use voicefuzzy::state::{ListenerSettings, ListenerStatus, SharedSettings};
use voicefuzzy::timers::{TimerEvent, TimerRegistry};
use voicefuzzy::ui;

#[derive(Parser)]
#[command(name = "voicefuzzy", version, about = "Offline voice commands, timers and calculator")]
struct Cli {
    /// Path to config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen on the microphone for the wake phrase and commands
    Listen {
        /// Input device index (see --list-devices)
        #[arg(long)]
        device: Option<usize>,
        /// Keep capturing commands without a wake phrase
        #[arg(long)]
        direct: bool,
        /// Print input devices and exit
        #[arg(long)]
        list_devices: bool,
    },
    /// Type commands instead of speaking them (default)
    Repl,
    /// Parse a timer request and print the duration
    Timer { text: Vec<String> },
    /// Evaluate an arithmetic expression
    Calc { text: Vec<String> },
    /// Show which command a phrase resolves to
    Match { text: Vec<String> },
}

struct App {
    processor: CommandProcessor,
    timers: Arc<TimerRegistry>,
    settings: SharedSettings,
}

#[hotpath::main]
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config);

    match cli.command.unwrap_or(Command::Repl) {
        Command::Timer { text } => {
            let parsed = parse_timer_request(&text.join(" "));
            match parsed.seconds {
                Some(secs) => println!(
                    "{} ({}s) label: {}",
                    format_clock(secs),
                    secs,
                    parsed.label.as_deref().unwrap_or("-")
                ),
                None => println!("no duration found"),
            }
            Ok(())
        }
        Command::Calc { text } => {
            let evaluator = MathEvaluator::new(config.math.max_length, config.math.max_depth);
            match evaluator.evaluate(&text.join(" ")) {
                Ok(value) => println!("{}", format_value(value)),
                Err(e) => println!("error: {}", e),
            }
            Ok(())
        }
        Command::Match { text } => {
            let app = App::new(&config);
            match app.processor.matcher().resolve(&text.join(" ")) {
                Some(m) => println!("{} {:?}", m.command_id, m.params),
                None => println!("unresolved"),
            }
            Ok(())
        }
        Command::Repl => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run_repl(config)),
        Command::Listen {
            device,
            direct,
            list_devices,
        } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run_listen(config, device, direct, list_devices)),
    }
}

impl App {
    fn new(config: &Config) -> Self {
        let timers = Arc::new(TimerRegistry::new());
        Self {
            processor: CommandProcessor::new(config, Arc::clone(&timers)),
            timers,
            settings: ListenerSettings::new(&config.listening),
        }
    }

    /// Run a command through dispatch and show the outcome. Returns false on shutdown.
    fn execute(&self, text: &str) -> bool {
        self.settings.set_status(ListenerStatus::Executing);
        let result = self.processor.process(text);
        self.settings.set_status(ListenerStatus::Listening);
        if result == CommandResult::Shutdown {
            return false;
        }
        ui::show_result(&result);
        true
    }

    /// Handle a typed line. Returns false on shutdown.
    fn handle_line(&self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }
        if let Some(result) = process_slash_command(line, &self.settings, &self.timers) {
            if result == CommandResult::Shutdown {
                return false;
            }
            ui::show_result(&result);
            return true;
        }
        self.execute(line)
    }

    fn handle_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Status(status) => ui::show_status(status),
            SessionEvent::WakeDetected => ui::show_wake(),
            SessionEvent::Partial(text) => ui::show_preview(&text),
            SessionEvent::CommandReady(text) => {
                if text.is_empty() {
                    ui::clear_line();
                    return;
                }
                ui::show_final(&text);
                ui::show_status(ListenerStatus::Executing);
                self.execute(&text);
            }
            SessionEvent::Error(message) => ui::show_error(&message),
        }
    }
}

/// Read stdin lines on a thread. With `stop_on_eof`, end of input clears `running`.
fn spawn_input_reader(running: Arc<AtomicBool>, stop_on_eof: bool) -> Receiver<String> {
    let (input_tx, input_rx) = flume::unbounded::<String>();
    thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if input_tx.send(line.trim().to_string()).is_err() {
                return;
            }
        }
        if stop_on_eof {
            running.store(false, Ordering::SeqCst);
        }
    });
    input_rx
}

/// Main loop: session events, timer events and typed input until `running` clears
async fn event_loop(
    app: &App,
    session_events: Receiver<SessionEvent>,
    input: Receiver<String>,
    running: Arc<AtomicBool>,
) {
    let timer_events = app.timers.subscribe();

    // Timer tick driver
    let tick_timers = Arc::clone(&app.timers);
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            tick_timers.tick();
        }
    });

    let mut shutdown_poll = tokio::time::interval(Duration::from_millis(200));

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            biased;

            Ok(event) = session_events.recv_async() => app.handle_session_event(event),

            Ok(event) = timer_events.recv_async() => match event {
                TimerEvent::Finished(entry) => ui::timer_finished(&entry),
                TimerEvent::Updated(entries) => ui::show_timers(&entries),
            },

            Ok(line) = input.recv_async() => {
                if !app.handle_line(&line) {
                    running.store(false, Ordering::SeqCst);
                }
            }

            _ = shutdown_poll.tick() => {}
        }
    }

    ticker.abort();
    app.timers.shutdown();
    ui::clear_line();
}

async fn run_repl(config: Config) -> Result<()> {
    let app = App::new(&config);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    println!("Type a command, /help for help, /quit to exit.");
    let input = spawn_input_reader(running.clone(), true);
    // no microphone session in this mode
    let (_session_tx, session_rx) = flume::unbounded::<SessionEvent>();

    app.settings.set_status(ListenerStatus::Listening);
    event_loop(&app, session_rx, input, running).await;
    Ok(())
}

#[cfg(not(all(feature = "mic", feature = "parakeet")))]
async fn run_listen(
    _config: Config,
    _device: Option<usize>,
    _direct: bool,
    _list_devices: bool,
) -> Result<()> {
    anyhow::bail!("listen requires building with --features mic,parakeet")
}

#[cfg(all(feature = "mic", feature = "parakeet"))]
async fn run_listen(
    config: Config,
    device: Option<usize>,
    direct: bool,
    list_devices: bool,
) -> Result<()> {
    use anyhow::Context;
    use voicefuzzy::capture;
    use voicefuzzy::segmenter::{SpeechSegmenter, TARGET_RATE};
    use voicefuzzy::session::{ListeningSession, run_session};
    use voicefuzzy::transcriber::{Parakeet, SegmentedTranscriber};
    use voicefuzzy::vad::VadEngine;
    use voicefuzzy::wake::WakePhrases;

    if list_devices {
        for (index, name) in capture::list_input_devices().context("listing input devices")? {
            println!("{:>3}  {}", index, name);
        }
        return Ok(());
    }

    let app = App::new(&config);
    if device.is_some() {
        app.settings.set_device_index(device);
    }
    if direct {
        app.settings.set_direct_mode(true);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    // Channel: capture -> session (frames in arrival order)
    let (frames_tx, frames_rx) = flume::bounded::<Vec<f32>>(256);
    // Channel: session/capture -> main loop
    let (events_tx, events_rx) = flume::unbounded::<SessionEvent>();
    let capture_running = Arc::new(AtomicBool::new(true));

    // Capture thread
    let cap_events = events_tx.clone();
    let cap_running = capture_running.clone();
    let device_index = app.settings.device_index();
    let capture_handle = thread::spawn(move || {
        if let Err(e) = capture::capture_mic(frames_tx, device_index, cap_running.clone()) {
            log::error!("Capture failed: {}", e);
            let _ = cap_events.send(SessionEvent::Error(e.to_string()));
            cap_running.store(false, Ordering::SeqCst);
        }
    });

    // Session thread: segmentation, transcription and state machine
    let settings = Arc::clone(&app.settings);
    let wake = WakePhrases::new(&config.wake_word);
    let model_path = config.transcriber.model_path.clone();
    let vad_path = config.transcriber.vad_model_path.clone();
    let session_running = capture_running.clone();
    let session_handle = thread::spawn(move || {
        let engine = match Parakeet::new(&model_path) {
            Ok(engine) => engine,
            Err(e) => {
                log::error!("Transcriber failed: {}", e);
                let _ = events_tx.send(SessionEvent::Error(e.to_string()));
                session_running.store(false, Ordering::SeqCst);
                return;
            }
        };
        let vad = if std::path::Path::new(&vad_path).exists() {
            match VadEngine::silero(&vad_path, TARGET_RATE) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("Silero VAD failed ({}), using energy-based", e);
                    VadEngine::energy()
                }
            }
        } else {
            log::info!("VAD model not found, using energy-based");
            VadEngine::energy()
        };
        log::info!("VAD: {}", vad.name());
        let transcriber = SegmentedTranscriber::new(engine, SpeechSegmenter::new(vad));
        let session = ListeningSession::new(transcriber, wake, settings, events_tx);
        run_session(session, frames_rx, session_running);
    });

    let input = spawn_input_reader(running.clone(), false);
    event_loop(&app, events_rx, input, running).await;

    capture_running.store(false, Ordering::SeqCst);
    let _ = capture_handle.join();
    let _ = session_handle.join();
    Ok(())
}
