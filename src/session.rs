//! Wake-phrase listening session.
//!
//! Two modes: `Idle` waits for a wake phrase in any hypothesis, `CommandCapture`
//! accumulates the command until its deadline passes or speech is followed by
//! enough silence. All time-dependent calls take `now` explicitly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};

use crate::normalize::normalize_text;
use crate::state::{ListenerStatus, SharedSettings};
use crate::transcriber::{Hypothesis, Transcriber, TranscriberError};
use crate::vad::rms;
use crate::wake::WakePhrases;

/// Bounded wait of the processing loop; deadlines are checked at least this often
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningMode {
    Idle,
    CommandCapture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Status(ListenerStatus),
    WakeDetected,
    /// Live transcript while capturing a command
    Partial(String),
    /// Finalized command text, empty when nothing was captured
    CommandReady(String),
    Error(String),
}

pub struct ListeningSession<T> {
    transcriber: T,
    wake: WakePhrases,
    settings: SharedSettings,
    events: Sender<SessionEvent>,
    active: bool,
    mode: ListeningMode,
    deadline: Option<Instant>,
    heard_speech: bool,
    last_loud: Option<Instant>,
    parts: Vec<String>,
    last_partial: String,
}

impl<T: Transcriber> ListeningSession<T> {
    pub fn new(
        transcriber: T,
        wake: WakePhrases,
        settings: SharedSettings,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            transcriber,
            wake,
            settings,
            events,
            active: false,
            mode: ListeningMode::Idle,
            deadline: None,
            heard_speech: false,
            last_loud: None,
            parts: Vec::new(),
            last_partial: String::new(),
        }
    }

    pub fn mode(&self) -> ListeningMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn start(&mut self, now: Instant) {
        self.active = true;
        self.transcriber.reset();
        if self.settings.direct_mode() {
            self.arm_capture(now);
        } else {
            self.mode = ListeningMode::Idle;
        }
        log::info!("Listening session started ({:?})", self.mode);
        self.set_status(ListenerStatus::Listening);
    }

    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.mode = ListeningMode::Idle;
        self.clear_capture();
        self.transcriber.reset();
        log::info!("Listening session stopped");
        self.set_status(ListenerStatus::Idle);
    }

    /// Switch sticky direct mode; enabling it while idle opens a capture window
    pub fn set_direct_mode(&mut self, enabled: bool, now: Instant) {
        self.settings.set_direct_mode(enabled);
        if enabled && self.active && self.mode == ListeningMode::Idle {
            self.arm_capture(now);
        }
    }

    /// Process one audio frame, then evaluate deadlines
    pub fn process_frame(&mut self, frame: &[f32], now: Instant) -> Result<(), TranscriberError> {
        if !self.active {
            return Ok(());
        }
        self.follow_direct_mode(now);

        if self.mode == ListeningMode::CommandCapture && rms(frame) > self.settings.rms_threshold() {
            if !self.heard_speech {
                self.heard_speech = true;
                self.deadline = Some(now + self.settings.command_timeout());
            }
            self.last_loud = Some(now);
        }

        if let Some(hypothesis) = self.transcriber.feed(frame)? {
            self.handle_hypothesis(hypothesis, now);
        }

        self.check_timeout(now);
        Ok(())
    }

    /// Finalize the capture window if it is due. Returns whether it finalized.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        self.follow_direct_mode(now);
        if self.mode != ListeningMode::CommandCapture {
            return false;
        }

        let silence_elapsed = self.heard_speech
            && self
                .last_loud
                .is_some_and(|t| now.duration_since(t) > self.settings.silence_timeout());
        // a direct-mode window waits indefinitely for the first speech
        let patient = self.settings.direct_mode() && !self.heard_speech;
        let deadline_elapsed = !patient && self.deadline.is_some_and(|d| now >= d);

        if silence_elapsed || deadline_elapsed {
            self.finalize(now);
            return true;
        }
        false
    }

    /// Direct mode may be switched on from another thread; open a window once seen
    fn follow_direct_mode(&mut self, now: Instant) {
        if self.active && self.mode == ListeningMode::Idle && self.settings.direct_mode() {
            log::debug!("Direct mode enabled, capturing without wake phrase");
            self.arm_capture(now);
        }
    }

    fn handle_hypothesis(&mut self, hypothesis: Hypothesis, now: Instant) {
        let text = normalize_text(hypothesis.text());
        if self.settings.debug_transcripts() {
            log::debug!(
                "[{:?}] {} {:?}",
                self.mode,
                if hypothesis.is_final() { "final" } else { "partial" },
                text
            );
        }
        if text.is_empty() {
            return;
        }

        match self.mode {
            ListeningMode::Idle => {
                let Some(rest) = self.wake.detect(&text).map(str::to_string) else {
                    return;
                };
                log::debug!("Wake phrase detected in {:?}", text);
                self.transcriber.reset();
                self.arm_capture(now);
                self.emit(SessionEvent::WakeDetected);

                if !rest.is_empty() {
                    if hypothesis.is_final() {
                        self.parts.push(rest.clone());
                    } else {
                        self.last_partial = rest.clone();
                    }
                    self.emit(SessionEvent::Partial(rest));
                }
            }
            ListeningMode::CommandCapture => {
                if hypothesis.is_final() {
                    self.parts.push(text.clone());
                } else {
                    self.last_partial = text.clone();
                }
                self.emit(SessionEvent::Partial(text));
            }
        }
    }

    fn finalize(&mut self, now: Instant) {
        let command = if self.parts.is_empty() {
            std::mem::take(&mut self.last_partial)
        } else {
            self.parts.join(" ")
        };
        log::info!("Command captured: {:?}", command);
        self.emit(SessionEvent::CommandReady(command));
        self.clear_capture();

        if self.settings.direct_mode() {
            self.transcriber.reset();
            self.arm_capture(now);
        } else {
            self.mode = ListeningMode::Idle;
        }
        self.set_status(ListenerStatus::Listening);
    }

    fn arm_capture(&mut self, now: Instant) {
        self.clear_capture();
        self.mode = ListeningMode::CommandCapture;
        self.deadline = Some(now + self.settings.command_timeout());
    }

    fn clear_capture(&mut self) {
        self.deadline = None;
        self.heard_speech = false;
        self.last_loud = None;
        self.parts.clear();
        self.last_partial.clear();
    }

    fn set_status(&self, status: ListenerStatus) {
        self.settings.set_status(status);
        self.emit(SessionEvent::Status(status));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Drain frames into the session until `running` clears or the queue closes.
///
/// An oracle error is reported once as `SessionEvent::Error`, stops the
/// session and clears `running` so capture shuts down too.
pub fn run_session<T: Transcriber>(
    mut session: ListeningSession<T>,
    frames: Receiver<Vec<f32>>,
    running: Arc<AtomicBool>,
) {
    session.start(Instant::now());

    while running.load(Ordering::SeqCst) {
        match frames.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => {
                if let Err(e) = session.process_frame(&frame, Instant::now()) {
                    log::error!("Transcription failed: {}", e);
                    session.emit(SessionEvent::Error(e.to_string()));
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                session.check_timeout(Instant::now());
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    session.stop();
}
