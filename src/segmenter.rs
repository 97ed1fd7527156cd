//! Frame-by-frame speech segmentation.
//!
//! Frames pass through an onset/speaking state machine. While speech is
//! ongoing a preview of the buffered audio is produced every half second;
//! enough trailing silence (or the length cap) closes the segment.

use std::collections::VecDeque;

use crate::vad::VadEngine;

pub const TARGET_RATE: usize = 16000;

// 30ms frames at 16kHz = 480 samples
pub const VAD_FRAME_SAMPLES: usize = 480;
const VAD_MIN_SPEECH_SAMPLES: usize = TARGET_RATE / 4;
const VAD_MAX_SPEECH_SECONDS: usize = 10;
const VAD_SILENCE_FRAMES_TO_END: usize = 15;
const VAD_PREFILL_FRAMES: usize = 10;
const VAD_ONSET_FRAMES: usize = 3;
const PREVIEW_SAMPLES: usize = TARGET_RATE / 2;

#[derive(Debug, Clone, Copy, PartialEq)]
enum VadState {
    Idle,
    Onset(usize),
    Speaking(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Audio so far of a still-open utterance
    Preview(Vec<f32>),
    /// A completed utterance
    Final(Vec<f32>),
}

pub struct SpeechSegmenter {
    vad: VadEngine,
    state: VadState,
    speech_buf: Vec<f32>,
    prefill_buf: VecDeque<Vec<f32>>,
    since_preview: usize,
}

impl SpeechSegmenter {
    pub fn new(vad: VadEngine) -> Self {
        Self {
            vad,
            state: VadState::Idle,
            speech_buf: Vec::with_capacity(TARGET_RATE * VAD_MAX_SPEECH_SECONDS),
            prefill_buf: VecDeque::with_capacity(VAD_PREFILL_FRAMES + 1),
            since_preview: 0,
        }
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self.state, VadState::Speaking(_))
    }

    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.speech_buf.clear();
        self.prefill_buf.clear();
        self.since_preview = 0;
        self.vad.reset();
    }

    pub fn push(&mut self, frame: &[f32]) -> Option<Segment> {
        let is_speech = self.vad.is_speech(frame, self.is_speaking());

        match &mut self.state {
            VadState::Idle => {
                if is_speech {
                    self.state = VadState::Onset(1);
                }
                self.prefill(frame);
            }
            VadState::Onset(count) => {
                if is_speech {
                    *count += 1;
                    let started = *count >= VAD_ONSET_FRAMES;
                    self.prefill(frame);
                    if started {
                        for pf in self.prefill_buf.drain(..) {
                            self.speech_buf.extend_from_slice(&pf);
                        }
                        self.since_preview = 0;
                        self.state = VadState::Speaking(0);
                    }
                } else {
                    self.state = VadState::Idle;
                    self.prefill(frame);
                }
            }
            VadState::Speaking(silence_count) => {
                if is_speech {
                    *silence_count = 0;
                } else {
                    *silence_count += 1;
                }
                self.speech_buf.extend_from_slice(frame);
                self.since_preview += frame.len();
            }
        }

        let VadState::Speaking(silence) = self.state else {
            return None;
        };

        if silence >= VAD_SILENCE_FRAMES_TO_END
            || self.speech_buf.len() >= TARGET_RATE * VAD_MAX_SPEECH_SECONDS
        {
            self.state = VadState::Idle;
            self.since_preview = 0;
            if self.speech_buf.len() >= VAD_MIN_SPEECH_SAMPLES {
                return Some(Segment::Final(std::mem::take(&mut self.speech_buf)));
            }
            self.speech_buf.clear();
            return None;
        }

        if self.since_preview >= PREVIEW_SAMPLES {
            self.since_preview = 0;
            return Some(Segment::Preview(self.speech_buf.clone()));
        }
        None
    }

    fn prefill(&mut self, frame: &[f32]) {
        self.prefill_buf.push_back(frame.to_vec());
        if self.prefill_buf.len() > VAD_PREFILL_FRAMES {
            self.prefill_buf.pop_front();
        }
    }
}
