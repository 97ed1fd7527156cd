use thiserror::Error;

use crate::segmenter::{Segment, SpeechSegmenter};

/// Output of the transcription oracle for one fed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hypothesis {
    /// Provisional text, may still change
    Partial(String),
    /// Stable text for a completed utterance
    Final(String),
}

impl Hypothesis {
    pub fn text(&self) -> &str {
        match self {
            Hypothesis::Partial(t) | Hypothesis::Final(t) => t,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Hypothesis::Final(_))
    }
}

#[derive(Debug, Error)]
pub enum TranscriberError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("transcription failed: {0}")]
    Inference(String),
}

/// Streaming transcription oracle
pub trait Transcriber: Send {
    /// Accept one audio frame; `None` when there is nothing new to report
    fn feed(&mut self, frame: &[f32]) -> Result<Option<Hypothesis>, TranscriberError>;

    /// Drop all buffered audio
    fn reset(&mut self);
}

/// Batch speech-to-text over a complete sample buffer
pub trait SpeechEngine: Send {
    fn transcribe(&mut self, samples: &[f32]) -> Result<String, TranscriberError>;
}

/// Streaming oracle built from a batch engine and a VAD segmenter
pub struct SegmentedTranscriber<E> {
    engine: E,
    segmenter: SpeechSegmenter,
}

impl<E: SpeechEngine> SegmentedTranscriber<E> {
    pub fn new(engine: E, segmenter: SpeechSegmenter) -> Self {
        Self { engine, segmenter }
    }
}

impl<E: SpeechEngine> Transcriber for SegmentedTranscriber<E> {
    fn feed(&mut self, frame: &[f32]) -> Result<Option<Hypothesis>, TranscriberError> {
        let hypothesis = match self.segmenter.push(frame) {
            None => return Ok(None),
            Some(Segment::Preview(samples)) => Hypothesis::Partial(self.engine.transcribe(&samples)?),
            Some(Segment::Final(samples)) => Hypothesis::Final(self.engine.transcribe(&samples)?),
        };
        if hypothesis.text().is_empty() {
            return Ok(None);
        }
        Ok(Some(hypothesis))
    }

    fn reset(&mut self) {
        self.segmenter.reset();
    }
}

#[cfg(feature = "parakeet")]
mod parakeet {
    use std::path::Path;

    use transcribe_rs::{
        TranscriptionEngine,
        engines::parakeet::{ParakeetEngine, ParakeetModelParams},
    };

    use super::{SpeechEngine, TranscriberError};

    pub struct Parakeet {
        engine: ParakeetEngine,
    }

    impl Parakeet {
        pub fn new(model_path: impl AsRef<Path>) -> Result<Self, TranscriberError> {
            let mut engine = ParakeetEngine::new();
            log::info!("Loading model from {}...", model_path.as_ref().display());
            engine
                .load_model_with_params(model_path.as_ref(), ParakeetModelParams::int8())
                .map_err(|e| TranscriberError::Load(e.to_string()))?;
            log::info!("Model loaded.");
            Ok(Self { engine })
        }

        #[hotpath::measure]
        fn run(&mut self, samples: &[f32]) -> Result<String, TranscriberError> {
            let result = self
                .engine
                .transcribe_samples(samples.to_vec(), None)
                .map_err(|e| TranscriberError::Inference(e.to_string()))?;
            Ok(result.text.trim().to_string())
        }
    }

    impl SpeechEngine for Parakeet {
        fn transcribe(&mut self, samples: &[f32]) -> Result<String, TranscriberError> {
            self.run(samples)
        }
    }
}

#[cfg(feature = "parakeet")]
pub use parakeet::Parakeet;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::VAD_FRAME_SAMPLES;
    use crate::vad::VadEngine;

    /// Reports how many samples it was given
    struct CountingEngine;

    impl SpeechEngine for CountingEngine {
        fn transcribe(&mut self, samples: &[f32]) -> Result<String, TranscriberError> {
            Ok(format!("{} samples", samples.len()))
        }
    }

    struct FailingEngine;

    impl SpeechEngine for FailingEngine {
        fn transcribe(&mut self, _samples: &[f32]) -> Result<String, TranscriberError> {
            Err(TranscriberError::Inference("boom".into()))
        }
    }

    fn feed_speech<T: Transcriber>(t: &mut T, frames: usize) -> Vec<Hypothesis> {
        let loud = [0.2f32; VAD_FRAME_SAMPLES];
        let quiet = [0.0f32; VAD_FRAME_SAMPLES];
        let mut out = Vec::new();
        for _ in 0..frames {
            out.extend(t.feed(&loud).unwrap());
        }
        for _ in 0..30 {
            out.extend(t.feed(&quiet).unwrap());
        }
        out
    }

    #[test]
    fn test_partial_then_final() {
        let segmenter = SpeechSegmenter::new(VadEngine::energy());
        let mut t = SegmentedTranscriber::new(CountingEngine, segmenter);
        let hyps = feed_speech(&mut t, 40);
        assert!(matches!(hyps.first(), Some(Hypothesis::Partial(_))));
        let finals: Vec<_> = hyps.iter().filter(|h| h.is_final()).collect();
        assert_eq!(finals.len(), 1);
    }

    #[test]
    fn test_engine_error_propagates() {
        let segmenter = SpeechSegmenter::new(VadEngine::energy());
        let mut t = SegmentedTranscriber::new(FailingEngine, segmenter);
        let loud = [0.2f32; VAD_FRAME_SAMPLES];
        let err = (0..40).find_map(|_| t.feed(&loud).err());
        assert!(matches!(err, Some(TranscriberError::Inference(_))));
    }
}
