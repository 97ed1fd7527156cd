#[cfg(feature = "parakeet")]
use vad_rs::Vad;

#[cfg(feature = "parakeet")]
const VAD_THRESHOLD: f32 = 0.3;
#[cfg(feature = "parakeet")]
const VAD_THRESHOLD_END: f32 = 0.25;
const ENERGY_THRESHOLD: f32 = 0.01;
const ENERGY_THRESHOLD_END: f32 = 0.006;

/// Root-mean-square loudness of a frame of f32 samples
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Speech/non-speech classifier used to segment audio for the transcriber
pub enum VadEngine {
    #[cfg(feature = "parakeet")]
    Silero(Vad),
    Energy,
}

impl VadEngine {
    #[cfg(feature = "parakeet")]
    pub fn silero(model_path: &str, sample_rate: usize) -> Result<Self, String> {
        let vad = Vad::new(model_path, sample_rate).map_err(|e| e.to_string())?;
        Ok(VadEngine::Silero(vad))
    }

    pub fn energy() -> Self {
        VadEngine::Energy
    }

    /// Hysteresis: a lower threshold applies while speech is ongoing
    pub fn is_speech(&mut self, frame: &[f32], currently_speaking: bool) -> bool {
        match self {
            #[cfg(feature = "parakeet")]
            VadEngine::Silero(vad) => {
                let threshold = if currently_speaking {
                    VAD_THRESHOLD_END
                } else {
                    VAD_THRESHOLD
                };
                vad.compute(frame)
                    .map(|r| r.prob > threshold)
                    .unwrap_or(false)
            }
            VadEngine::Energy => {
                let threshold = if currently_speaking {
                    ENERGY_THRESHOLD_END
                } else {
                    ENERGY_THRESHOLD
                };
                rms(frame) > threshold
            }
        }
    }

    pub fn reset(&mut self) {
        #[cfg(feature = "parakeet")]
        if let VadEngine::Silero(vad) = self {
            vad.reset();
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "parakeet")]
            VadEngine::Silero(_) => "Silero",
            VadEngine::Energy => "Energy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0; 480]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_energy_hysteresis() {
        let mut vad = VadEngine::energy();
        let frame = vec![0.008f32; 480];
        assert!(!vad.is_speech(&frame, false));
        assert!(vad.is_speech(&frame, true));
        assert_eq!(vad.name(), "Energy");
    }
}
