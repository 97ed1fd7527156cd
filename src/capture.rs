use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use flume::{Sender, TrySendError};
use rubato::{FftFixedIn, Resampler};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::segmenter::{TARGET_RATE, VAD_FRAME_SAMPLES};

const RESAMPLE_CHUNK: usize = 1024;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,
    #[error("no input device with index {0}")]
    DeviceIndex(usize),
    #[error("audio device error: {0}")]
    Device(String),
}

struct FrameResampler {
    resampler: Option<FftFixedIn<f32>>,
    in_buf: Vec<f32>,
    pending: Vec<f32>,
    frame_samples: usize,
}

impl FrameResampler {
    fn new(in_hz: usize, out_hz: usize, frame_samples: usize) -> Result<Self, CaptureError> {
        let resampler = if in_hz != out_hz {
            Some(
                FftFixedIn::<f32>::new(in_hz, out_hz, RESAMPLE_CHUNK, 1, 1)
                    .map_err(|e| CaptureError::Device(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            resampler,
            in_buf: Vec::with_capacity(RESAMPLE_CHUNK),
            pending: Vec::with_capacity(frame_samples),
            frame_samples,
        })
    }

    fn push(&mut self, src: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        let Some(resampler) = self.resampler.as_mut() else {
            Self::emit_frames(&mut self.pending, self.frame_samples, src, &mut emit);
            return;
        };

        self.in_buf.extend_from_slice(src);
        while self.in_buf.len() >= RESAMPLE_CHUNK {
            let chunk: Vec<f32> = self.in_buf.drain(..RESAMPLE_CHUNK).collect();
            if let Ok(out) = resampler.process(&[&chunk], None) {
                Self::emit_frames(&mut self.pending, self.frame_samples, &out[0], &mut emit);
            }
        }
    }

    fn emit_frames(
        pending: &mut Vec<f32>,
        frame_samples: usize,
        data: &[f32],
        emit: &mut impl FnMut(Vec<f32>),
    ) {
        pending.extend_from_slice(data);
        while pending.len() >= frame_samples {
            emit(pending.drain(..frame_samples).collect());
        }
    }
}

/// Input devices of the default host, with the index `capture_mic` accepts
pub fn list_input_devices() -> Result<Vec<(usize, String)>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    Ok(devices
        .enumerate()
        .map(|(i, d)| (i, d.name().unwrap_or_else(|_| "Unknown".to_string())))
        .collect())
}

fn select_device(index: Option<usize>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match index {
        None => host.default_input_device().ok_or(CaptureError::NoDevice),
        Some(i) => host
            .input_devices()
            .map_err(|e| CaptureError::Device(e.to_string()))?
            .nth(i)
            .ok_or(CaptureError::DeviceIndex(i)),
    }
}

/// Capture mono 16kHz frames of `VAD_FRAME_SAMPLES` into `tx` until `running`
/// clears. A stream error ends capture with that error.
pub fn capture_mic(
    tx: Sender<Vec<f32>>,
    device_index: Option<usize>,
    running: Arc<AtomicBool>,
) -> Result<(), CaptureError> {
    let device = select_device(device_index)?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    let sample_rate = u32::from(supported.sample_rate()) as usize;
    let channels = supported.channels() as usize;

    log::info!(
        "Mic: {} {}Hz {}ch -> {}Hz mono",
        device.name().unwrap_or_else(|_| "Unknown".to_string()),
        sample_rate,
        channels,
        TARGET_RATE
    );

    let mut resampler = FrameResampler::new(sample_rate, TARGET_RATE, VAD_FRAME_SAMPLES)?;
    let (err_tx, err_rx) = flume::bounded::<String>(1);

    let stream = device
        .build_input_stream(
            &supported.config(),
            move |data: &[f32], _| {
                let mono: Vec<f32> = if channels == 1 {
                    data.to_vec()
                } else {
                    data.chunks(channels)
                        .map(|c| c.iter().sum::<f32>() / channels as f32)
                        .collect()
                };
                resampler.push(&mono, |frame| {
                    if let Err(TrySendError::Full(_)) = tx.try_send(frame) {
                        log::debug!("Frame queue full, dropping frame");
                    }
                });
            },
            move |e| {
                let _ = err_tx.try_send(e.to_string());
            },
            None,
        )
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    stream
        .play()
        .map_err(|e| CaptureError::Device(e.to_string()))?;

    while running.load(Ordering::SeqCst) {
        match err_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(e) => {
                log::error!("Mic error: {}", e);
                return Err(CaptureError::Device(e));
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stream);
    log::debug!("Mic capture stopped");
    Ok(())
}
