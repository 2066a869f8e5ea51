use crate::audio::buffer::FrameAccumulator;
use crate::audio::capture::{MicrophoneSource, FRAME_QUEUE};
use crate::audio::resampler::AudioResampler;
use crate::{ReadalongError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Default-device microphone delivering fixed frames at the wire rate
///
/// The cpal stream lives on its own thread for as long as the microphone is
/// open; closing it drops the stream and deregisters the callback.
pub struct AudioInput {
    frame_size: usize,
    wire_rate: u32,
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl AudioInput {
    pub fn new(frame_size: usize, wire_rate: u32) -> Self {
        Self {
            frame_size,
            wire_rate,
            worker: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

fn build_stream(
    frame_size: usize,
    wire_rate: u32,
    gate: Arc<AtomicBool>,
    frame_tx: mpsc::Sender<Vec<f32>>,
) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| ReadalongError::AudioDeviceError("No input device available".into()))?;

    info!(
        "Using input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let config: StreamConfig = device
        .default_input_config()
        .map_err(|e| ReadalongError::AudioDeviceError(format!("Failed to get input config: {}", e)))?
        .into();

    let channels = config.channels as usize;
    let mut resampler = AudioResampler::new(config.sample_rate.0, wire_rate, 1024)?;
    let mut accumulator = FrameAccumulator::new(frame_size);

    let err_fn = |err| {
        error!("Audio input stream error: {}", err);
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !gate.load(Ordering::SeqCst) {
                    return;
                }

                let mono: Vec<f32> = if channels == 1 {
                    data.to_vec()
                } else {
                    data.chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                        .collect()
                };

                let resampled = match resampler.process(&mono) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("{}", e);
                        return;
                    }
                };

                for frame in accumulator.push(&resampled) {
                    if let Err(e) = frame_tx.try_send(frame) {
                        debug!("Dropping microphone frame: {}", e);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            BuildStreamError::DeviceNotAvailable => {
                ReadalongError::PermissionDenied("Microphone is not available".into())
            }
            other => {
                ReadalongError::AudioDeviceError(format!("Failed to build input stream: {}", other))
            }
        })?;

    stream
        .play()
        .map_err(|e| ReadalongError::AudioDeviceError(format!("Failed to start input stream: {}", e)))?;

    Ok(stream)
}

impl MicrophoneSource for AudioInput {
    fn open(&mut self, gate: Arc<AtomicBool>) -> Result<mpsc::Receiver<Vec<f32>>> {
        if self.worker.is_some() {
            return Err(ReadalongError::AudioDeviceError("Microphone already open".into()));
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let frame_size = self.frame_size;
        let wire_rate = self.wire_rate;

        let handle = thread::spawn(move || {
            let stream = match build_stream(frame_size, wire_rate, gate, frame_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            // Returns on close or when the owner is dropped
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some((stop_tx, handle));
                info!("Started audio capture");
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(ReadalongError::AudioDeviceError(
                "Capture thread exited unexpectedly".into(),
            )),
        }
    }

    fn close(&mut self) {
        if let Some((stop_tx, handle)) = self.worker.take() {
            let _ = stop_tx.send(());
            let _ = handle.join();
            info!("Stopped audio capture");
        }
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.close();
    }
}
