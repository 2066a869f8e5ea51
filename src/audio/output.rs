use crate::audio::envelope::GainEnvelope;
use crate::audio::resampler::resample_to_span;
use crate::audio::scheduler::{ChunkHandle, OutputSink};
use crate::{ReadalongError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct Voice {
    handle: ChunkHandle,
    samples: Vec<f32>,
    start_frame: u64,
}

#[derive(Default)]
struct MixerState {
    voices: Vec<Voice>,
    envelope: GainEnvelope,
    frames_played: u64,
}

/// Default-device output mixing scheduled chunks at their start times
///
/// The output timeline is the number of frames the device has consumed, so
/// scheduled start times and envelope ramps share the device's clock.
pub struct AudioOutput {
    state: Arc<Mutex<MixerState>>,
    device_rate: u32,
    worker: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl AudioOutput {
    /// Open the default output device and start the mixer
    pub fn open() -> Result<Self> {
        let state = Arc::new(Mutex::new(MixerState::default()));
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let mixer_state = Arc::clone(&state);

        let handle = thread::spawn(move || {
            let (stream, rate) = match build_stream(mixer_state) {
                Ok(opened) => opened,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(rate));
            let _ = stop_rx.recv();
            drop(stream);
        });

        let device_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                return Err(ReadalongError::AudioDeviceError(
                    "Output thread exited unexpectedly".into(),
                ))
            }
        };
        info!("Started audio playback at {} Hz", device_rate);

        Ok(Self {
            state,
            device_rate,
            worker: Mutex::new(Some((stop_tx, handle))),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.device_rate
    }

    /// Stop the device stream
    pub fn close(&self) {
        if let Some((stop_tx, handle)) = self.worker.lock().take() {
            let _ = stop_tx.send(());
            let _ = handle.join();
            info!("Stopped audio playback");
        }
    }
}

fn build_stream(state: Arc<Mutex<MixerState>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| ReadalongError::AudioDeviceError("No output device available".into()))?;

    info!(
        "Using output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let config: StreamConfig = device
        .default_output_config()
        .map_err(|e| ReadalongError::AudioDeviceError(format!("Failed to get output config: {}", e)))?
        .into();
    let channels = config.channels as usize;
    let rate = config.sample_rate.0;

    let err_fn = |err| {
        error!("Audio output stream error: {}", err);
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut state = state.lock();
                let frames = data.len() / channels;
                let base = state.frames_played;

                for i in 0..frames {
                    let t = base + i as u64;
                    let mut mix = 0.0f32;
                    for voice in &state.voices {
                        if t >= voice.start_frame {
                            if let Some(s) = voice.samples.get((t - voice.start_frame) as usize) {
                                mix += s;
                            }
                        }
                    }
                    let gain = state
                        .envelope
                        .value_at(Duration::from_secs_f64(t as f64 / rate as f64));
                    let sample = (mix * gain).clamp(-1.0, 1.0);
                    for c in 0..channels {
                        data[i * channels + c] = sample;
                    }
                }

                state.frames_played += frames as u64;
                let played = state.frames_played;
                state
                    .voices
                    .retain(|v| v.start_frame + v.samples.len() as u64 > played);
            },
            err_fn,
            None,
        )
        .map_err(|e| ReadalongError::AudioDeviceError(format!("Failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| ReadalongError::AudioDeviceError(format!("Failed to start output stream: {}", e)))?;

    Ok((stream, rate))
}

impl OutputSink for AudioOutput {
    fn current_time(&self) -> Duration {
        let frames = self.state.lock().frames_played;
        Duration::from_secs_f64(frames as f64 / self.device_rate as f64)
    }

    fn start(&self, handle: ChunkHandle, samples: Arc<[f32]>, sample_rate: u32, at: Duration) {
        let (start_frame, samples) =
            match resample_to_span(&samples, sample_rate, self.device_rate, at) {
                Ok(placed) => placed,
                Err(e) => {
                    warn!("Dropping chunk {}: {}", handle, e);
                    return;
                }
            };
        debug!("Chunk {} starts at frame {}", handle, start_frame);
        self.state.lock().voices.push(Voice {
            handle,
            samples,
            start_frame,
        });
    }

    fn stop(&self, handle: ChunkHandle) {
        self.state.lock().voices.retain(|v| v.handle != handle);
    }

    fn set_envelope(&self, envelope: GainEnvelope) {
        self.state.lock().envelope = envelope;
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_output_timeline() {
        // Environments without an output device report an error instead
        if let Ok(output) = AudioOutput::open() {
            assert!(output.sample_rate() > 0);
            let a = output.current_time();
            let b = output.current_time();
            assert!(b >= a);
            output.close();
        }
    }
}
