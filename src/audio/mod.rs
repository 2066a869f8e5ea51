//! Audio plumbing for the voice companion
//!
//! Pure pieces (codec, envelope, scheduler, frame re-blocking, resampling)
//! are always built. Device access via cpal lives behind the `audio-io`
//! feature.

pub mod buffer;
pub mod capture;
pub mod codec;
pub mod envelope;
#[cfg(feature = "audio-io")]
pub mod input;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod resampler;
pub mod scheduler;

pub use buffer::FrameAccumulator;
pub use capture::{ChannelMicrophone, MicFeed, MicrophoneSource};
pub use envelope::{GainEnvelope, RampShape, GAIN_FLOOR};
#[cfg(feature = "audio-io")]
pub use input::AudioInput;
#[cfg(feature = "audio-io")]
pub use output::AudioOutput;
pub use resampler::{resample_audio, resample_to_span, AudioResampler};
pub use scheduler::{ChunkHandle, OutputSink, ScheduledChunk, SilentSink, StreamScheduler, TurnId};
