//! Configuration for SoftMix

use crate::error::{Result, SoftMixError};
use std::time::Duration;

/// Engine-wide settings shared by the manager, the software channel pool and
/// the output stream.
#[derive(Debug, Clone)]
pub struct MixerDesc {
    /// Native rate of the output device. Every sound is resampled to this.
    pub output_sample_rate: u32,
    /// 1 for a mono device, 2 for interleaved stereo.
    pub output_channels: u16,
    /// Frames requested from the device per hardware callback.
    pub block_size: usize,
    /// Size of the fixed channel pool.
    pub max_channels: usize,
    /// How long an ended sound stays alive after its callbacks are unregistered.
    pub grace_duration: Duration,
    /// Capacity of the event queue. Events are dropped when it is full.
    pub event_capacity: usize,
    /// Frames per `SoundBuffer` when decoded audio is turned into a `Sound`.
    pub buffer_frames: usize,
}

impl Default for MixerDesc {
    fn default() -> Self {
        Self {
            output_sample_rate: 44100,
            output_channels: 2,
            block_size: 512,
            max_channels: 16,
            grace_duration: Duration::from_millis(100),
            event_capacity: 256,
            buffer_frames: 4096,
        }
    }
}

impl MixerDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_sample_rate(mut self, rate: u32) -> Self {
        self.output_sample_rate = rate;
        self
    }

    pub fn output_channels(mut self, channels: u16) -> Self {
        self.output_channels = channels;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn max_channels(mut self, max: usize) -> Self {
        self.max_channels = max;
        self
    }

    pub fn grace_duration(mut self, duration: Duration) -> Self {
        self.grace_duration = duration;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn buffer_frames(mut self, frames: usize) -> Self {
        self.buffer_frames = frames;
        self
    }

    /// Checks the settings the engine cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.output_sample_rate == 0 {
            return Err(SoftMixError::InvalidSampleRate(self.output_sample_rate));
        }
        if !matches!(self.output_channels, 1 | 2) {
            return Err(SoftMixError::UnsupportedChannelCount(self.output_channels));
        }
        if self.block_size == 0 {
            return Err(SoftMixError::Configuration(
                "block_size must be greater than 0".to_string(),
            ));
        }
        if self.max_channels == 0 {
            return Err(SoftMixError::Configuration(
                "Channel pool must hold at least one channel".to_string(),
            ));
        }
        if self.buffer_frames == 0 {
            return Err(SoftMixError::Configuration(
                "buffer_frames must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
