//! Decoder-side metadata consumed by the mixer.
//!
//! The mixer never decodes anything itself. It only needs to know the source
//! format (fixed for the lifetime of a [`Sound`](crate::Sound)) and whether
//! the producer will ever push more data.

use crate::error::{Result, SoftMixError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Decoder collaborator for a single sound.
///
/// `channels` and `frequency` must not change once the sound has been
/// created. `is_done` may flip from `false` to `true` at any time, from any
/// thread.
pub trait Codec: Send + Sync {
    fn channels(&self) -> u16;
    fn frequency(&self) -> u32;
    /// No more data will ever be produced.
    fn is_done(&self) -> bool;
}

/// Immutable snapshot of a codec's format, validated for the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

impl CodecInfo {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SoftMixError::InvalidSampleRate(sample_rate));
        }
        if !matches!(channels, 1 | 2) {
            return Err(SoftMixError::UnsupportedChannelCount(channels));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn from_codec(codec: &dyn Codec) -> Result<Self> {
        Self::new(codec.frequency(), codec.channels())
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    /// Bytes occupied by one interleaved i16 frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * std::mem::size_of::<i16>()
    }
}

/// Codec for raw interleaved i16 PCM pushed by the application.
///
/// Starts out streaming; call [`finish`](Self::finish) once the last buffer
/// has been pushed so the mixer can report end-of-sample instead of
/// starvation.
#[derive(Debug)]
pub struct PcmCodec {
    sample_rate: u32,
    channels: u16,
    done: AtomicBool,
}

impl PcmCodec {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            done: AtomicBool::new(false),
        }
    }

    /// A codec whose data is already complete.
    pub fn finished(sample_rate: u32, channels: u16) -> Self {
        let codec = Self::new(sample_rate, channels);
        codec.finish();
        codec
    }

    pub fn finish(&self) {
        self.done.store(true, Ordering::Release);
    }
}

impl Codec for PcmCodec {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn frequency(&self) -> u32 {
        self.sample_rate
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}
