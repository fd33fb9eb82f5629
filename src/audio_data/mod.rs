//! Decoding files into [`Sound`]s.
//!
//! Files are decoded with symphonia into interleaved f32, optionally
//! downmixed, truncated and pre-resampled, then quantised to 16-bit and
//! split into [`SoundBuffer`]s.

mod load_options;
mod resampler;
mod symphonia_loader;

pub use load_options::LoadOptions;
pub use resampler::PreResampler;
pub use symphonia_loader::load_audio_file;

use crate::codec::{CodecInfo, PcmCodec};
use crate::error::{Result, SoftMixError};
use crate::sound::{Sound, SoundBuffer};
use std::time::Duration;

/// Fully decoded interleaved audio.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SoftMixError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(SoftMixError::UnsupportedChannelCount(channels));
        }

        let mut samples = samples;
        samples.truncate(samples.len() - samples.len() % channels as usize);
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn truncate_frames(&mut self, frames: usize) {
        let len = frames.saturating_mul(self.channels as usize);
        self.samples.truncate(len);
    }

    /// Averages every frame down to one channel.
    pub fn downmix_to_mono(self) -> Self {
        if self.channels == 1 {
            return self;
        }

        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Self {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    pub fn resample(self, target_rate: u32) -> Result<Self> {
        if target_rate == self.sample_rate {
            return Ok(self);
        }

        let resampler = PreResampler::new(self.sample_rate, target_rate, self.channels)?;
        let samples = resampler.process_interleaved(&self.samples)?;
        Self::new(samples, target_rate, self.channels)
    }

    /// Quantises to signed 16-bit, saturating outside `[-1.0, 1.0]`.
    pub fn to_pcm16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
            .collect()
    }

    /// Builds a finished [`Sound`] whose queue holds `buffer_frames` frames
    /// per buffer.
    ///
    /// # Errors
    ///
    /// Fails for more than two channels (downmix first) or a zero
    /// `buffer_frames`.
    pub fn into_sound(self, name: impl Into<String>, buffer_frames: usize) -> Result<Sound> {
        CodecInfo::new(self.sample_rate, self.channels)?;
        if buffer_frames == 0 {
            return Err(SoftMixError::Configuration(
                "buffer_frames must be greater than 0".to_string(),
            ));
        }

        let pcm = self.to_pcm16();
        let sound = Sound::new(name, PcmCodec::finished(self.sample_rate, self.channels))?;
        for chunk in pcm.chunks(buffer_frames * self.channels as usize) {
            sound.push_buffer(SoundBuffer::from_samples(chunk));
        }
        Ok(sound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::SoundState;

    #[test]
    fn test_partial_trailing_frame_is_dropped() {
        let audio = DecodedAudio::new(vec![0.1, 0.2, 0.3], 44100, 2).unwrap();
        assert_eq!(audio.frames(), 1);
        assert_eq!(audio.samples(), &[0.1, 0.2]);
    }

    #[test]
    fn test_downmix_averages_frames() {
        let audio = DecodedAudio::new(vec![0.5, -0.5, 1.0, 0.0], 44100, 2)
            .unwrap()
            .downmix_to_mono();
        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.samples(), &[0.0, 0.5]);
    }

    #[test]
    fn test_truncate_and_duration() {
        let mut audio = DecodedAudio::new(vec![0.0; 44100], 44100, 1).unwrap();
        assert_eq!(audio.duration(), Duration::from_secs(1));
        audio.truncate_frames(22050);
        assert_eq!(audio.frames(), 22050);
    }

    #[test]
    fn test_pcm16_saturates() {
        let audio = DecodedAudio::new(vec![0.0, 1.0, -1.0, 2.0, -2.0], 8000, 1).unwrap();
        assert_eq!(audio.to_pcm16(), vec![0, 32767, -32767, 32767, -32767]);
    }

    #[test]
    fn test_into_sound_splits_buffers() {
        let audio = DecodedAudio::new(vec![0.0; 10 * 2], 22050, 2).unwrap();
        let sound = audio.into_sound("music", 4).unwrap();

        assert_eq!(sound.name(), "music");
        assert!(sound.is_done());
        assert!(sound.codec_info().is_stereo());
        assert_eq!(sound.state(), SoundState::Playing);
        assert_eq!(sound.remaining_bytes(), 10 * 2 * 2);
        let buffers = sound.try_lock_buffers().unwrap();
        assert_eq!(buffers.len(), 3);
    }

    #[test]
    fn test_surround_needs_downmix() {
        let audio = DecodedAudio::new(vec![0.0; 12], 48000, 6).unwrap();
        assert!(matches!(
            audio.clone().into_sound("surround", 64),
            Err(SoftMixError::UnsupportedChannelCount(6))
        ));
        assert!(audio.downmix_to_mono().into_sound("surround", 64).is_ok());
    }

    #[test]
    fn test_resample_to_same_rate_is_noop() {
        let audio = DecodedAudio::new(vec![0.25; 8], 44100, 1).unwrap();
        let resampled = audio.resample(44100).unwrap();
        assert_eq!(resampled.samples(), &[0.25; 8]);
    }
}
