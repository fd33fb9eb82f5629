use crate::error::{Result, SoftMixError};
use rubato::{FftFixedIn, Resampler};

const DEFAULT_CHUNK_FRAMES: usize = 1024;

/// Offline band-limited resampler used at load time.
///
/// The mixer's own nearest-sample resampling is cheap but aliases; sounds
/// that are loaded ahead of time can be brought to the output rate here so
/// the mixer later runs at factor 1.
pub struct PreResampler {
    source_rate: u32,
    target_rate: u32,
    channels: u16,
    chunk_frames: usize,
}

impl PreResampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: u16) -> Result<Self> {
        if source_rate == 0 {
            return Err(SoftMixError::InvalidSampleRate(source_rate));
        }
        if target_rate == 0 {
            return Err(SoftMixError::InvalidSampleRate(target_rate));
        }
        if channels == 0 {
            return Err(SoftMixError::UnsupportedChannelCount(channels));
        }

        Ok(Self {
            source_rate,
            target_rate,
            channels,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
        })
    }

    pub fn with_chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames.max(1);
        self
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Frames produced for `source_frames` input frames.
    pub fn expected_frames(&self, source_frames: usize) -> usize {
        (source_frames as u64 * self.target_rate as u64).div_ceil(self.source_rate as u64) as usize
    }

    /// Resamples interleaved audio, returning interleaved audio.
    pub fn process_interleaved(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_rate == self.target_rate {
            return Ok(interleaved.to_vec());
        }

        let channels = self.channels as usize;
        let source_frames = interleaved.len() / channels;
        let planar: Vec<Vec<f32>> = (0..channels)
            .map(|ch| {
                interleaved
                    .chunks_exact(channels)
                    .map(|frame| frame[ch])
                    .collect()
            })
            .collect();

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_rate as usize,
            self.target_rate as usize,
            self.chunk_frames,
            2,
            channels,
        )
        .map_err(|e| SoftMixError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let delay = resampler.output_delay();
        let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels];
        let mut position = 0;

        while position < source_frames {
            let needed = resampler.input_frames_next();
            let end = (position + needed).min(source_frames);
            let chunk: Vec<&[f32]> = planar.iter().map(|ch| &ch[position..end]).collect();

            let result = if end - position == needed {
                resampler.process(&chunk, None)
            } else {
                resampler.process_partial(Some(chunk.as_slice()), None)
            };
            let produced =
                result.map_err(|e| SoftMixError::AudioLoading(format!("Resampling error: {}", e)))?;

            append(&mut output, produced);
            position = end;
        }

        // flush what is still inside the filter
        let wanted = self.expected_frames(source_frames);
        while output[0].len() < wanted + delay {
            let produced = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| SoftMixError::AudioLoading(format!("Resampling error: {}", e)))?;
            if produced[0].is_empty() {
                break;
            }
            append(&mut output, produced);
        }

        let frames = output[0].len().saturating_sub(delay).min(wanted);
        let mut result = Vec::with_capacity(frames * channels);
        for frame in delay..delay + frames {
            for channel in &output {
                result.push(channel[frame]);
            }
        }

        Ok(result)
    }
}

fn append(output: &mut [Vec<f32>], produced: Vec<Vec<f32>>) {
    for (channel, samples) in output.iter_mut().zip(produced) {
        channel.extend(samples);
    }
}
