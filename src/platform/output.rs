use super::{RenderStats, SoftwarePlatform};
use crate::config::MixerDesc;
use crate::error::{Result, SoftMixError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Drives a [`SoftwarePlatform`] from the default cpal output device.
pub struct AudioOutput {
    desc: MixerDesc,
    platform: Arc<SoftwarePlatform>,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
    underruns: Arc<AtomicUsize>,
}

impl AudioOutput {
    pub fn new(desc: MixerDesc, platform: Arc<SoftwarePlatform>) -> Result<Self> {
        desc.validate()?;
        if platform.output_channels() != desc.output_channels {
            return Err(SoftMixError::Configuration(format!(
                "Platform renders {} channels but the output expects {}",
                platform.output_channels(),
                desc.output_channels
            )));
        }

        Ok(Self {
            desc,
            platform,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
            underruns: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Opens the default device and starts rendering.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            SoftMixError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.desc.output_channels,
            sample_rate: cpal::SampleRate(self.desc.output_sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.desc.block_size as u32),
        };

        let default_config = device.default_output_config().map_err(|e| {
            SoftMixError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            format => {
                return Err(SoftMixError::AudioFormat(format!(
                    "Unsupported sample format {:?}",
                    format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| SoftMixError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "Audio output started: {} Hz, {} channel(s), block of {} frames",
            self.desc.output_sample_rate,
            self.desc.output_channels,
            self.desc.block_size
        );

        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!(
                "Audio output stopped after {} frames",
                self.frames_processed()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Callbacks in which at least one channel starved.
    pub fn underruns(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn platform(&self) -> &Arc<SoftwarePlatform> {
        &self.platform
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<i16>,
    {
        let platform = self.platform.clone();
        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();
        let underruns = self.underruns.clone();
        let channels = self.desc.output_channels as usize;
        let mut scratch = vec![0i16; self.desc.block_size * channels];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0i16);
                        }
                        return;
                    }

                    let stats = render_blocks(&platform, &mut scratch, data);
                    if stats.starved > 0 {
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }

                    frames_processed.fetch_add(data.len() / channels, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SoftMixError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }
}

/// Renders `data` one `scratch`-sized block at a time and converts it to the
/// device format. `scratch` holds a whole number of frames.
fn render_blocks<T>(platform: &SoftwarePlatform, scratch: &mut [i16], data: &mut [T]) -> RenderStats
where
    T: SizedSample + FromSample<i16>,
{
    let mut stats = RenderStats::default();
    for block in data.chunks_mut(scratch.len()) {
        let rendered = &mut scratch[..block.len()];
        let block_stats = platform.render(rendered);
        stats.channels_mixed = stats.channels_mixed.max(block_stats.channels_mixed);
        stats.starved += block_stats.starved;

        for (sample, &value) in block.iter_mut().zip(rendered.iter()) {
            *sample = T::from_sample(value);
        }
    }
    stats
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
