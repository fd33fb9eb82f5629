use std::time::Duration;

/// Options applied while decoding a file.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Pre-resample to this rate (None = keep the file's rate and let the
    /// mixer resample on the fly)
    pub target_sample_rate: Option<u32>,
    /// Average all channels down to one
    pub convert_to_mono: bool,
    /// Stop decoding after this much audio (None = whole file)
    pub max_duration: Option<Duration>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = Some(rate);
        self
    }

    pub fn convert_to_mono(mut self, convert: bool) -> Self {
        self.convert_to_mono = convert;
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Frame limit implied by `max_duration` at `sample_rate`.
    pub(crate) fn max_frames(&self, sample_rate: u32) -> usize {
        self.max_duration
            .map(|d| (d.as_secs_f64() * sample_rate as f64) as usize)
            .unwrap_or(usize::MAX)
    }
}
