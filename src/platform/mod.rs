//! The hardware channel pool the mixer plays through.
//!
//! [`AudioPlatform`] is the OS/driver side: a fixed set of mixing channels,
//! each of which can have handlers registered for three callback kinds.
//! Every callback is delivered through one [`ChannelHandler::dispatch`] call
//! carrying a [`ChannelEvent`], and handlers only ever learn the
//! [`ChannelId`] they were invoked for.
//!
//! [`SoftwarePlatform`] is the in-process implementation driven by
//! [`AudioOutput`].

mod output;
mod software;

pub use output::AudioOutput;
pub use software::{RenderStats, SoftwarePlatform};

use crate::error::Result;
use std::sync::Arc;

/// Opaque handle to one channel of the pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(usize);

impl ChannelId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Channel({})", self.0)
    }
}

/// The callbacks a channel can have registered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// The source ran out of data.
    SampleEnded,
    /// Produce mono samples.
    GenerateAudio,
    /// Produce interleaved stereo samples.
    GenerateAudioStereo,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 3] = [
        CallbackKind::SampleEnded,
        CallbackKind::GenerateAudio,
        CallbackKind::GenerateAudioStereo,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::SampleEnded => 0,
            Self::GenerateAudio => 1,
            Self::GenerateAudioStereo => 2,
        }
    }
}

/// A request for more samples.
#[derive(Debug)]
pub struct GenerateRequest<'a> {
    /// Interleaved output: `frames` samples for mono, `2 * frames` for stereo.
    pub target: &'a mut [i16],
    pub frames: usize,
    /// Add to what is already in `target` instead of overwriting it.
    pub mix: bool,
    /// Fired as [`CallbackKind::GenerateAudioStereo`].
    pub stereo: bool,
    /// Rate the samples will be played at.
    pub output_rate: u32,
}

/// Tagged event delivered to a channel's handler.
#[derive(Debug)]
pub enum ChannelEvent<'a> {
    GenerateAudio(GenerateRequest<'a>),
    /// The source ended. `repeats_remaining` is negative for infinite
    /// repetition and zero on the final pass.
    SampleEnded { repeats_remaining: i32 },
}

impl ChannelEvent<'_> {
    pub fn kind(&self) -> CallbackKind {
        match self {
            Self::GenerateAudio(request) if request.stereo => CallbackKind::GenerateAudioStereo,
            Self::GenerateAudio(_) => CallbackKind::GenerateAudio,
            Self::SampleEnded { .. } => CallbackKind::SampleEnded,
        }
    }
}

/// Outcome of a generate request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FillStatus {
    /// Every requested frame was produced.
    Complete,
    /// Ran out of buffered data but the decoder is not finished. Try again
    /// next callback.
    Starved,
    /// Ran out of data and the decoder is finished.
    Ended,
    /// Nothing produced: the buffers were locked or the sound is no longer
    /// playing.
    Skipped,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelReply {
    Filled { frames: usize, status: FillStatus },
    /// Keep playing (another repeat).
    Continue,
    /// The repeat could not start yet. Keep playing without using up a
    /// repeat and end the sample again on a later pass.
    Retry,
    /// No repeats left, stop the channel.
    Stop,
}

/// Receives every callback for the channels it is registered on.
///
/// Called from the audio thread. Implementations must never block.
pub trait ChannelHandler: Send + Sync {
    fn dispatch(&self, channel: ChannelId, event: ChannelEvent<'_>) -> ChannelReply;
}

/// The OS-owned pool of mixing channels.
///
/// All methods are called from the main thread.
pub trait AudioPlatform: Send + Sync {
    /// Reserves a free channel, or `None` if the pool is exhausted.
    fn acquire_free_channel(&self) -> Option<ChannelId>;

    /// Returns a channel to the pool. Any remaining registrations are dropped.
    fn release_channel(&self, channel: ChannelId);

    fn register_callback(
        &self,
        channel: ChannelId,
        kind: CallbackKind,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<()>;

    /// Unregistering a kind that was never registered is a no-op.
    fn unregister_callback(&self, channel: ChannelId, kind: CallbackKind);

    fn stop_channel(&self, channel: ChannelId);

    fn output_sample_rate(&self) -> u32;

    /// Starts the channel.
    ///
    /// `initial` primes the channel with `frames` mono samples; it is only
    /// played directly when no generate callback is registered. Samples past
    /// `frames` are ignored. `repeats < 0` repeats forever, `0`
    /// plays once, `n > 0` plays `n` more times. `pitch` overrides the output
    /// rate reported to generate callbacks.
    fn play_channel(
        &self,
        channel: ChannelId,
        initial: &[i16],
        frames: usize,
        repeats: i32,
        pitch: Option<u32>,
    ) -> Result<()>;
}
