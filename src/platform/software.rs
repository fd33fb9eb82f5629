//! In-process channel pool.
//!
//! Emulates the hardware side of the protocol: a fixed number of channels,
//! per-channel callback registration, and a [`render`](SoftwarePlatform::render)
//! entry point that the output stream calls once per hardware buffer. Main
//! thread calls lock a channel's slot; `render` only ever `try_lock`s and
//! skips a channel that is busy.

use super::{
    AudioPlatform, CallbackKind, ChannelEvent, ChannelHandler, ChannelId, ChannelReply,
    FillStatus, GenerateRequest,
};
use crate::config::MixerDesc;
use crate::error::{Result, SoftMixError};
use crate::mixer::clip_to_s16;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// What one [`SoftwarePlatform::render`] call did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    /// Playing channels that were mixed into the output.
    pub channels_mixed: usize,
    /// Channels whose source could not keep up.
    pub starved: usize,
}

#[derive(Default)]
struct ChannelSlot {
    acquired: bool,
    playing: bool,
    repeats: i32,
    pitch: Option<u32>,
    handlers: [Option<Arc<dyn ChannelHandler>>; 3],
    // used when no generate callback is registered
    static_samples: Vec<i16>,
    static_position: usize,
    scratch: Vec<i16>,
}

pub struct SoftwarePlatform {
    output_rate: u32,
    output_channels: u16,
    slots: Vec<Mutex<ChannelSlot>>,
}

impl SoftwarePlatform {
    pub fn new(desc: &MixerDesc) -> Result<Self> {
        desc.validate()?;
        Ok(Self {
            output_rate: desc.output_sample_rate,
            output_channels: desc.output_channels,
            slots: (0..desc.max_channels)
                .map(|_| {
                    Mutex::new(ChannelSlot {
                        scratch: vec![0; desc.block_size],
                        ..ChannelSlot::default()
                    })
                })
                .collect(),
        })
    }

    pub fn channel_count(&self) -> usize {
        self.slots.len()
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    pub fn free_channels(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !lock(slot).acquired)
            .count()
    }

    pub fn is_channel_playing(&self, channel: ChannelId) -> bool {
        self.slot(channel).map(|slot| slot.playing).unwrap_or(false)
    }

    pub fn is_registered(&self, channel: ChannelId, kind: CallbackKind) -> bool {
        self.slot(channel)
            .map(|slot| slot.handlers[kind.index()].is_some())
            .unwrap_or(false)
    }

    fn slot(&self, channel: ChannelId) -> Result<MutexGuard<'_, ChannelSlot>> {
        self.slots
            .get(channel.index())
            .map(lock)
            .ok_or(SoftMixError::InvalidChannel(channel))
    }

    /// Zeroes `out` and mixes every playing channel into it.
    ///
    /// `out` is interleaved with `output_channels` samples per frame. Called
    /// from the audio thread; never blocks.
    pub fn render(&self, out: &mut [i16]) -> RenderStats {
        out.fill(0);
        let output_channels = self.output_channels as usize;
        let frames = out.len() / output_channels;
        let out = &mut out[..frames * output_channels];
        let mut stats = RenderStats::default();

        for (index, slot) in self.slots.iter().enumerate() {
            let mut slot = match slot.try_lock() {
                Ok(slot) => slot,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => continue,
            };
            if !slot.playing {
                continue;
            }

            stats.channels_mixed += 1;
            if self.render_channel(ChannelId::new(index), &mut slot, out, frames) {
                stats.starved += 1;
            }
        }

        stats
    }

    /// Returns true if the channel starved.
    fn render_channel(
        &self,
        channel: ChannelId,
        slot: &mut ChannelSlot,
        out: &mut [i16],
        frames: usize,
    ) -> bool {
        let output_channels = self.output_channels as usize;
        let rate = slot.pitch.unwrap_or(self.output_rate);
        let mut filled = 0;
        let mut stalled = false;

        while filled < frames && slot.playing {
            let wanted = frames - filled;
            let region = &mut out[filled * output_channels..];
            let (produced, status) = self.fill(channel, slot, region, wanted, rate);
            filled += produced;

            match status {
                FillStatus::Complete => {}
                FillStatus::Starved => return true,
                FillStatus::Skipped => break,
                FillStatus::Ended => {
                    // an empty source on repeat would spin forever
                    if produced == 0 {
                        if stalled {
                            break;
                        }
                        stalled = true;
                    } else {
                        stalled = false;
                    }
                    self.end_of_sample(channel, slot);
                }
            }
        }

        false
    }

    fn fill(
        &self,
        channel: ChannelId,
        slot: &mut ChannelSlot,
        region: &mut [i16],
        wanted: usize,
        rate: u32,
    ) -> (usize, FillStatus) {
        let output_channels = self.output_channels as usize;

        let stereo = if output_channels == 2 {
            slot.handlers[CallbackKind::GenerateAudioStereo.index()].clone()
        } else {
            None
        };
        if let Some(handler) = stereo {
            let reply = handler.dispatch(
                channel,
                ChannelEvent::GenerateAudio(GenerateRequest {
                    target: &mut region[..wanted * 2],
                    frames: wanted,
                    mix: true,
                    stereo: true,
                    output_rate: rate,
                }),
            );
            return reply_frames(reply, wanted);
        }

        if let Some(handler) = slot.handlers[CallbackKind::GenerateAudio.index()].clone() {
            // only grows for renders larger than one block
            if slot.scratch.len() < wanted {
                slot.scratch.resize(wanted, 0);
            }
            let reply = handler.dispatch(
                channel,
                ChannelEvent::GenerateAudio(GenerateRequest {
                    target: &mut slot.scratch[..wanted],
                    frames: wanted,
                    mix: false,
                    stereo: false,
                    output_rate: rate,
                }),
            );
            let (produced, status) = reply_frames(reply, wanted);
            spread(&slot.scratch[..produced], region, output_channels);
            return (produced, status);
        }

        let start = slot.static_position;
        let end = (start + wanted).min(slot.static_samples.len());
        spread(&slot.static_samples[start..end], region, output_channels);
        slot.static_position = end;
        let produced = end - start;
        let status = if produced == wanted {
            FillStatus::Complete
        } else {
            FillStatus::Ended
        };
        (produced, status)
    }

    fn end_of_sample(&self, channel: ChannelId, slot: &mut ChannelSlot) {
        let reply = match slot.handlers[CallbackKind::SampleEnded.index()].clone() {
            Some(handler) => handler.dispatch(
                channel,
                ChannelEvent::SampleEnded {
                    repeats_remaining: slot.repeats,
                },
            ),
            None if slot.repeats != 0 => ChannelReply::Continue,
            None => ChannelReply::Stop,
        };

        match reply {
            ChannelReply::Continue => {
                if slot.repeats > 0 {
                    slot.repeats -= 1;
                }
                slot.static_position = 0;
            }
            ChannelReply::Retry => {}
            _ => slot.playing = false,
        }
    }
}

impl AudioPlatform for SoftwarePlatform {
    fn acquire_free_channel(&self) -> Option<ChannelId> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            let mut slot = lock(slot);
            if slot.acquired {
                return None;
            }
            *slot = ChannelSlot {
                acquired: true,
                ..ChannelSlot::default()
            };
            Some(ChannelId::new(index))
        })
    }

    fn release_channel(&self, channel: ChannelId) {
        if let Ok(mut slot) = self.slot(channel) {
            *slot = ChannelSlot::default();
        }
    }

    fn register_callback(
        &self,
        channel: ChannelId,
        kind: CallbackKind,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<()> {
        let mut slot = self.slot(channel)?;
        if !slot.acquired {
            return Err(SoftMixError::InvalidChannel(channel));
        }
        let registered = &mut slot.handlers[kind.index()];
        if registered.is_some() {
            return Err(SoftMixError::CallbackRegistration { channel, kind });
        }
        *registered = Some(handler);
        Ok(())
    }

    fn unregister_callback(&self, channel: ChannelId, kind: CallbackKind) {
        if let Ok(mut slot) = self.slot(channel) {
            slot.handlers[kind.index()] = None;
        }
    }

    fn stop_channel(&self, channel: ChannelId) {
        if let Ok(mut slot) = self.slot(channel) {
            slot.playing = false;
        }
    }

    fn output_sample_rate(&self) -> u32 {
        self.output_rate
    }

    /// Without a generate callback `initial` is played as mono at the
    /// output rate.
    fn play_channel(
        &self,
        channel: ChannelId,
        initial: &[i16],
        frames: usize,
        repeats: i32,
        pitch: Option<u32>,
    ) -> Result<()> {
        let mut slot = self.slot(channel)?;
        if !slot.acquired {
            return Err(SoftMixError::InvalidChannel(channel));
        }
        if slot.playing {
            return Err(SoftMixError::ChannelPlayback(format!(
                "{} is already playing",
                channel
            )));
        }
        if pitch == Some(0) {
            return Err(SoftMixError::InvalidSampleRate(0));
        }

        slot.static_samples = initial[..frames.min(initial.len())].to_vec();
        slot.static_position = 0;
        slot.repeats = repeats;
        slot.pitch = pitch;
        slot.playing = true;
        Ok(())
    }
}

fn lock(slot: &Mutex<ChannelSlot>) -> MutexGuard<'_, ChannelSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn reply_frames(reply: ChannelReply, wanted: usize) -> (usize, FillStatus) {
    match reply {
        ChannelReply::Filled { frames, status } => (frames.min(wanted), status),
        ChannelReply::Continue | ChannelReply::Retry | ChannelReply::Stop => {
            (0, FillStatus::Skipped)
        }
    }
}

/// Adds mono `samples` into every channel of the interleaved `out`.
fn spread(samples: &[i16], out: &mut [i16], output_channels: usize) {
    for (frame, &sample) in out.chunks_exact_mut(output_channels).zip(samples) {
        for slot in frame {
            *slot = clip_to_s16(*slot as i32 + sample as i32);
        }
    }
}
