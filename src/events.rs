//! Event types for SoftMix

use crate::platform::ChannelId;
use crate::sound::SoundId;

/// Notifications produced by the engine and drained on the main thread with
/// [`AudioManager::poll_events`](crate::AudioManager::poll_events).
///
/// Events raised on the audio thread are sent with `try_send`; when the
/// queue is full they are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerEvent {
    SoundStarted {
        sound_id: SoundId,
        channel: ChannelId,
    },
    SoundStopRequested {
        sound_id: SoundId,
    },
    SampleEnded {
        sound_id: SoundId,
        channel: ChannelId,
    },
    SoundLooped {
        sound_id: SoundId,
        repeats_remaining: i32,
    },
    BufferUnderrun {
        sound_id: SoundId,
        channel: ChannelId,
    },
    SoundReaped {
        sound_id: SoundId,
        channel: ChannelId,
    },
}

impl MixerEvent {
    pub fn sound_id(&self) -> SoundId {
        match self {
            Self::SoundStarted { sound_id, .. }
            | Self::SoundStopRequested { sound_id }
            | Self::SampleEnded { sound_id, .. }
            | Self::SoundLooped { sound_id, .. }
            | Self::BufferUnderrun { sound_id, .. }
            | Self::SoundReaped { sound_id, .. } => *sound_id,
        }
    }

    /// Events raised from inside the hardware callback.
    pub fn is_audio_thread_event(&self) -> bool {
        matches!(
            self,
            Self::SampleEnded { .. } | Self::SoundLooped { .. } | Self::BufferUnderrun { .. }
        )
    }
}
