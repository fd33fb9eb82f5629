//! Software PCM mixing engine.
//!
//! Sounds are played on channels of a fixed hardware pool. The audio thread
//! pulls samples through per-channel callbacks that resample, mix and clip
//! into the device buffer without ever blocking, while the main thread
//! starts and stops sounds and reaps them once per frame after a grace
//! window.

pub mod audio_data;
mod channel_table;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod mixer;
pub mod platform;
pub mod sound;

pub use audio_data::{DecodedAudio, LoadOptions, load_audio_file};
pub use codec::{Codec, CodecInfo, PcmCodec};
pub use config::MixerDesc;
pub use error::{Result, SoftMixError};
pub use events::MixerEvent;
pub use manager::AudioManager;
pub use platform::{
    AudioOutput, AudioPlatform, CallbackKind, ChannelEvent, ChannelHandler, ChannelId,
    ChannelReply, FillStatus, GenerateRequest, RenderStats, SoftwarePlatform,
};
pub use sound::{BufferQueue, KeepAlive, Sound, SoundBuffer, SoundId, SoundState};
