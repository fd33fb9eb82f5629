//! Error types for SoftMix

use crate::platform::{CallbackKind, ChannelId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoftMixError {
    #[error("No free hardware channel available")]
    NoFreeChannel,

    #[error("Failed to register {kind:?} callback on {channel}")]
    CallbackRegistration {
        channel: ChannelId,
        kind: CallbackKind,
    },

    #[error("Channel playback error: {0}")]
    ChannelPlayback(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(ChannelId),

    #[error("Unsupported channel count: {0} (expected 1 or 2)")]
    UnsupportedChannelCount(u16),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Sound is not playable: {0}")]
    SoundNotPlayable(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, SoftMixError>;
