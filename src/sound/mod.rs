//! Per-instance playback state.
//!
//! A [`Sound`] is shared between the main thread (which creates it, pushes
//! buffers and reaps it) and the audio thread (which consumes buffers from
//! inside the hardware callback). The buffer queue sits behind a mutex that
//! the audio thread only ever `try_lock`s: a held lock *is* the `locked`
//! flag, and a mixer that cannot take it produces nothing for that callback.

mod buffer;
mod keep_alive;

pub use buffer::{BufferQueue, SoundBuffer};
pub use keep_alive::{KeepAlive, SoundState};

use crate::codec::{Codec, CodecInfo};
use crate::error::Result;
use crate::platform::ChannelId;
use keep_alive::KeepAliveTimer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;
use uuid::Uuid;

const NO_CHANNEL: usize = usize::MAX;

/// Unique identity of a sound instance.
///
/// Names are not unique (the same effect can be playing several times), ids are.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SoundId(Uuid);

impl SoundId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoundId({})", self.0)
    }
}

/// A playable sound instance.
///
/// A sound plays at most once: after it leaves [`SoundState::Playing`] it can
/// never be played again. Create a new instance to replay the same data.
pub struct Sound {
    id: SoundId,
    name: String,
    codec: Box<dyn Codec>,
    info: CodecInfo,
    buffers: Mutex<BufferQueue>,
    keep_alive: KeepAliveTimer,
    channel: AtomicUsize,
}

impl Sound {
    /// Creates a sound with an empty buffer queue.
    ///
    /// # Errors
    ///
    /// Fails if the codec reports a zero sample rate or a channel count other
    /// than 1 or 2.
    pub fn new(name: impl Into<String>, codec: impl Codec + 'static) -> Result<Self> {
        let info = CodecInfo::from_codec(&codec)?;
        Ok(Self {
            id: SoundId::new(),
            name: name.into(),
            codec: Box::new(codec),
            info,
            buffers: Mutex::new(BufferQueue::new()),
            keep_alive: KeepAliveTimer::default(),
            channel: AtomicUsize::new(NO_CHANNEL),
        })
    }

    /// Builder-style variant of [`push_buffer`](Self::push_buffer).
    pub fn with_buffer(self, buffer: SoundBuffer) -> Self {
        self.push_buffer(buffer);
        self
    }

    pub fn id(&self) -> SoundId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codec_info(&self) -> CodecInfo {
        self.info
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.codec.is_done()
    }

    /// Appends decoded data. Main-thread producer side; may wait briefly for
    /// a mixer that is currently reading.
    pub fn push_buffer(&self, buffer: SoundBuffer) {
        self.lock_buffers().push(buffer);
    }

    pub fn push_samples(&self, samples: &[i16]) {
        self.push_buffer(SoundBuffer::from_samples(samples));
    }

    /// Unconsumed bytes across the whole queue.
    pub fn remaining_bytes(&self) -> usize {
        self.lock_buffers().remaining_bytes()
    }

    /// Frees fully played buffers of a streamed sound.
    pub fn discard_consumed(&self) -> usize {
        self.lock_buffers().discard_consumed()
    }

    pub fn state(&self) -> SoundState {
        self.keep_alive.load().state()
    }

    pub fn keep_alive(&self) -> KeepAlive {
        self.keep_alive.load()
    }

    /// The hardware channel this sound is bound to, while it is active.
    pub fn channel(&self) -> Option<ChannelId> {
        match self.channel.load(Ordering::Acquire) {
            NO_CHANNEL => None,
            index => Some(ChannelId::new(index)),
        }
    }

    /// True while someone (normally the mixer) holds the buffer lock.
    pub fn is_locked(&self) -> bool {
        matches!(self.buffers.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Takes the buffer lock without blocking.
    ///
    /// This is the only way the audio thread touches the buffers.
    pub fn try_lock_buffers(&self) -> Option<MutexGuard<'_, BufferQueue>> {
        match self.buffers.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn lock_buffers(&self) -> MutexGuard<'_, BufferQueue> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Samples of the first buffer that still has data, used to prime a
    /// channel. Stereo frames are averaged to one sample each.
    pub(crate) fn primer_samples(&self) -> Vec<i16> {
        let samples = self
            .lock_buffers()
            .head()
            .map(SoundBuffer::remaining_samples)
            .unwrap_or_default();
        if !self.info.is_stereo() {
            return samples;
        }

        samples
            .chunks_exact(2)
            .map(|frame| ((frame[0] as i32 + frame[1] as i32) / 2) as i16)
            .collect()
    }

    /// Resets every buffer cursor for another repeat. Non-blocking; returns
    /// false if the buffers were busy.
    pub(crate) fn rewind(&self) -> bool {
        match self.try_lock_buffers() {
            Some(mut buffers) => {
                buffers.rewind();
                true
            }
            None => false,
        }
    }

    /// `Playing -> Ending`. Shared by natural completion and `stop()`.
    pub(crate) fn mark_ended(&self) -> bool {
        self.keep_alive.mark_ended()
    }

    pub(crate) fn begin_draining(&self, grace: Duration) -> bool {
        self.keep_alive.begin_draining(grace)
    }

    pub(crate) fn tick_keep_alive(&self, elapsed: Duration) -> bool {
        self.keep_alive.tick(elapsed)
    }

    pub(crate) fn mark_dead(&self) {
        self.keep_alive.mark_dead();
    }

    /// Claims `channel` for this sound. Fails if it is already bound.
    pub(crate) fn bind_channel(&self, channel: ChannelId) -> bool {
        self.channel
            .compare_exchange(
                NO_CHANNEL,
                channel.index(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn unbind_channel(&self) {
        self.channel.store(NO_CHANNEL, Ordering::Release);
    }
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("info", &self.info)
            .field("keep_alive", &self.keep_alive.load())
            .field("channel", &self.channel())
            .finish()
    }
}
