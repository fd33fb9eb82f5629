use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const PLAYING: u64 = 0;
const ENDING: u64 = u64::MAX;
const DEAD: u64 = u64::MAX - 1;

/// Lifecycle state of a sound.
///
/// `Playing -> Ending -> Draining -> Dead`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundState {
    /// Producing audio. The only state in which the mixer touches buffers.
    Playing,
    /// Ended or stopped; waiting for the reaper to unregister its callbacks.
    Ending,
    /// Callbacks unregistered; kept alive for in-flight callbacks.
    Draining,
    /// Removed from the registry.
    Dead,
}

/// Snapshot of the keep-alive timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    Playing,
    Ending,
    Draining(Duration),
    Dead,
}

impl KeepAlive {
    pub fn state(&self) -> SoundState {
        match self {
            Self::Playing => SoundState::Playing,
            Self::Ending => SoundState::Ending,
            Self::Draining(_) => SoundState::Draining,
            Self::Dead => SoundState::Dead,
        }
    }
}

/// Lock-free keep-alive timer shared between the audio thread and the main
/// thread.
///
/// Encoded in a single word: `0` playing, `u64::MAX` the ending sentinel,
/// `u64::MAX - 1` dead, anything else the draining time left in
/// microseconds. The audio thread only ever performs `Playing -> Ending`.
#[derive(Debug, Default)]
pub(crate) struct KeepAliveTimer(AtomicU64);

impl KeepAliveTimer {
    pub fn load(&self) -> KeepAlive {
        match self.0.load(Ordering::Acquire) {
            PLAYING => KeepAlive::Playing,
            ENDING => KeepAlive::Ending,
            DEAD => KeepAlive::Dead,
            micros => KeepAlive::Draining(Duration::from_micros(micros)),
        }
    }

    /// `Playing -> Ending`. Returns false if the sound had already left
    /// `Playing`.
    pub fn mark_ended(&self) -> bool {
        self.0
            .compare_exchange(PLAYING, ENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Ending -> Draining` with the full grace period.
    pub fn begin_draining(&self, grace: Duration) -> bool {
        let micros = grace.as_micros().clamp(1, (DEAD - 1) as u128) as u64;
        self.0
            .compare_exchange(ENDING, micros, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Counts a draining timer down. Returns true once it has reached zero.
    ///
    /// The timer stays at its last positive value so the caller decides when
    /// the sound is actually dead.
    pub fn tick(&self, elapsed: Duration) -> bool {
        match self.load() {
            KeepAlive::Draining(left) => {
                if elapsed >= left {
                    self.0.store(1, Ordering::Release);
                    true
                } else {
                    let left = (left - elapsed).as_micros().max(1) as u64;
                    self.0.store(left, Ordering::Release);
                    false
                }
            }
            _ => false,
        }
    }

    pub fn mark_dead(&self) {
        self.0.store(DEAD, Ordering::Release);
    }
}
