//! Resolves channel ids back to sounds for hardware callbacks.
//!
//! Callbacks are registered with the table itself, so the only thing the
//! platform ever hands back is a [`ChannelId`]. Slots are written on the
//! main thread (bind on play, unbind on reap) and read on the audio thread
//! with `try_lock` only.

use crate::error::{Result, SoftMixError};
use crate::events::MixerEvent;
use crate::mixer;
use crate::platform::{ChannelEvent, ChannelHandler, ChannelId, ChannelReply, FillStatus};
use crate::sound::{Sound, SoundState};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

pub(crate) struct ChannelTable {
    slots: Vec<Mutex<Option<Arc<Sound>>>>,
    events: Sender<MixerEvent>,
}

impl ChannelTable {
    pub fn new(capacity: usize, events: Sender<MixerEvent>) -> Self {
        Self {
            slots: (0..capacity).map(|_| Mutex::new(None)).collect(),
            events,
        }
    }

    pub fn bind(&self, channel: ChannelId, sound: Arc<Sound>) -> Result<()> {
        let slot = self
            .slots
            .get(channel.index())
            .ok_or(SoftMixError::InvalidChannel(channel))?;
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(sound);
        Ok(())
    }

    pub fn unbind(&self, channel: ChannelId) -> Option<Arc<Sound>> {
        self.slots
            .get(channel.index())?
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn resolve(&self, channel: ChannelId) -> Option<Arc<Sound>> {
        let slot = self.slots.get(channel.index())?;
        match slot.try_lock() {
            Ok(sound) => sound.clone(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().clone(),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn emit(&self, event: MixerEvent) {
        // never block the audio thread on a full queue
        let _ = self.events.try_send(event);
    }
}

impl ChannelHandler for ChannelTable {
    fn dispatch(&self, channel: ChannelId, event: ChannelEvent<'_>) -> ChannelReply {
        let Some(sound) = self.resolve(channel) else {
            return match event {
                ChannelEvent::GenerateAudio(_) => ChannelReply::Filled {
                    frames: 0,
                    status: FillStatus::Skipped,
                },
                ChannelEvent::SampleEnded { .. } => ChannelReply::Stop,
            };
        };

        match event {
            ChannelEvent::GenerateAudio(request) => {
                let outcome = mixer::generate_audio(&sound, request);
                if outcome.status == FillStatus::Starved {
                    self.emit(MixerEvent::BufferUnderrun {
                        sound_id: sound.id(),
                        channel,
                    });
                }
                ChannelReply::Filled {
                    frames: outcome.frames,
                    status: outcome.status,
                }
            }
            ChannelEvent::SampleEnded { repeats_remaining } => {
                if repeats_remaining != 0 && sound.state() == SoundState::Playing {
                    if !sound.rewind() {
                        log::trace!("{} busy, rewind retried next pass", sound.id());
                        return ChannelReply::Retry;
                    }
                    self.emit(MixerEvent::SoundLooped {
                        sound_id: sound.id(),
                        repeats_remaining,
                    });
                    return ChannelReply::Continue;
                }

                if sound.mark_ended() {
                    self.emit(MixerEvent::SampleEnded {
                        sound_id: sound.id(),
                        channel,
                    });
                }
                ChannelReply::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PcmCodec;
    use crate::platform::GenerateRequest;
    use crate::sound::SoundBuffer;
    use crossbeam_channel::{Receiver, bounded};

    fn table() -> (ChannelTable, Receiver<MixerEvent>) {
        let (sender, receiver) = bounded(16);
        (ChannelTable::new(4, sender), receiver)
    }

    fn sound(done: bool) -> Arc<Sound> {
        let codec = if done {
            PcmCodec::finished(44100, 1)
        } else {
            PcmCodec::new(44100, 1)
        };
        let sound = Sound::new("blip", codec).unwrap();
        sound.push_buffer(SoundBuffer::from_samples(&[1, 2, 3]));
        Arc::new(sound)
    }

    fn generate(table: &ChannelTable, channel: ChannelId, target: &mut [i16]) -> ChannelReply {
        let frames = target.len();
        table.dispatch(
            channel,
            ChannelEvent::GenerateAudio(GenerateRequest {
                target,
                frames,
                mix: false,
                stereo: false,
                output_rate: 44100,
            }),
        )
    }

    #[test]
    fn test_bind_rejects_unknown_channel() {
        let (table, _events) = table();
        assert!(matches!(
            table.bind(ChannelId::new(9), sound(true)),
            Err(SoftMixError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_unbound_channel_is_silent() {
        let (table, _events) = table();
        let mut target = [0i16; 4];
        assert_eq!(
            generate(&table, ChannelId::new(0), &mut target),
            ChannelReply::Filled {
                frames: 0,
                status: FillStatus::Skipped
            }
        );
        assert_eq!(
            table.dispatch(
                ChannelId::new(0),
                ChannelEvent::SampleEnded {
                    repeats_remaining: 0
                }
            ),
            ChannelReply::Stop
        );
    }

    #[test]
    fn test_generate_routes_to_bound_sound() {
        let (table, _events) = table();
        let channel = ChannelId::new(1);
        table.bind(channel, sound(true)).unwrap();

        let mut target = [0i16; 3];
        let reply = generate(&table, channel, &mut target);

        assert_eq!(
            reply,
            ChannelReply::Filled {
                frames: 3,
                status: FillStatus::Complete
            }
        );
        assert_eq!(target, [1, 2, 3]);
    }

    #[test]
    fn test_starvation_is_reported() {
        let (table, events) = table();
        let channel = ChannelId::new(0);
        let sound = sound(false);
        table.bind(channel, sound.clone()).unwrap();

        let mut target = [0i16; 8];
        generate(&table, channel, &mut target);

        assert_eq!(
            events.try_recv().unwrap(),
            MixerEvent::BufferUnderrun {
                sound_id: sound.id(),
                channel
            }
        );
    }

    #[test]
    fn test_final_sample_end_sets_sentinel() {
        let (table, events) = table();
        let channel = ChannelId::new(2);
        let sound = sound(true);
        table.bind(channel, sound.clone()).unwrap();

        let reply = table.dispatch(
            channel,
            ChannelEvent::SampleEnded {
                repeats_remaining: 0,
            },
        );

        assert_eq!(reply, ChannelReply::Stop);
        assert_eq!(sound.state(), SoundState::Ending);
        assert_eq!(
            events.try_recv().unwrap(),
            MixerEvent::SampleEnded {
                sound_id: sound.id(),
                channel
            }
        );
        // the registry and channel binding are left for the reaper
        assert!(table.unbind(channel).is_some());
    }

    #[test]
    fn test_repeat_rewinds_buffers() {
        let (table, _events) = table();
        let channel = ChannelId::new(0);
        let sound = sound(true);
        table.bind(channel, sound.clone()).unwrap();

        let mut target = [0i16; 3];
        generate(&table, channel, &mut target);
        assert_eq!(sound.remaining_bytes(), 0);

        let reply = table.dispatch(
            channel,
            ChannelEvent::SampleEnded {
                repeats_remaining: 2,
            },
        );

        assert_eq!(reply, ChannelReply::Continue);
        assert_eq!(sound.state(), SoundState::Playing);
        assert_eq!(sound.remaining_bytes(), 6);
    }

    #[test]
    fn test_busy_rewind_asks_for_retry() {
        let (table, events) = table();
        let channel = ChannelId::new(0);
        let sound = sound(true);
        table.bind(channel, sound.clone()).unwrap();

        let mut target = [0i16; 3];
        generate(&table, channel, &mut target);

        let guard = sound.try_lock_buffers().unwrap();
        let reply = table.dispatch(
            channel,
            ChannelEvent::SampleEnded {
                repeats_remaining: 2,
            },
        );
        drop(guard);

        assert_eq!(reply, ChannelReply::Retry);
        assert_eq!(sound.state(), SoundState::Playing);
        assert_eq!(sound.remaining_bytes(), 0);
        assert!(events.try_recv().is_err());

        let reply = table.dispatch(
            channel,
            ChannelEvent::SampleEnded {
                repeats_remaining: 2,
            },
        );
        assert_eq!(reply, ChannelReply::Continue);
        assert_eq!(sound.remaining_bytes(), 6);
    }

    #[test]
    fn test_stopped_sound_does_not_repeat() {
        let (table, _events) = table();
        let channel = ChannelId::new(0);
        let sound = sound(true);
        table.bind(channel, sound.clone()).unwrap();
        sound.mark_ended();

        let reply = table.dispatch(
            channel,
            ChannelEvent::SampleEnded {
                repeats_remaining: -1,
            },
        );

        assert_eq!(reply, ChannelReply::Stop);
        assert_eq!(sound.state(), SoundState::Ending);
    }
}
