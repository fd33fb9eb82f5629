use crate::channel_table::ChannelTable;
use crate::config::MixerDesc;
use crate::error::{Result, SoftMixError};
use crate::events::MixerEvent;
use crate::platform::{AudioPlatform, CallbackKind, ChannelHandler, ChannelId};
use crate::sound::{Sound, SoundState};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::time::Duration;

/// Owns the active sound registry and drives the playback lifecycle.
///
/// `AudioManager` lives on the main thread. [`play`](Self::play) binds a
/// sound to a hardware channel, the platform's audio thread then pulls
/// samples through the channel's callbacks, and [`update`](Self::update),
/// called once per frame, tears channels down and destroys sounds once it is
/// safe to do so.
///
/// # Lifecycle
///
/// - **Playing**: the mixer consumes the sound's buffers.
/// - **Ending**: the sound ran out of data or [`stop`](Self::stop) was
///   called. The next `update` stops the channel and unregisters its
///   callbacks.
/// - **Draining**: the grace window counts down so that callbacks already
///   in flight find the sound still alive.
/// - **Dead**: removed from the registry, channel released.
///
/// Only the main thread touches the registry; the audio thread only ever
/// sees individual sounds through the channel table.
pub struct AudioManager<P: AudioPlatform> {
    desc: MixerDesc,
    platform: Arc<P>,
    registry: Vec<Arc<Sound>>,
    table: Arc<ChannelTable>,
    event_sender: Sender<MixerEvent>,
    event_receiver: Receiver<MixerEvent>,
}

impl<P: AudioPlatform> AudioManager<P> {
    pub fn new(desc: MixerDesc, platform: Arc<P>) -> Result<Self> {
        desc.validate()?;
        let (event_sender, event_receiver) = bounded(desc.event_capacity);
        let table = Arc::new(ChannelTable::new(desc.max_channels, event_sender.clone()));

        Ok(Self {
            desc,
            platform,
            registry: Vec::new(),
            table,
            event_sender,
            event_receiver,
        })
    }

    pub fn desc(&self) -> &MixerDesc {
        &self.desc
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Starts playing `sound` on a free hardware channel.
    ///
    /// `repeat_count < 0` repeats forever, `0` plays once and `n > 0` plays
    /// `n` additional times.
    ///
    /// # Errors
    ///
    /// - [`SoftMixError::SoundNotPlayable`] if the sound already played or is
    ///   playing.
    /// - [`SoftMixError::NoFreeChannel`] if the pool is exhausted. The request
    ///   is dropped, not queued.
    /// - Any registration or playback error from the platform. The channel is
    ///   released and the registry is left unchanged.
    pub fn play(&mut self, sound: Arc<Sound>, repeat_count: i32) -> Result<ChannelId> {
        if sound.state() != SoundState::Playing || sound.channel().is_some() {
            log::warn!(
                "Rejected play of '{}' ({}): state {:?}",
                sound.name(),
                sound.id(),
                sound.state()
            );
            return Err(SoftMixError::SoundNotPlayable(format!(
                "'{}' has already been played",
                sound.name()
            )));
        }

        let Some(channel) = self.platform.acquire_free_channel() else {
            log::warn!("No free channel for '{}'", sound.name());
            return Err(SoftMixError::NoFreeChannel);
        };

        if !sound.bind_channel(channel) {
            self.platform.release_channel(channel);
            return Err(SoftMixError::SoundNotPlayable(format!(
                "'{}' is already bound to a channel",
                sound.name()
            )));
        }

        if let Err(e) = self.start_channel(&sound, channel, repeat_count) {
            log::warn!("Failed to start '{}' on {}: {}", sound.name(), channel, e);
            self.teardown_channel(channel);
            self.release(&sound, channel);
            return Err(e);
        }

        log::info!(
            "Playing '{}' ({}) on {}, repeats {}",
            sound.name(),
            sound.id(),
            channel,
            repeat_count
        );
        self.emit(MixerEvent::SoundStarted {
            sound_id: sound.id(),
            channel,
        });
        self.registry.push(sound);

        Ok(channel)
    }

    fn start_channel(&self, sound: &Arc<Sound>, channel: ChannelId, repeat_count: i32) -> Result<()> {
        self.table.bind(channel, sound.clone())?;

        let handler: Arc<dyn ChannelHandler> = self.table.clone();
        self.platform
            .register_callback(channel, CallbackKind::GenerateAudio, handler.clone())?;
        if sound.codec_info().is_stereo() {
            self.platform
                .register_callback(channel, CallbackKind::GenerateAudioStereo, handler.clone())?;
        }
        self.platform
            .register_callback(channel, CallbackKind::SampleEnded, handler)?;

        let primer = sound.primer_samples();
        self.platform
            .play_channel(channel, &primer, primer.len(), repeat_count, None)
    }

    fn teardown_channel(&self, channel: ChannelId) {
        self.platform.stop_channel(channel);
        for kind in CallbackKind::ALL {
            self.platform.unregister_callback(channel, kind);
        }
    }

    /// Returns `channel` to the pool. Callbacks must already be unregistered.
    fn release(&self, sound: &Sound, channel: ChannelId) {
        self.table.unbind(channel);
        self.platform.release_channel(channel);
        sound.unbind_channel();
    }

    /// Requests the first still-playing sound called `name` to stop.
    ///
    /// Takes the same path as a natural end of sample: the channel is torn
    /// down by the next [`update`](Self::update). Unknown names are ignored.
    pub fn stop(&self, name: &str) {
        let Some(sound) = self
            .registry
            .iter()
            .find(|sound| sound.name() == name && sound.state() == SoundState::Playing)
        else {
            log::debug!("stop('{}'): no playing sound with that name", name);
            return;
        };

        if sound.mark_ended() {
            log::info!("Stop requested for '{}' ({})", name, sound.id());
            self.emit(MixerEvent::SoundStopRequested {
                sound_id: sound.id(),
            });
        }
    }

    /// Requests every playing sound to stop.
    pub fn stop_all(&self) {
        for sound in &self.registry {
            if sound.mark_ended() {
                self.emit(MixerEvent::SoundStopRequested {
                    sound_id: sound.id(),
                });
            }
        }
        log::info!("Stop requested for all {} active sounds", self.registry.len());
    }

    /// True while a sound called `name` is in the registry.
    pub fn is_playing(&self, name: &str) -> bool {
        self.registry
            .iter()
            .any(|sound| sound.name() == name && sound.state() != SoundState::Dead)
    }

    /// Advances the lifecycle of every active sound. Call once per frame with
    /// the time since the previous call.
    pub fn update(&mut self, elapsed: Duration) {
        let mut index = 0;
        while index < self.registry.len() {
            let sound = self.registry[index].clone();

            match sound.state() {
                SoundState::Playing => {}
                SoundState::Ending => {
                    if let Some(channel) = sound.channel() {
                        self.teardown_channel(channel);
                    }
                    sound.begin_draining(self.desc.grace_duration);
                    log::debug!("'{}' ({}) draining", sound.name(), sound.id());
                }
                SoundState::Draining => {
                    if sound.tick_keep_alive(elapsed) {
                        // the mixer is inside this sound right now
                        if sound.is_locked() {
                            log::debug!("'{}' ({}) locked, removal deferred", sound.name(), sound.id());
                        } else {
                            self.reap(&sound);
                            self.registry.remove(index);
                            continue;
                        }
                    }
                }
                SoundState::Dead => {
                    self.registry.remove(index);
                    continue;
                }
            }

            index += 1;
        }
    }

    fn reap(&self, sound: &Sound) {
        let Some(channel) = sound.channel() else {
            sound.mark_dead();
            return;
        };

        self.release(sound, channel);
        sound.mark_dead();

        log::info!("Reaped '{}' ({}), {} released", sound.name(), sound.id(), channel);
        self.emit(MixerEvent::SoundReaped {
            sound_id: sound.id(),
            channel,
        });
    }

    /// Drains every pending event.
    pub fn poll_events(&self) -> Vec<MixerEvent> {
        self.event_receiver.try_iter().collect()
    }

    /// Sounds currently in the registry, in play order.
    pub fn active_sounds(&self) -> &[Arc<Sound>] {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    fn emit(&self, event: MixerEvent) {
        if self.event_sender.try_send(event).is_err() {
            log::debug!("Event queue full, event dropped");
        }
    }
}

impl<P: AudioPlatform> Drop for AudioManager<P> {
    fn drop(&mut self) {
        for sound in std::mem::take(&mut self.registry) {
            sound.mark_ended();
            if let Some(channel) = sound.channel() {
                self.teardown_channel(channel);
                self.release(&sound, channel);
            }
            sound.mark_dead();
        }
    }
}
