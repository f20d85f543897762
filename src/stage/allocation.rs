use super::SoundStage;
use crate::audio_data::decode_to_end;
use crate::cache::{CacheEntry, CacheInsert};
use crate::config::{NoPanMode, SoundResource};
use crate::device::{BufferHandle, SourceCone, SourceState};
use crate::error::Result;
use crate::events::SoundStageEvent;
use crate::group::{GroupId, SoundGroups};
use crate::listener::ListenerState;
use crate::math::Vec3;
use crate::playback::{PlayRequest, StageCommand, StopTarget};
use crate::voice::{Voice, VoiceId};
use rand::Rng;
use std::hash::Hash;
use std::sync::Arc;

/// Distance from the listener to `position`, or from the origin for relative groups.
pub(super) fn distance(
    groups: &SoundGroups,
    listener: &ListenerState,
    group: GroupId,
    position: Vec3,
) -> f32 {
    if groups.is_relative(group) {
        position.length()
    } else {
        position.distance(listener.position())
    }
}

fn vary(rng: &mut impl Rng, base: f32, variance: f32) -> f32 {
    if variance > 0.0 {
        base + rng.gen_range(-variance..=variance)
    } else {
        base
    }
}

/// Where a freshly loaded static buffer ended up.
enum Loaded {
    Cached(BufferHandle),
    /// Too large for the cache; whoever asked for it owns it.
    Uncached(BufferHandle),
}

impl<O: Clone + Eq + Hash> SoundStage<O> {
    pub(super) fn dispatch(&mut self, command: StageCommand<O>) {
        match command {
            StageCommand::Play(request) => {
                if let Some(request) = self.handle_play(request) {
                    self.deferred.push_back(request);
                }
            }
            StageCommand::Stop(target) => self.handle_stop(target),
            StageCommand::StopAll => self.handle_stop(StopTarget::All),
            StageCommand::Pause(object) => self.handle_pause(object),
            StageCommand::Resume(object) => self.handle_resume(object),
            StageCommand::Precache(resource) => self.cache_sound(&resource),
        }
    }

    /// Returns the request back if it must be retried on a later tick.
    fn handle_play(&mut self, request: PlayRequest<O>) -> Option<PlayRequest<O>> {
        if !self.admit(&request) {
            return None;
        }

        let Some(id) = self.voices.acquire() else {
            if request.resource.must_be_played {
                log::debug!("No free voice for {}, deferring", request.resource);
                return Some(request);
            }
            log::warn!("No free voice for {}, dropping request", request.resource);
            return None;
        };

        if let Err(err) = self.load_voice(id, &request.resource) {
            log::error!("Could not play {}: {}", request.resource, err);
            self.voices.release(id);
            self.fire(SoundStageEvent::decode_failure(request.resource.clone(), &err));
            return None;
        }

        self.initialize_voice(id, &request);
        let Some(voice) = self.voices.get(id) else {
            return None;
        };
        self.bindings.bind(id, &voice.binding_keys());
        voice.play(self.device.as_ref(), &mut self.listeners);
        self.voices.commit(id);
        self.fire(SoundStageEvent::SoundPlayed {
            resource: request.resource,
        });
        None
    }

    /// Applies distance culling, resource and group limits and object channel
    /// preemption, in that order. Returns whether the request may take a voice.
    ///
    /// Preempted voices are only told to stop; they become free on the next
    /// cleanup, so the request that displaced them can still find no free voice.
    fn admit(&mut self, request: &PlayRequest<O>) -> bool {
        let resource = &request.resource;

        if let (Some(group), Some(object)) = (request.group, &request.object) {
            if resource.rolloff != 0.0 {
                let position = self.model.sound_pose(object).position;
                let distance = distance(&self.groups, &self.listener, group, position);
                if distance > resource.max_attenuation_distance {
                    log::trace!("{} culled at distance {}", resource, distance);
                    return false;
                }
            }
        }

        if resource.limit > 0 && self.bindings.count_for_resource(resource) >= resource.limit {
            if !resource.stops_oldest {
                log::debug!("{} reached its limit of {}", resource, resource.limit);
                return false;
            }
            if let Some(oldest) = self.bindings.take_oldest_for_resource(resource) {
                self.preempt(oldest);
            }
            return true;
        }

        if let Some(group) = request.group {
            let cap = self.groups.max_voices(group);
            if cap > 0 && self.bindings.count_for_group(group) >= cap {
                log::debug!("{} is full, dropping {}", group, resource);
                return false;
            }
        }

        if let Some(object) = &request.object {
            let voices = &self.voices;
            let existing = self
                .bindings
                .voice_for_object_channel(object, request.channel, |id| {
                    voices.get(id).and_then(Voice::channel)
                });
            if let Some(existing) = existing {
                let priority = voices
                    .get(existing)
                    .and_then(Voice::resource)
                    .map_or(f32::MIN, |r| r.priority);
                if priority <= resource.priority {
                    self.preempt(existing);
                }
            }
        }

        true
    }

    /// Unbinds a voice and stops its source. Reclaimed on the next cleanup.
    fn preempt(&mut self, id: VoiceId) {
        let Some(voice) = self.voices.get(id) else {
            return;
        };
        log::debug!("Preempting {}", id);
        self.bindings.unbind(id, &voice.binding_keys());
        voice.stop(self.device.as_ref(), &mut self.listeners);
    }

    /// Prepares an acquired voice and attaches the resource's audio to it.
    fn load_voice(&mut self, id: VoiceId, resource: &Arc<SoundResource>) -> Result<()> {
        let Some(voice) = self.voices.get_mut(id) else {
            return Ok(());
        };
        voice.prepare(self.device.as_ref(), &mut self.listeners);
        let source = voice.source();

        if resource.streaming {
            let mut events = Vec::new();
            let attached = self.streams.attach(
                resource,
                source,
                &self.device,
                &self.loader,
                &mut events,
            );
            self.fire_all(events);
            return attached;
        }

        let buffer = match self.cache.get_buffer(resource) {
            Some(buffer) => buffer,
            None => match self.load_static(resource)? {
                Loaded::Cached(buffer) => buffer,
                Loaded::Uncached(buffer) => {
                    if let Some(voice) = self.voices.get_mut(id) {
                        voice.owned_buffer = Some(buffer);
                    }
                    buffer
                }
            },
        };
        self.device.set_buffer(source, Some(buffer));
        Ok(())
    }

    /// Decodes a whole resource into a new device buffer and offers it to the cache.
    fn load_static(&mut self, resource: &Arc<SoundResource>) -> Result<Loaded> {
        let mut decoder = self.loader.open(resource)?;
        let format = decoder.format();
        let data = decode_to_end(
            decoder.as_mut(),
            format.chunk_bytes(self.desc.stream_buffer_duration),
        )?;

        let buffer = self.device.create_buffer()?;
        if let Err(err) = self.device.load_buffer(buffer, format, &data) {
            self.device.destroy_buffer(buffer);
            return Err(err);
        }

        match self.cache.add_buffer(resource.clone(), buffer, data.len()) {
            CacheInsert::Cached { evicted } => {
                for entry in evicted {
                    self.release_cached(entry);
                }
                self.fire(SoundStageEvent::SoundCached {
                    resource: resource.clone(),
                    buffer,
                    bytes: data.len(),
                });
                Ok(Loaded::Cached(buffer))
            }
            CacheInsert::AlreadyCached => {
                self.device.destroy_buffer(buffer);
                match self.cache.get_buffer(resource) {
                    Some(existing) => Ok(Loaded::Cached(existing)),
                    None => Ok(Loaded::Uncached(buffer)),
                }
            }
            CacheInsert::TooLarge => Ok(Loaded::Uncached(buffer)),
        }
    }

    fn release_cached(&mut self, entry: CacheEntry) {
        log::debug!("Evicting {} ({} bytes)", entry.resource, entry.bytes);
        self.device.destroy_buffer(entry.buffer);
        self.fire(SoundStageEvent::SoundReleased {
            resource: entry.resource,
            buffer: entry.buffer,
        });
    }

    pub(super) fn cache_sound(&mut self, resource: &Arc<SoundResource>) {
        let result = if resource.streaming {
            self.streams
                .prime(resource.clone(), self.device.as_ref(), self.loader.as_ref())
                .map(|_| ())
        } else if self.cache.contains(resource) {
            Ok(())
        } else {
            self.load_static(resource).map(|loaded| {
                if let Loaded::Uncached(buffer) = loaded {
                    log::warn!("{} does not fit in the cache, not precaching", resource);
                    self.device.destroy_buffer(buffer);
                }
            })
        };

        if let Err(err) = result {
            log::error!("Could not cache {}: {}", resource, err);
            self.fire(SoundStageEvent::decode_failure(resource.clone(), &err));
        }
    }

    fn initialize_voice(&mut self, id: VoiceId, request: &PlayRequest<O>) {
        let resource = &request.resource;
        let init_gain = vary(
            &mut self.rng,
            resource.init_gain * request.gain,
            resource.gain_variance,
        );
        let init_pitch = vary(
            &mut self.rng,
            resource.init_pitch * request.pitch,
            resource.pitch_variance,
        );
        let relative = request
            .group
            .is_none_or(|group| self.groups.is_relative(group));

        let Some(voice) = self.voices.get_mut(id) else {
            return;
        };
        voice.resource = Some(resource.clone());
        voice.group = request.group;
        voice.channel = request.object.as_ref().map(|_| request.channel);
        voice.object = request.object.clone();
        voice.init_gain = init_gain;
        voice.init_pitch = init_pitch;

        let device = self.device.as_ref();
        let source = voice.source();
        device.set_looping(source, !resource.streaming && resource.looping);
        device.set_position(source, Vec3::ZERO);
        device.set_velocity(source, Vec3::ZERO);
        device.set_direction(source, Vec3::ZERO);
        device.set_relative(source, relative);
        device.set_rolloff(source, resource.rolloff);
        device.set_reference_distance(source, resource.attenuation_distance);
        device.set_max_distance(source, resource.max_attenuation_distance);
        device.set_cone(
            source,
            SourceCone {
                inner_angle: resource.inner_cone_angle,
                outer_angle: resource.outer_cone_angle,
                outer_gain: resource.outer_cone_gain,
            },
        );

        self.update_voice(id);
    }

    /// Pushes gain, pitch and (for grouped object sounds) 3D attributes to the device.
    pub(super) fn update_voice(&mut self, id: VoiceId) {
        let Some(voice) = self.voices.get(id) else {
            return;
        };
        let Some(resource) = voice.resource() else {
            return;
        };
        let device = self.device.as_ref();
        let source = voice.source();

        let mut gain = voice.init_gain();
        let mut pitch = voice.init_pitch();

        if let Some(group) = voice.group() {
            let (gain_bias, pitch_bias) = self.groups.resolve_bias(group);
            gain *= gain_bias;
            pitch *= pitch_bias;

            if let Some(object) = voice.object() {
                let pose = self.model.sound_pose(object);
                let distance = distance(&self.groups, &self.listener, group, pose.position);

                let position = if !resource.not_panned && distance > resource.panning_deadzone {
                    pose.position
                } else {
                    match self.desc.no_pan_mode {
                        NoPanMode::Listener => self.listener.position(),
                        NoPanMode::ListenerFront => {
                            self.listener.position() + self.listener.facing()
                        }
                    }
                };
                device.set_position(source, position);

                if !resource.not_doppled {
                    device.set_velocity(source, pose.velocity);
                }
                if !resource.not_directed {
                    device.set_direction(source, pose.direction);
                }
            }
        }

        device.set_gain(source, gain);
        device.set_pitch(source, pitch);
    }

    /// Stops the targeted voices. They are reclaimed on the next cleanup.
    fn handle_stop(&mut self, target: StopTarget<O>) {
        let ids = match target {
            StopTarget::Group(group) => self.bindings.voices_for_group(group),
            StopTarget::Resource(resource) => self.bindings.voices_for_resource(&resource),
            StopTarget::Object { object, channel } => {
                let voices = &self.voices;
                let on_channel = channel.and_then(|channel| {
                    self.bindings
                        .voice_for_object_channel(&object, channel, |id| {
                            voices.get(id).and_then(Voice::channel)
                        })
                });
                match on_channel {
                    Some(id) => vec![id],
                    None => self.bindings.voices_for_object(&object),
                }
            }
            StopTarget::All => self.voices.used_ids(),
        };

        for id in ids {
            if let Some(voice) = self.voices.get(id) {
                voice.stop(self.device.as_ref(), &mut self.listeners);
            }
        }
    }

    fn handle_pause(&mut self, object: Option<O>) {
        let ids = match object {
            Some(object) => self.bindings.voices_for_object(&object),
            None if !self.all_paused => {
                self.all_paused = true;
                self.voices.used_ids()
            }
            None => return,
        };
        for id in ids {
            if let Some(voice) = self.voices.get(id) {
                voice.pause(self.device.as_ref(), &mut self.listeners);
            }
        }
    }

    fn handle_resume(&mut self, object: Option<O>) {
        let ids = match object {
            Some(object) => self.bindings.voices_for_object(&object),
            None if self.all_paused => {
                self.all_paused = false;
                self.voices.used_ids()
            }
            None => return,
        };
        for id in ids {
            if let Some(voice) = self.voices.get(id) {
                if self.device.source_state(voice.source()) == SourceState::Paused {
                    voice.play(self.device.as_ref(), &mut self.listeners);
                }
            }
        }
    }

    /// Moves every used voice whose source is neither playing nor paused back
    /// to the free set, unbinding and resetting it on the way.
    ///
    /// A stream on the voice is ended before the reset, so its refill thread
    /// (if any) has exited before anything else touches the buffer queue.
    pub(super) fn clean_up_dead_voices(&mut self) {
        let device = self.device.as_ref();
        if self
            .voices
            .mark_dead(|voice| !voice.is_active(device))
            .is_empty()
        {
            return;
        }
        for id in self.voices.reclaim_dead() {
            let Some(voice) = self.voices.get_mut(id) else {
                continue;
            };
            let mut events = Vec::new();
            self.streams.detach_source(voice.source(), self.device.as_ref(), &mut events);
            for event in events {
                self.listeners.fire(event);
            }
            self.bindings.unbind(id, &voice.binding_keys());
            voice.reset(self.device.as_ref(), &mut self.listeners);
        }
    }
}
