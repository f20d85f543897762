//! The sound stage: a voice scheduler driven by a fixed five-phase update.
//!
//! Producers queue [`StageCommand`]s through the stage or any [`StageHandle`].
//! Once per tick the owner calls [`SoundStage::update`], which runs
//!
//! 1. hooks, giving the application a chance to adjust groups,
//! 2. listener, pushing dirty listener attributes to the device,
//! 3. events, draining queued commands through the allocation policy,
//! 4. streams, refilling streaming voices,
//! 5. voices, recomputing per-voice gain, pitch and 3D attributes.
//!
//! Each phase can also be called on its own, as long as that order is kept.
//! Voices whose sources stopped are reclaimed at the end of the events and
//! voices phases.

mod allocation;
mod handle;

pub use handle::StageHandle;

use crate::audio_data::SoundLoader;
use crate::binding::BindingIndex;
use crate::cache::BufferCache;
use crate::config::{SoundResource, SoundStageDesc};
use crate::device::{AudioDevice, DistanceModel, SourceHandle};
use crate::error::Result;
use crate::events::{ListenerId, SoundStageEvent, StageListener, StageListeners};
use crate::group::{GroupId, SoundGroups};
use crate::listener::ListenerState;
use crate::math::Vec3;
use crate::object::ObjectModel;
use crate::playback::{PlayRequest, StageCommand, StopTarget};
use crate::stream::StreamCoordinator;
use crate::voice::VoicePool;
use crossbeam_channel::{Receiver, Sender, unbounded};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Called at the start of every update, before anything else.
pub trait UpdateHook: Send {
    fn on_sound_update(&mut self, groups: &mut SoundGroups);
}

impl<F> UpdateHook for F
where
    F: FnMut(&mut SoundGroups) + Send,
{
    fn on_sound_update(&mut self, groups: &mut SoundGroups) {
        self(groups)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Time spent in each phase during its most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTimings {
    pub hooks: Duration,
    pub listener: Duration,
    pub events: Duration,
    pub streams: Duration,
    pub voices: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.hooks + self.listener + self.events + self.streams + self.voices
    }
}

pub struct SoundStage<O> {
    desc: SoundStageDesc,
    device: Arc<dyn AudioDevice>,
    loader: Arc<dyn SoundLoader>,
    model: Box<dyn ObjectModel<O>>,

    voices: VoicePool<O>,
    bindings: BindingIndex<O>,
    cache: BufferCache,
    streams: StreamCoordinator,
    listener: ListenerState,
    groups: SoundGroups,

    commands: Sender<StageCommand<O>>,
    queue: Receiver<StageCommand<O>>,
    deferred: VecDeque<PlayRequest<O>>,

    listeners: StageListeners,
    hooks: Vec<(HookId, Box<dyn UpdateHook>)>,
    next_hook_id: u64,

    rng: SmallRng,
    all_paused: bool,
    timings: PhaseTimings,
    shut_down: bool,
}

impl<O> SoundStage<O> {
    /// Creates the stage and its whole voice pool.
    ///
    /// # Errors
    ///
    /// Returns [`SoundStageError::Configuration`](crate::SoundStageError::Configuration)
    /// for an invalid descriptor and
    /// [`SoundStageError::AudioDevice`](crate::SoundStageError::AudioDevice) if the
    /// device cannot provide the requested number of sources. Sources created
    /// before the failure are destroyed.
    pub fn new(
        desc: SoundStageDesc,
        device: Arc<dyn AudioDevice>,
        loader: Arc<dyn SoundLoader>,
        model: impl ObjectModel<O> + 'static,
    ) -> Result<Self> {
        desc.validate()?;

        let mut sources: Vec<SourceHandle> = Vec::with_capacity(desc.voices);
        for _ in 0..desc.voices {
            match device.create_source() {
                Ok(source) => sources.push(source),
                Err(err) => {
                    log::error!(
                        "Could only create {} of {} voices: {}",
                        sources.len(),
                        desc.voices,
                        err
                    );
                    for source in sources {
                        device.destroy_source(source);
                    }
                    return Err(err);
                }
            }
        }

        device.set_distance_model(desc.distance_model);
        if let Some(speed) = desc.speed_of_sound {
            device.set_speed_of_sound(speed);
        }
        if let Some(factor) = desc.doppler_factor {
            device.set_doppler_factor(factor);
        }

        let rng = match desc.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let (commands, queue) = unbounded();

        log::info!(
            "Sound stage created: {} voices, {} byte cache, {:?} streaming",
            desc.voices,
            desc.cache_bytes,
            desc.stream_mode
        );

        Ok(Self {
            voices: VoicePool::new(sources),
            bindings: BindingIndex::default(),
            cache: BufferCache::new(desc.cache_bytes),
            streams: StreamCoordinator::new(desc.stream_buffer_duration, desc.stream_mode),
            listener: ListenerState::new(),
            groups: SoundGroups::new(),
            commands,
            queue,
            deferred: VecDeque::new(),
            listeners: StageListeners::new(),
            hooks: Vec::new(),
            next_hook_id: 0,
            rng,
            all_paused: false,
            timings: PhaseTimings::default(),
            shut_down: false,
            desc,
            device,
            loader,
            model: Box::new(model),
        })
    }

    pub fn desc(&self) -> &SoundStageDesc {
        &self.desc
    }

    /// A producer handle for queueing commands from other threads.
    pub fn handle(&self) -> StageHandle<O> {
        StageHandle::new(self.commands.clone())
    }

    fn submit(&self, command: StageCommand<O>) {
        // The stage holds the receiving end, so sending cannot fail.
        let _ = self.commands.send(command);
    }

    pub fn play(&self, resource: Arc<SoundResource>) {
        self.play_request(PlayRequest::new(resource));
    }

    pub fn play_in_group(&self, resource: Arc<SoundResource>, group: GroupId) {
        self.play_request(PlayRequest::new(resource).group(group));
    }

    pub fn play_on(&self, resource: Arc<SoundResource>, group: GroupId, object: O) {
        self.play_request(PlayRequest::new(resource).group(group).object(object));
    }

    pub fn play_request(&self, request: PlayRequest<O>) {
        self.submit(StageCommand::Play(request));
    }

    pub fn stop_sound(&self, resource: Arc<SoundResource>) {
        self.submit(StageCommand::Stop(StopTarget::Resource(resource)));
    }

    pub fn stop_object(&self, object: O) {
        self.submit(StageCommand::Stop(StopTarget::Object {
            object,
            channel: None,
        }));
    }

    pub fn stop_object_channel(&self, object: O, channel: u32) {
        self.submit(StageCommand::Stop(StopTarget::Object {
            object,
            channel: Some(channel),
        }));
    }

    pub fn stop_group(&self, group: GroupId) {
        self.submit(StageCommand::Stop(StopTarget::Group(group)));
    }

    pub fn stop_all(&self) {
        self.submit(StageCommand::StopAll);
    }

    pub fn pause(&self, object: O) {
        self.submit(StageCommand::Pause(Some(object)));
    }

    pub fn pause_all(&self) {
        self.submit(StageCommand::Pause(None));
    }

    pub fn resume(&self, object: O) {
        self.submit(StageCommand::Resume(Some(object)));
    }

    pub fn resume_all(&self) {
        self.submit(StageCommand::Resume(None));
    }

    pub fn precache(&self, resources: impl IntoIterator<Item = Arc<SoundResource>>) {
        for resource in resources {
            self.submit(StageCommand::Precache(resource));
        }
    }

    /// True between a processed `pause_all` and the next processed `resume_all`.
    pub fn is_paused(&self) -> bool {
        self.all_paused
    }

    pub fn add_listener(&mut self, listener: impl StageListener + 'static) -> ListenerId {
        self.listeners.add(Box::new(listener))
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn add_hook(&mut self, hook: impl UpdateHook + 'static) -> HookId {
        let id = HookId(self.next_hook_id);
        self.next_hook_id += 1;
        self.hooks.push((id, Box::new(hook)));
        id
    }

    pub fn remove_hook(&mut self, id: HookId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(hook_id, _)| *hook_id != id);
        self.hooks.len() != before
    }

    pub fn groups(&self) -> &SoundGroups {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut SoundGroups {
        &mut self.groups
    }

    pub fn listener(&self) -> &ListenerState {
        &self.listener
    }

    pub fn set_listener_gain(&mut self, gain: f32) {
        self.listener.set_gain(gain);
    }

    pub fn set_listener_position(&mut self, position: Vec3) {
        self.listener.set_position(position);
    }

    pub fn set_listener_velocity(&mut self, velocity: Vec3) {
        self.listener.set_velocity(velocity);
    }

    pub fn set_listener_up(&mut self, up: Vec3) {
        self.listener.set_up(up);
    }

    pub fn set_listener_facing(&mut self, facing: Vec3) {
        self.listener.set_facing(facing);
    }

    /// Rotates the listener orientation by Euler angles in radians, X then Y then Z.
    pub fn rotate_listener(&mut self, x: f32, y: f32, z: f32) {
        self.listener.rotate(x, y, z);
    }

    pub fn set_distance_model(&mut self, model: DistanceModel) {
        self.desc.distance_model = model;
        self.device.set_distance_model(model);
    }

    pub fn set_speed_of_sound(&mut self, speed: f32) {
        self.desc.speed_of_sound = Some(speed);
        self.device.set_speed_of_sound(speed);
    }

    pub fn set_doppler_factor(&mut self, factor: f32) {
        self.desc.doppler_factor = Some(factor);
        self.device.set_doppler_factor(factor);
    }

    pub fn voice_count(&self) -> usize {
        self.voices.total()
    }

    pub fn available_voices(&self) -> usize {
        self.voices.free_count()
    }

    pub fn used_voices(&self) -> usize {
        self.voices.used_count()
    }

    /// Voices reclaimed but not yet reset; always zero between phases.
    pub fn dead_voices(&self) -> usize {
        self.voices.dead_count()
    }

    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    pub fn active_streams(&self) -> usize {
        self.streams.active_count()
    }

    pub fn primed_streams(&self) -> usize {
        self.streams.primed_count()
    }

    /// Play requests waiting for a free voice.
    pub fn deferred_requests(&self) -> usize {
        self.deferred.len()
    }

    pub fn timings(&self) -> PhaseTimings {
        self.timings
    }

    fn fire(&mut self, event: SoundStageEvent) {
        self.listeners.fire(event);
    }

    fn fire_all(&mut self, events: Vec<SoundStageEvent>) {
        for event in events {
            self.listeners.fire(event);
        }
    }

    pub fn update_hooks(&mut self) {
        let start = Instant::now();
        for (_, hook) in self.hooks.iter_mut() {
            hook.on_sound_update(&mut self.groups);
        }
        self.timings.hooks = start.elapsed();
    }

    pub fn update_listener(&mut self) {
        let start = Instant::now();
        if !self.shut_down {
            self.listener.push(self.device.as_ref());
        }
        self.timings.listener = start.elapsed();
    }

    pub fn update_streams(&mut self) {
        let start = Instant::now();
        let events = self.streams.update(self.device.as_ref(), self.loader.as_ref());
        self.fire_all(events);
        self.timings.streams = start.elapsed();
    }

    /// Releases every device resource the stage holds. Safe to call more than once.
    ///
    /// Voices are stopped and their buffers detached first, then streams are
    /// joined and released, then the cache is emptied and finally every source
    /// is destroyed.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let voices = self.voices.drain();
        for voice in &voices {
            self.device.stop(voice.source());
            self.device.set_buffer(voice.source(), None);
        }

        let events = self.streams.shutdown(self.device.as_ref());
        self.fire_all(events);

        for entry in self.cache.destroy() {
            self.device.destroy_buffer(entry.buffer);
            self.fire(SoundStageEvent::SoundReleased {
                resource: entry.resource,
                buffer: entry.buffer,
            });
        }

        for voice in voices {
            if let Some(buffer) = voice.owned_buffer {
                self.device.destroy_buffer(buffer);
            }
            self.device.destroy_source(voice.source());
        }

        self.bindings.clear();
        self.deferred.clear();
        log::info!("Sound stage shut down");
    }
}

impl<O: Clone + Eq + Hash> SoundStage<O> {
    /// Runs all five phases in order.
    pub fn update(&mut self) {
        self.update_hooks();
        self.update_listener();
        self.update_events();
        self.update_streams();
        self.update_voices();
    }

    /// Requeues deferred plays, then drains and dispatches the command queue.
    pub fn update_events(&mut self) {
        let start = Instant::now();
        if !self.shut_down {
            while let Some(request) = self.deferred.pop_front() {
                self.submit(StageCommand::Play(request));
            }

            while let Ok(command) = self.queue.try_recv() {
                self.dispatch(command);
            }
            self.clean_up_dead_voices();
        }
        self.timings.events = start.elapsed();
    }

    /// Recomputes attributes of every playing or paused voice, then reclaims stopped ones.
    pub fn update_voices(&mut self) {
        let start = Instant::now();
        for id in self.voices.used_ids() {
            let active = self
                .voices
                .get(id)
                .is_some_and(|voice| voice.is_active(self.device.as_ref()));
            if active {
                self.update_voice(id);
            }
        }
        self.clean_up_dead_voices();
        self.timings.voices = start.elapsed();
    }

    /// Distance from the listener (or, for relative groups, from the origin) to `object`.
    pub fn distance(&self, group: GroupId, object: &O) -> f32 {
        let position = self.model.sound_pose(object).position;
        allocation::distance(&self.groups, &self.listener, group, position)
    }

    pub fn voice_count_for_sound(&self, resource: &SoundResource) -> usize {
        self.bindings.count_for_resource(resource)
    }

    pub fn voice_count_for_object(&self, object: &O) -> usize {
        self.bindings.count_for_object(object)
    }

    pub fn voice_count_for_group(&self, group: GroupId) -> usize {
        self.bindings.count_for_group(group)
    }

    /// Caches (or, for streaming resources, primes) resources immediately.
    ///
    /// Must be called from the thread that runs the update cycle.
    /// Failures are reported as error events, one per resource.
    pub fn cache_sounds(&mut self, resources: &[Arc<SoundResource>]) {
        for resource in resources {
            self.cache_sound(resource);
        }
    }
}

impl<O> Drop for SoundStage<O> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SoundStageError;
    use crate::audio_data::PcmFormat;
    use crate::mock_device::{DeviceCall, MockClip, MockDevice, MockLoader};
    use crate::object::SoundPose;

    fn stage(desc: SoundStageDesc, device: Arc<MockDevice>) -> SoundStage<u32> {
        let loader =
            MockLoader::new().with_clip("beep", MockClip::new(PcmFormat::new(8000, 1, 8), 800));
        SoundStage::new(desc, device, Arc::new(loader), |_: &u32| SoundPose::default()).unwrap()
    }

    #[test]
    fn zero_voices_fail_fast() {
        let device = Arc::new(MockDevice::new());
        let result = SoundStage::<u32>::new(
            SoundStageDesc::new().voices(0),
            device.clone(),
            Arc::new(MockLoader::new()),
            |_: &u32| SoundPose::default(),
        );
        assert!(matches!(result, Err(SoundStageError::Configuration(_))));
        assert_eq!(device.live_sources(), 0);
    }

    #[test]
    fn device_exhaustion_releases_created_sources() {
        let device = Arc::new(MockDevice::with_source_limit(3));
        let result = SoundStage::<u32>::new(
            SoundStageDesc::new().voices(4),
            device.clone(),
            Arc::new(MockLoader::new()),
            |_: &u32| SoundPose::default(),
        );
        assert!(matches!(result, Err(SoundStageError::AudioDevice(_))));
        assert_eq!(device.live_sources(), 0);
    }

    #[test]
    fn construction_pushes_device_globals() {
        let device = Arc::new(MockDevice::new());
        let desc = SoundStageDesc::new()
            .voices(2)
            .speed_of_sound(340.0)
            .distance_model(DistanceModel::LinearDistance);
        let stage = stage(desc, device.clone());
        assert_eq!(stage.voice_count(), 2);
        assert_eq!(
            device.calls(),
            vec![
                DeviceCall::DistanceModel(DistanceModel::LinearDistance),
                DeviceCall::SpeedOfSound(340.0),
            ]
        );
    }

    #[test]
    fn hooks_run_in_order_and_can_be_removed() {
        let device = Arc::new(MockDevice::new());
        let mut stage = stage(SoundStageDesc::new().voices(1), device);
        let group = stage.groups_mut().add(crate::group::SoundGroup::new());

        let first = stage.add_hook(move |groups: &mut SoundGroups| {
            if let Some(g) = groups.get_mut(group) {
                g.gain_bias = 0.5;
            }
        });
        stage.add_hook(move |groups: &mut SoundGroups| {
            if let Some(g) = groups.get_mut(group) {
                g.gain_bias *= 0.5;
            }
        });
        stage.update_hooks();
        assert_eq!(stage.groups().resolve_bias(group).0, 0.25);

        assert!(stage.remove_hook(first));
        assert!(!stage.remove_hook(first));
        stage.update_hooks();
        assert_eq!(stage.groups().resolve_bias(group).0, 0.125);
    }

    #[test]
    fn shutdown_is_idempotent_and_releases_everything() {
        let device = Arc::new(MockDevice::new());
        let mut stage = stage(SoundStageDesc::new().voices(3), device.clone());
        stage.play(Arc::new(SoundResource::new("beep")));
        stage.update();
        assert_eq!(stage.used_voices(), 1);
        assert_eq!(device.live_buffers(), 1);

        stage.shutdown();
        stage.shutdown();
        assert_eq!(device.live_sources(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(stage.voice_count(), 0);
        drop(stage);
        assert_eq!(device.live_sources(), 0);
    }

    #[test]
    fn timings_are_recorded_per_phase() {
        let device = Arc::new(MockDevice::new());
        let mut stage = stage(SoundStageDesc::new().voices(1), device);
        stage.update();
        let timings = stage.timings();
        assert_eq!(
            timings.total(),
            timings.hooks + timings.listener + timings.events + timings.streams + timings.voices
        );
    }
}
