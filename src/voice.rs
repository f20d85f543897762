//! Voices and the fixed pool they live in.
//!
//! A [`Voice`] wraps one device source for the life of the stage. The pool
//! partitions voices into free, used and dead; every voice is in exactly one
//! of those sets between update phases.

use crate::binding::BindingKeys;
use crate::config::SoundResource;
use crate::device::{AudioDevice, BufferHandle, SourceHandle, SourceState};
use crate::events::{SoundStageEvent, StageListeners};
use crate::group::GroupId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a voice. Never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    fn next() -> Self {
        Self(NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Voice({})", self.0)
    }
}

#[derive(Debug)]
pub struct Voice<O> {
    id: VoiceId,
    source: SourceHandle,
    pub(crate) resource: Option<Arc<SoundResource>>,
    pub(crate) group: Option<GroupId>,
    pub(crate) object: Option<O>,
    pub(crate) channel: Option<u32>,
    pub(crate) init_gain: f32,
    pub(crate) init_pitch: f32,
    /// Buffer too large for the cache, destroyed when the voice is reset
    pub(crate) owned_buffer: Option<BufferHandle>,
}

impl<O> Voice<O> {
    fn new(source: SourceHandle) -> Self {
        Self {
            id: VoiceId::next(),
            source,
            resource: None,
            group: None,
            object: None,
            channel: None,
            init_gain: 1.0,
            init_pitch: 1.0,
            owned_buffer: None,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn source(&self) -> SourceHandle {
        self.source
    }

    pub fn resource(&self) -> Option<&Arc<SoundResource>> {
        self.resource.as_ref()
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn object(&self) -> Option<&O> {
        self.object.as_ref()
    }

    pub fn channel(&self) -> Option<u32> {
        self.channel
    }

    pub fn init_gain(&self) -> f32 {
        self.init_gain
    }

    pub fn init_pitch(&self) -> f32 {
        self.init_pitch
    }

    pub fn is_active(&self, device: &dyn AudioDevice) -> bool {
        device.source_state(self.source).is_active()
    }

    pub(crate) fn play(&self, device: &dyn AudioDevice, listeners: &mut StageListeners) {
        device.play(self.source);
        log::debug!("{} playing on {}", self.id, self.source);
        listeners.fire(SoundStageEvent::SourcePlayed {
            source: self.source,
        });
    }

    pub(crate) fn pause(&self, device: &dyn AudioDevice, listeners: &mut StageListeners) {
        device.pause(self.source);
        listeners.fire(SoundStageEvent::SourcePaused {
            source: self.source,
        });
    }

    pub(crate) fn stop(&self, device: &dyn AudioDevice, listeners: &mut StageListeners) {
        device.stop(self.source);
        log::debug!("{} stopped on {}", self.id, self.source);
        listeners.fire(SoundStageEvent::SourceStopped {
            source: self.source,
        });
    }

    pub(crate) fn rewind(&self, device: &dyn AudioDevice, listeners: &mut StageListeners) {
        device.rewind(self.source);
        listeners.fire(SoundStageEvent::SourceRewound {
            source: self.source,
        });
    }

    /// Prepares a freshly acquired voice: stops leftovers and restores source defaults.
    pub(crate) fn prepare(&mut self, device: &dyn AudioDevice, listeners: &mut StageListeners) {
        if !matches!(
            device.source_state(self.source),
            SourceState::Stopped | SourceState::Initial
        ) {
            self.stop(device, listeners);
            if let Some(resource) = &self.resource {
                listeners.fire(SoundStageEvent::SoundStopped {
                    resource: resource.clone(),
                });
            }
        }
        device.reset_source(self.source);
        self.rewind(device, listeners);
    }

    /// Returns the voice to its unbound state: stopped, no buffer, no object.
    pub(crate) fn reset(&mut self, device: &dyn AudioDevice, listeners: &mut StageListeners) {
        self.object = None;
        self.channel = None;
        self.stop(device, listeners);
        device.set_buffer(self.source, None);
        if let Some(buffer) = self.owned_buffer.take() {
            device.destroy_buffer(buffer);
        }
        if let Some(resource) = &self.resource {
            listeners.fire(SoundStageEvent::SoundStopped {
                resource: resource.clone(),
            });
        }
    }
}

impl<O: Clone> Voice<O> {
    pub fn binding_keys(&self) -> BindingKeys<O> {
        BindingKeys {
            resource: self.resource.clone(),
            object: self.object.clone(),
            group: self.group,
        }
    }
}

/// Fixed-size set of voices partitioned into free, used and dead.
#[derive(Debug)]
pub struct VoicePool<O> {
    voices: HashMap<VoiceId, Voice<O>>,
    free: VecDeque<VoiceId>,
    used: VecDeque<VoiceId>,
    dead: Vec<VoiceId>,
}

impl<O> VoicePool<O> {
    /// Creates one voice per source. Sources are owned by the pool from here on.
    pub fn new(sources: impl IntoIterator<Item = SourceHandle>) -> Self {
        let mut voices = HashMap::new();
        let mut free = VecDeque::new();
        for source in sources {
            let voice = Voice::new(source);
            free.push_back(voice.id);
            voices.insert(voice.id, voice);
        }
        Self {
            voices,
            free,
            used: VecDeque::new(),
            dead: Vec::new(),
        }
    }

    /// Pops a free voice. Never blocks; `None` when every voice is busy.
    ///
    /// The voice belongs to no set until it is [`commit`](Self::commit)ted or
    /// [`release`](Self::release)d.
    pub fn acquire(&mut self) -> Option<VoiceId> {
        self.free.pop_front()
    }

    /// Marks an acquired voice as used.
    pub fn commit(&mut self, id: VoiceId) {
        self.used.push_back(id);
    }

    /// Hands an acquired voice straight back to the free set.
    pub fn release(&mut self, id: VoiceId) {
        self.free.push_back(id);
    }

    /// Moves every used voice matching `is_dead` to the dead set, keeping order.
    pub fn mark_dead(&mut self, mut is_dead: impl FnMut(&Voice<O>) -> bool) -> &[VoiceId] {
        let voices = &self.voices;
        let mut still_used = VecDeque::with_capacity(self.used.len());
        for id in self.used.drain(..) {
            match voices.get(&id) {
                Some(voice) if is_dead(voice) => self.dead.push(id),
                _ => still_used.push_back(id),
            }
        }
        self.used = still_used;
        &self.dead
    }

    /// Empties the dead set, returning its voices for reset; they are free afterwards.
    pub fn reclaim_dead(&mut self) -> Vec<VoiceId> {
        let dead = std::mem::take(&mut self.dead);
        self.free.extend(dead.iter().copied());
        dead
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice<O>> {
        self.voices.get(&id)
    }

    pub fn get_mut(&mut self, id: VoiceId) -> Option<&mut Voice<O>> {
        self.voices.get_mut(&id)
    }

    pub fn used_ids(&self) -> Vec<VoiceId> {
        self.used.iter().copied().collect()
    }

    pub fn total(&self) -> usize {
        self.voices.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    pub fn dead_count(&self) -> usize {
        self.dead.len()
    }

    /// Removes every voice, handing them back for their sources to be destroyed.
    pub fn drain(&mut self) -> Vec<Voice<O>> {
        self.free.clear();
        self.used.clear();
        self.dead.clear();
        self.voices.drain().map(|(_, voice)| voice).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: u32) -> VoicePool<u32> {
        VoicePool::new((0..n).map(SourceHandle))
    }

    fn assert_partitioned(pool: &VoicePool<u32>) {
        assert_eq!(
            pool.free_count() + pool.used_count() + pool.dead_count(),
            pool.total()
        );
    }

    #[test]
    fn voice_ids_are_unique_across_pools() {
        let mut a = pool(2);
        let mut b = pool(2);
        let mut ids: Vec<_> = a.drain().into_iter().chain(b.drain()).map(|v| v.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn acquire_until_empty() {
        let mut pool = pool(2);
        let first = pool.acquire().unwrap();
        pool.commit(first);
        let second = pool.acquire().unwrap();
        pool.commit(second);
        assert!(pool.acquire().is_none());
        assert_partitioned(&pool);
        assert_eq!(pool.used_ids(), vec![first, second]);
    }

    #[test]
    fn dead_voices_return_to_free() {
        let mut pool = pool(3);
        let ids: Vec<_> = (0..3)
            .map(|_| {
                let id = pool.acquire().unwrap();
                pool.commit(id);
                id
            })
            .collect();

        let dead = pool.mark_dead(|voice| voice.source() != SourceHandle(1)).to_vec();
        assert_eq!(dead, vec![ids[0], ids[2]]);
        assert_partitioned(&pool);

        let reclaimed = pool.reclaim_dead();
        assert_eq!(reclaimed.len(), 2);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.used_ids(), vec![ids[1]]);
        assert_partitioned(&pool);
    }

    #[test]
    fn released_voice_is_free_again() {
        let mut pool = pool(1);
        let id = pool.acquire().unwrap();
        pool.release(id);
        assert_eq!(pool.free_count(), 1);
        assert_partitioned(&pool);
    }
}
