//! Which active voice serves which resource, object and group.

use crate::config::SoundResource;
use crate::group::GroupId;
use crate::voice::VoiceId;
use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

/// Multimap whose per-key values keep insertion order (oldest first).
#[derive(Debug)]
pub struct QueueMap<K, V> {
    map: HashMap<K, VecDeque<V>>,
}

impl<K, V> Default for QueueMap<K, V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V: PartialEq> QueueMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, key: K, value: V) {
        self.map.entry(key).or_default().push_back(value);
    }

    /// Removes and returns the oldest value under `key`.
    pub fn dequeue<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let queue = self.map.get_mut(key)?;
        let value = queue.pop_front();
        if queue.is_empty() {
            self.map.remove(key);
        }
        value
    }

    pub fn remove_value<Q>(&mut self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let Some(queue) = self.map.get_mut(key) else {
            return false;
        };
        let Some(index) = queue.iter().position(|v| v == value) else {
            return false;
        };
        queue.remove(index);
        if queue.is_empty() {
            self.map.remove(key);
        }
        true
    }

    pub fn get<Q>(&self, key: &Q) -> impl Iterator<Item = &V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.get(key).into_iter().flatten()
    }

    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.get(key).map_or(0, VecDeque::len)
    }
}

impl<K, V> QueueMap<K, V> {
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// The parts of a voice that decide where it is bound.
#[derive(Debug, Clone)]
pub struct BindingKeys<O> {
    pub resource: Option<Arc<SoundResource>>,
    pub object: Option<O>,
    pub group: Option<GroupId>,
}

/// Three independent multimaps from resource, object and group to voices.
///
/// All three are updated together through [`bind`](Self::bind) and
/// [`unbind`](Self::unbind) so they never diverge.
#[derive(Debug)]
pub struct BindingIndex<O> {
    by_resource: QueueMap<Arc<SoundResource>, VoiceId>,
    by_object: QueueMap<O, VoiceId>,
    by_group: QueueMap<GroupId, VoiceId>,
}

impl<O> Default for BindingIndex<O> {
    fn default() -> Self {
        Self {
            by_resource: QueueMap::default(),
            by_object: QueueMap::default(),
            by_group: QueueMap::default(),
        }
    }
}

impl<O: Eq + Hash + Clone> BindingIndex<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, voice: VoiceId, keys: &BindingKeys<O>) {
        if let Some(resource) = &keys.resource {
            self.by_resource.enqueue(resource.clone(), voice);
        }
        if let Some(object) = &keys.object {
            self.by_object.enqueue(object.clone(), voice);
        }
        if let Some(group) = keys.group {
            self.by_group.enqueue(group, voice);
        }
    }

    /// Removes every binding of `voice`. Unbinding an unbound voice is a no-op.
    pub fn unbind(&mut self, voice: VoiceId, keys: &BindingKeys<O>) {
        if let Some(resource) = &keys.resource {
            self.by_resource.remove_value(resource.as_ref(), &voice);
        }
        if let Some(object) = &keys.object {
            self.by_object.remove_value(object, &voice);
        }
        if let Some(group) = keys.group {
            self.by_group.remove_value(&group, &voice);
        }
    }

    /// Removes the oldest voice bound to `resource` from the resource map only.
    /// The caller still has to [`unbind`](Self::unbind) it from the others.
    pub fn take_oldest_for_resource(&mut self, resource: &SoundResource) -> Option<VoiceId> {
        self.by_resource.dequeue(resource)
    }

    pub fn voices_for_resource(&self, resource: &SoundResource) -> Vec<VoiceId> {
        self.by_resource.get(resource).copied().collect()
    }

    pub fn voices_for_object(&self, object: &O) -> Vec<VoiceId> {
        self.by_object.get(object).copied().collect()
    }

    pub fn voices_for_group(&self, group: GroupId) -> Vec<VoiceId> {
        self.by_group.get(&group).copied().collect()
    }

    /// Voice bound to `object` whose logical channel is `channel`, found by linear scan.
    pub fn voice_for_object_channel(
        &self,
        object: &O,
        channel: u32,
        channel_of: impl Fn(VoiceId) -> Option<u32>,
    ) -> Option<VoiceId> {
        self.by_object
            .get(object)
            .copied()
            .find(|voice| channel_of(*voice) == Some(channel))
    }

    pub fn count_for_resource(&self, resource: &SoundResource) -> usize {
        self.by_resource.count(resource)
    }

    pub fn count_for_object(&self, object: &O) -> usize {
        self.by_object.count(object)
    }

    pub fn count_for_group(&self, group: GroupId) -> usize {
        self.by_group.count(&group)
    }
}

impl<O> BindingIndex<O> {
    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty() && self.by_object.is_empty() && self.by_group.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_resource.clear();
        self.by_object.clear();
        self.by_group.clear();
    }
}
