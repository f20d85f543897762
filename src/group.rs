//! Sound groups: named gain/pitch bias scopes with voice caps.
//!
//! Groups form a tree. A child's effective bias is its own bias multiplied by
//! every ancestor's, and a child is listener-relative if it or any ancestor is.
//! Parent links are plain [`GroupId`]s into the [`SoundGroups`] arena, so no
//! group owns another.

use std::collections::HashMap;

/// Handle to a group registered in [`SoundGroups`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(u32);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundGroup {
    pub gain_bias: f32,
    pub pitch_bias: f32,
    /// Sounds in this group are positioned relative to the listener
    pub relative: bool,
    /// Maximum concurrent voices in this group (0 = uncapped)
    pub max_voices: usize,
    parent: Option<GroupId>,
}

impl Default for SoundGroup {
    fn default() -> Self {
        Self {
            gain_bias: 1.0,
            pitch_bias: 1.0,
            relative: false,
            max_voices: 0,
            parent: None,
        }
    }
}

impl SoundGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain_bias(mut self, bias: f32) -> Self {
        self.gain_bias = bias;
        self
    }

    pub fn pitch_bias(mut self, bias: f32) -> Self {
        self.pitch_bias = bias;
        self
    }

    pub fn relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn max_voices(mut self, max: usize) -> Self {
        self.max_voices = max;
        self
    }

    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }
}

/// Arena of sound groups owned by a stage.
#[derive(Debug, Default)]
pub struct SoundGroups {
    groups: HashMap<GroupId, SoundGroup>,
    next_id: u32,
}

impl SoundGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a top-level group.
    pub fn add(&mut self, group: SoundGroup) -> GroupId {
        self.insert(SoundGroup {
            parent: None,
            ..group
        })
    }

    /// Registers a group under `parent`. Returns `None` if the parent is unknown.
    pub fn add_child(&mut self, parent: GroupId, group: SoundGroup) -> Option<GroupId> {
        if !self.groups.contains_key(&parent) {
            return None;
        }
        Some(self.insert(SoundGroup {
            parent: Some(parent),
            ..group
        }))
    }

    fn insert(&mut self, group: SoundGroup) -> GroupId {
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.groups.insert(id, group);
        id
    }

    /// Removes a group. Its children are re-parented to its own parent.
    pub fn remove(&mut self, id: GroupId) -> Option<SoundGroup> {
        let removed = self.groups.remove(&id)?;
        for group in self.groups.values_mut() {
            if group.parent == Some(id) {
                group.parent = removed.parent;
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: GroupId) -> Option<&SoundGroup> {
        self.groups.get(&id)
    }

    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut SoundGroup> {
        self.groups.get_mut(&id)
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn ancestry(&self, id: GroupId) -> impl Iterator<Item = &SoundGroup> + '_ {
        // Parent links only ever point at groups created earlier, so this terminates.
        std::iter::successors(self.groups.get(&id), move |group| {
            group.parent.and_then(|parent| self.groups.get(&parent))
        })
    }

    /// Effective (gain, pitch) bias of a group; (1, 1) for an unknown group.
    pub fn resolve_bias(&self, id: GroupId) -> (f32, f32) {
        self.ancestry(id).fold((1.0, 1.0), |(gain, pitch), group| {
            (gain * group.gain_bias, pitch * group.pitch_bias)
        })
    }

    /// True if the group or any of its ancestors is listener-relative.
    pub fn is_relative(&self, id: GroupId) -> bool {
        self.ancestry(id).any(|group| group.relative)
    }

    /// The group's own voice cap (0 = uncapped).
    pub fn max_voices(&self, id: GroupId) -> usize {
        self.groups.get(&id).map_or(0, |group| group.max_voices)
    }
}
