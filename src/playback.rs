use crate::config::SoundResource;
use crate::group::GroupId;
use std::sync::Arc;

/// A request to play one resource, optionally bound to a group and an object channel.
#[derive(Debug, Clone)]
pub struct PlayRequest<O> {
    pub resource: Arc<SoundResource>,
    pub group: Option<GroupId>,
    pub object: Option<O>,
    /// Logical channel on the object; one voice per object channel
    pub channel: u32,
    /// Gain multiplier applied on top of the resource's initial gain
    pub gain: f32,
    /// Pitch multiplier applied on top of the resource's initial pitch
    pub pitch: f32,
}

impl<O> PlayRequest<O> {
    pub fn new(resource: Arc<SoundResource>) -> Self {
        Self {
            resource,
            group: None,
            object: None,
            channel: 0,
            gain: 1.0,
            pitch: 1.0,
        }
    }

    pub fn group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    pub fn object(mut self, object: O) -> Self {
        self.object = Some(object);
        self
    }

    pub fn channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }
}

/// Which voices a stop command applies to.
#[derive(Debug, Clone)]
pub enum StopTarget<O> {
    Group(GroupId),
    Resource(Arc<SoundResource>),
    /// A single object channel, or every voice of the object when `channel` is `None`
    Object { object: O, channel: Option<u32> },
    All,
}

/// Commands that can be sent to the sound stage.
///
/// Commands are queued by producers and consumed in FIFO order by the events
/// phase of the update cycle. Only `Play` can outlive the tick it is processed
/// in, when a must-be-played resource finds no free voice.
#[derive(Debug, Clone)]
pub enum StageCommand<O> {
    Play(PlayRequest<O>),
    Stop(StopTarget<O>),
    /// Stops every used voice
    StopAll,
    /// Pauses one object's voices, or everything when `None`
    Pause(Option<O>),
    /// Resumes one object's voices, or everything when `None`
    Resume(Option<O>),
    Precache(Arc<SoundResource>),
}
