use crate::config::SoundResource;
use crate::error::{Result, SoundStageError};
use crate::group::GroupId;
use crate::playback::{PlayRequest, StageCommand, StopTarget};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Cloneable producer side of a [`SoundStage`](super::SoundStage)'s command queue.
///
/// Every method only appends a command; nothing happens until the stage runs
/// its events phase. Handles can be sent to and used from any thread.
///
/// # Errors
///
/// All methods return [`SoundStageError::QueueClosed`] once the stage has been dropped.
pub struct StageHandle<O> {
    sender: Sender<StageCommand<O>>,
}

impl<O> Clone for StageHandle<O> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<O> StageHandle<O> {
    pub(crate) fn new(sender: Sender<StageCommand<O>>) -> Self {
        Self { sender }
    }

    pub fn submit(&self, command: StageCommand<O>) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| SoundStageError::QueueClosed)
    }

    /// Plays a resource with no group or object, relative to the listener.
    pub fn play(&self, resource: Arc<SoundResource>) -> Result<()> {
        self.play_request(PlayRequest::new(resource))
    }

    pub fn play_in_group(&self, resource: Arc<SoundResource>, group: GroupId) -> Result<()> {
        self.play_request(PlayRequest::new(resource).group(group))
    }

    /// Plays a resource on channel 0 of `object` within `group`.
    pub fn play_on(&self, resource: Arc<SoundResource>, group: GroupId, object: O) -> Result<()> {
        self.play_request(PlayRequest::new(resource).group(group).object(object))
    }

    pub fn play_request(&self, request: PlayRequest<O>) -> Result<()> {
        self.submit(StageCommand::Play(request))
    }

    pub fn stop_sound(&self, resource: Arc<SoundResource>) -> Result<()> {
        self.submit(StageCommand::Stop(StopTarget::Resource(resource)))
    }

    pub fn stop_object(&self, object: O) -> Result<()> {
        self.submit(StageCommand::Stop(StopTarget::Object {
            object,
            channel: None,
        }))
    }

    pub fn stop_object_channel(&self, object: O, channel: u32) -> Result<()> {
        self.submit(StageCommand::Stop(StopTarget::Object {
            object,
            channel: Some(channel),
        }))
    }

    pub fn stop_group(&self, group: GroupId) -> Result<()> {
        self.submit(StageCommand::Stop(StopTarget::Group(group)))
    }

    pub fn stop_all(&self) -> Result<()> {
        self.submit(StageCommand::StopAll)
    }

    pub fn pause(&self, object: O) -> Result<()> {
        self.submit(StageCommand::Pause(Some(object)))
    }

    pub fn pause_all(&self) -> Result<()> {
        self.submit(StageCommand::Pause(None))
    }

    pub fn resume(&self, object: O) -> Result<()> {
        self.submit(StageCommand::Resume(Some(object)))
    }

    pub fn resume_all(&self) -> Result<()> {
        self.submit(StageCommand::Resume(None))
    }

    /// Queues resources to be cached (or primed, if streaming) on the next events phase.
    pub fn precache(&self, resources: impl IntoIterator<Item = Arc<SoundResource>>) -> Result<()> {
        for resource in resources {
            self.submit(StageCommand::Precache(resource))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_arrive_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = StageHandle::<u32>::new(tx);
        let other = handle.clone();
        let resource = Arc::new(SoundResource::new("a.wav"));

        handle.play(resource.clone()).unwrap();
        other.stop_object_channel(4, 2).unwrap();
        handle.pause_all().unwrap();

        let commands: Vec<_> = rx.try_iter().collect();
        assert!(matches!(
            &commands[0],
            StageCommand::Play(r) if r.resource == resource && r.channel == 0
        ));
        assert!(matches!(
            &commands[1],
            StageCommand::Stop(StopTarget::Object { object: 4, channel: Some(2) })
        ));
        assert!(matches!(&commands[2], StageCommand::Pause(None)));
    }

    #[test]
    fn closed_queue_is_reported() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = StageHandle::<u32>::new(tx);
        drop(rx);
        assert!(matches!(handle.stop_all(), Err(SoundStageError::QueueClosed)));
    }
}
