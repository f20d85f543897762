//! Event types for SoundStage
//!
//! Every event is delivered synchronously, within the update tick that produced
//! it, to each registered [`StageListener`] in registration order.

use crate::config::SoundResource;
use crate::device::{BufferHandle, SourceHandle};
use crate::error::SoundStageError;
use crossbeam_channel::Sender;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SoundStageEvent {
    SoundCached {
        resource: Arc<SoundResource>,
        buffer: BufferHandle,
        bytes: usize,
    },
    SoundReleased {
        resource: Arc<SoundResource>,
        buffer: BufferHandle,
    },
    SoundPlayed {
        resource: Arc<SoundResource>,
    },
    SoundStopped {
        resource: Arc<SoundResource>,
    },
    StreamStarted {
        resource: Arc<SoundResource>,
    },
    StreamStopped {
        resource: Arc<SoundResource>,
    },
    SourcePlayed {
        source: SourceHandle,
    },
    SourcePaused {
        source: SourceHandle,
    },
    SourceRewound {
        source: SourceHandle,
    },
    SourceStopped {
        source: SourceHandle,
    },
    BufferEnqueued {
        source: SourceHandle,
        buffer: BufferHandle,
    },
    BufferDequeued {
        source: SourceHandle,
        buffer: BufferHandle,
    },
    UnsupportedFormat {
        resource: Arc<SoundResource>,
        error: String,
    },
    IoError {
        resource: Arc<SoundResource>,
        error: String,
    },
}

impl SoundStageEvent {
    /// Error event for a failure to decode `resource`.
    pub(crate) fn decode_failure(resource: Arc<SoundResource>, error: &SoundStageError) -> Self {
        if error.is_format_error() {
            Self::UnsupportedFormat {
                resource,
                error: error.to_string(),
            }
        } else {
            Self::IoError {
                resource,
                error: error.to_string(),
            }
        }
    }

    pub fn resource(&self) -> Option<&Arc<SoundResource>> {
        match self {
            Self::SoundCached { resource, .. }
            | Self::SoundReleased { resource, .. }
            | Self::SoundPlayed { resource }
            | Self::SoundStopped { resource }
            | Self::StreamStarted { resource }
            | Self::StreamStopped { resource }
            | Self::UnsupportedFormat { resource, .. }
            | Self::IoError { resource, .. } => Some(resource),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<SourceHandle> {
        match self {
            Self::SourcePlayed { source }
            | Self::SourcePaused { source }
            | Self::SourceRewound { source }
            | Self::SourceStopped { source }
            | Self::BufferEnqueued { source, .. }
            | Self::BufferDequeued { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. } | Self::IoError { .. }
        )
    }

    pub fn is_source_event(&self) -> bool {
        self.source().is_some()
    }
}

/// Receives stage events on the update thread.
pub trait StageListener: Send {
    fn on_event(&mut self, event: &SoundStageEvent);
}

impl<F> StageListener for F
where
    F: FnMut(&SoundStageEvent) + Send,
{
    fn on_event(&mut self, event: &SoundStageEvent) {
        self(event)
    }
}

/// Handle returned when registering a listener.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered list of subscribers that events fan out to.
#[derive(Default)]
pub struct StageListeners {
    listeners: Vec<(ListenerId, Box<dyn StageListener>)>,
    next_id: u64,
}

impl StageListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Box<dyn StageListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn fire(&mut self, event: SoundStageEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener.on_event(&event);
        }
    }
}

/// Listener that writes every event through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl StageListener for LogListener {
    fn on_event(&mut self, event: &SoundStageEvent) {
        match event {
            SoundStageEvent::SoundCached {
                resource,
                buffer,
                bytes,
            } => log::debug!("Sound cached: {} in {} ({} bytes)", resource, buffer, bytes),
            SoundStageEvent::SoundReleased { resource, buffer } => {
                log::debug!("Sound released: {} from {}", resource, buffer)
            }
            SoundStageEvent::SoundPlayed { resource } => log::debug!("Sound played: {}", resource),
            SoundStageEvent::SoundStopped { resource } => {
                log::debug!("Sound stopped: {}", resource)
            }
            SoundStageEvent::StreamStarted { resource } => {
                log::debug!("Sound stream started: {}", resource)
            }
            SoundStageEvent::StreamStopped { resource } => {
                log::debug!("Sound stream stopped: {}", resource)
            }
            SoundStageEvent::UnsupportedFormat { resource, error } => {
                log::error!("Unsupported sound resource {}: {}", resource, error)
            }
            SoundStageEvent::IoError { resource, error } => {
                log::error!("Could not read sound resource {}: {}", resource, error)
            }
            other => log::trace!("{:?}", other),
        }
    }
}

/// Listener that forwards events to a channel, for polling from another thread.
pub struct ChannelListener {
    sender: Sender<SoundStageEvent>,
}

impl ChannelListener {
    pub fn new(sender: Sender<SoundStageEvent>) -> Self {
        Self { sender }
    }
}

impl StageListener for ChannelListener {
    fn on_event(&mut self, event: &SoundStageEvent) {
        // The receiving side may have gone away; events are advisory.
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn listeners_fire_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = StageListeners::new();
        for tag in ["first", "second"] {
            let seen = seen.clone();
            listeners.add(Box::new(move |_: &SoundStageEvent| {
                seen.lock().unwrap().push(tag)
            }));
        }

        listeners.fire(SoundStageEvent::SourcePlayed {
            source: SourceHandle(1),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn removed_listeners_stop_receiving() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut listeners = StageListeners::new();
        let id = listeners.add(Box::new(ChannelListener::new(tx)));
        let resource = Arc::new(SoundResource::new("a"));

        listeners.fire(SoundStageEvent::SoundPlayed {
            resource: resource.clone(),
        });
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.fire(SoundStageEvent::SoundStopped { resource });

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], SoundStageEvent::SoundPlayed { .. }));
    }

    #[test]
    fn event_classification() {
        let resource = Arc::new(SoundResource::new("broken.xm"));
        let err = SoundStageEvent::UnsupportedFormat {
            resource: resource.clone(),
            error: "tracker".into(),
        };
        assert!(err.is_error());
        assert_eq!(err.resource(), Some(&resource));
        assert!(!err.is_source_event());

        let dequeued = SoundStageEvent::BufferDequeued {
            source: SourceHandle(2),
            buffer: BufferHandle(9),
        };
        assert_eq!(dequeued.source(), Some(SourceHandle(2)));
    }
}
