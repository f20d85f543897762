//! Double-buffered streaming of resources too large (or too long) to cache.
//!
//! A [`StreamSession`] owns exactly two device buffers and a decoder. It is
//! either primed (decoded ahead of time, not attached to any source) or
//! attached to the source of a playing voice. The [`StreamCoordinator`] keeps
//! the primed side table and the set of attached sessions, and refills them
//! either from the streams phase ([`StreamMode::Manual`]) or from one refill
//! thread per stream ([`StreamMode::Automatic`]). A stream is driven by exactly
//! one of the two, never both.

use crate::audio_data::{PcmFormat, SoundDecoder, SoundLoader};
use crate::config::{SoundResource, StreamMode};
use crate::device::{AudioDevice, BufferHandle, SourceHandle, SourceState};
use crate::error::{Result, SoundStageError};
use crate::events::SoundStageEvent;
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct StreamSession {
    resource: Arc<SoundResource>,
    decoder: Box<dyn SoundDecoder>,
    format: PcmFormat,
    chunk_duration: Duration,
    buffers: [BufferHandle; 2],
    scratch: Vec<u8>,
    source: Option<SourceHandle>,
    bytes_read: u64,
}

impl StreamSession {
    /// Opens a decoder for `resource` and loads the first two chunks into fresh buffers.
    pub fn open(
        resource: Arc<SoundResource>,
        device: &dyn AudioDevice,
        loader: &dyn SoundLoader,
        chunk_duration: Duration,
    ) -> Result<Self> {
        let mut decoder = loader.open(&resource)?;
        let format = decoder.format();
        let mut scratch = vec![0u8; format.chunk_bytes(chunk_duration)];

        let mut created = Vec::with_capacity(2);
        let mut bytes_read = 0u64;
        let loaded = (|| -> Result<()> {
            for _ in 0..2 {
                let read = decoder.read_chunk(&mut scratch)?;
                let buffer = device.create_buffer()?;
                created.push(buffer);
                device.load_buffer(buffer, format, &scratch[..read])?;
                bytes_read += read as u64;
            }
            Ok(())
        })();

        if let Err(err) = loaded {
            for buffer in created {
                device.destroy_buffer(buffer);
            }
            return Err(err);
        }

        log::debug!(
            "Opened stream for {} ({} byte chunks, {} Hz, {} ch)",
            resource,
            scratch.len(),
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            resource,
            decoder,
            format,
            chunk_duration,
            buffers: [created[0], created[1]],
            scratch,
            source: None,
            bytes_read,
        })
    }

    pub fn resource(&self) -> &Arc<SoundResource> {
        &self.resource
    }

    /// True while the session is not attached to any source.
    pub fn is_primed(&self) -> bool {
        self.source.is_none()
    }

    pub fn source(&self) -> Option<SourceHandle> {
        self.source
    }

    pub fn buffers(&self) -> [BufferHandle; 2] {
        self.buffers
    }

    /// Total PCM bytes decoded so far, across loop restarts.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Queues both buffers on `source`, replacing whatever it had queued.
    pub fn attach(
        &mut self,
        source: SourceHandle,
        device: &dyn AudioDevice,
        events: &mut Vec<SoundStageEvent>,
    ) {
        device.set_buffer(source, None);
        for buffer in self.buffers {
            device.enqueue_buffer(source, buffer);
            events.push(SoundStageEvent::BufferEnqueued { source, buffer });
        }
        self.source = Some(source);
    }

    fn reopen(&mut self, loader: &dyn SoundLoader) -> Result<()> {
        self.decoder = loader.open(&self.resource)?;
        self.format = self.decoder.format();
        self.scratch.resize(self.format.chunk_bytes(self.chunk_duration), 0);
        Ok(())
    }

    /// Refills every buffer the device has finished with. Returns the bytes loaded.
    ///
    /// At the end of the data a looping session reopens its decoder and reads
    /// once more; if that still yields nothing, or the session does not loop,
    /// the dequeued buffer is left off the queue so the source drains.
    pub fn refill(
        &mut self,
        device: &dyn AudioDevice,
        loader: &dyn SoundLoader,
        events: &mut Vec<SoundStageEvent>,
    ) -> Result<usize> {
        let Some(source) = self.source else {
            return Ok(0);
        };

        let mut loaded = 0;
        for _ in 0..device.processed_buffer_count(source) {
            let Some(buffer) = device.dequeue_buffer(source) else {
                break;
            };
            events.push(SoundStageEvent::BufferDequeued { source, buffer });

            let mut read = self.decoder.read_chunk(&mut self.scratch)?;
            if read == 0 && self.resource.looping {
                log::trace!("Restarting looping stream {}", self.resource);
                self.reopen(loader)?;
                read = self.decoder.read_chunk(&mut self.scratch)?;
            }
            if read == 0 {
                break;
            }

            device.load_buffer(buffer, self.format, &self.scratch[..read])?;
            device.enqueue_buffer(source, buffer);
            events.push(SoundStageEvent::BufferEnqueued { source, buffer });
            self.bytes_read += read as u64;
            loaded += read;
        }
        Ok(loaded)
    }

    /// Takes both buffers off the source, if attached, and destroys them.
    pub fn release(self, device: &dyn AudioDevice, events: &mut Vec<SoundStageEvent>) {
        if let Some(source) = self.source {
            device.set_buffer(source, None);
        }
        for buffer in self.buffers {
            device.destroy_buffer(buffer);
            events.push(SoundStageEvent::SoundReleased {
                resource: self.resource.clone(),
                buffer,
            });
        }
    }
}

/// A stream refilled by its own thread. Joining hands the session back.
struct Streamer {
    source: SourceHandle,
    stop: Sender<()>,
    handle: JoinHandle<StreamSession>,
}

impl Streamer {
    fn spawn(
        mut session: StreamSession,
        interval: Duration,
        device: Arc<dyn AudioDevice>,
        loader: Arc<dyn SoundLoader>,
        notices: Sender<SoundStageEvent>,
    ) -> Result<Self> {
        let source = session.source.ok_or_else(|| {
            SoundStageError::Stream("Cannot stream an unattached session".into())
        })?;
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let name = format!("soundstage-stream-{}", source.0);

        let handle = std::thread::Builder::new().name(name).spawn(move || {
            let ticker = crossbeam_channel::tick(interval);
            loop {
                let stopped = select! {
                    recv(stop_rx) -> _ => true,
                    recv(ticker) -> _ => false,
                };
                if stopped {
                    break;
                }
                match device.source_state(source) {
                    SourceState::Stopped => break,
                    // Attached but not started yet.
                    SourceState::Initial => continue,
                    SourceState::Playing | SourceState::Paused => {}
                }

                let mut events = Vec::new();
                let result = session.refill(device.as_ref(), loader.as_ref(), &mut events);
                for event in events {
                    let _ = notices.send(event);
                }
                if let Err(err) = result {
                    log::error!("Stream {} failed: {}", session.resource, err);
                    let _ = notices.send(SoundStageEvent::decode_failure(
                        session.resource.clone(),
                        &err,
                    ));
                    device.stop(source);
                    let _ = notices.send(SoundStageEvent::SourceStopped { source });
                    break;
                }
            }
            session
        })?;

        Ok(Self {
            source,
            stop,
            handle,
        })
    }

    fn join(self) -> Option<StreamSession> {
        let _ = self.stop.try_send(());
        match self.handle.join() {
            Ok(session) => Some(session),
            Err(_) => {
                log::error!("Stream thread for {} panicked", self.source);
                None
            }
        }
    }
}

/// Owner of every stream session, primed or attached.
pub struct StreamCoordinator {
    chunk_duration: Duration,
    mode: StreamMode,
    active: Vec<StreamSession>,
    streamers: Vec<Streamer>,
    primed: HashMap<Arc<SoundResource>, StreamSession>,
    notices_tx: Sender<SoundStageEvent>,
    notices_rx: Receiver<SoundStageEvent>,
}

impl StreamCoordinator {
    pub fn new(chunk_duration: Duration, mode: StreamMode) -> Self {
        let (notices_tx, notices_rx) = unbounded();
        Self {
            chunk_duration,
            mode,
            active: Vec::new(),
            streamers: Vec::new(),
            primed: HashMap::new(),
            notices_tx,
            notices_rx,
        }
    }

    /// Streams attached to a source, whichever actor refills them.
    pub fn active_count(&self) -> usize {
        self.active.len() + self.streamers.len()
    }

    pub fn primed_count(&self) -> usize {
        self.primed.len()
    }

    pub fn is_primed(&self, resource: &SoundResource) -> bool {
        self.primed.contains_key(resource)
    }

    /// Decodes the first two chunks of `resource` ahead of playback.
    ///
    /// Returns `false` if the resource was already primed.
    pub fn prime(
        &mut self,
        resource: Arc<SoundResource>,
        device: &dyn AudioDevice,
        loader: &dyn SoundLoader,
    ) -> Result<bool> {
        if self.primed.contains_key(&resource) {
            return Ok(false);
        }
        let session = StreamSession::open(resource.clone(), device, loader, self.chunk_duration)?;
        self.primed.insert(resource, session);
        Ok(true)
    }

    /// Starts streaming `resource` on `source`, consuming a primed session if there is one.
    pub fn attach(
        &mut self,
        resource: &Arc<SoundResource>,
        source: SourceHandle,
        device: &Arc<dyn AudioDevice>,
        loader: &Arc<dyn SoundLoader>,
        events: &mut Vec<SoundStageEvent>,
    ) -> Result<()> {
        let mut session = match self.primed.remove(resource) {
            Some(session) => session,
            None => StreamSession::open(
                resource.clone(),
                device.as_ref(),
                loader.as_ref(),
                self.chunk_duration,
            )?,
        };
        session.attach(source, device.as_ref(), events);
        events.push(SoundStageEvent::StreamStarted {
            resource: resource.clone(),
        });

        match self.mode {
            StreamMode::Manual => self.active.push(session),
            StreamMode::Automatic { interval } => {
                let streamer = Streamer::spawn(
                    session,
                    interval,
                    device.clone(),
                    loader.clone(),
                    self.notices_tx.clone(),
                )?;
                self.streamers.push(streamer);
            }
        }
        Ok(())
    }

    /// Ends the stream attached to `source`, if any, releasing its buffers.
    pub fn detach_source(
        &mut self,
        source: SourceHandle,
        device: &dyn AudioDevice,
        events: &mut Vec<SoundStageEvent>,
    ) {
        if let Some(index) = self.active.iter().position(|s| s.source == Some(source)) {
            let session = self.active.swap_remove(index);
            Self::finish(session, device, events);
        }
        if let Some(index) = self.streamers.iter().position(|s| s.source == source) {
            let streamer = self.streamers.swap_remove(index);
            if let Some(session) = streamer.join() {
                self.drain_notices(events);
                Self::finish(session, device, events);
            }
        }
    }

    fn finish(session: StreamSession, device: &dyn AudioDevice, events: &mut Vec<SoundStageEvent>) {
        let resource = session.resource.clone();
        session.release(device, events);
        events.push(SoundStageEvent::StreamStopped { resource });
    }

    fn drain_notices(&self, events: &mut Vec<SoundStageEvent>) {
        events.extend(self.notices_rx.try_iter());
    }

    /// The streams phase: finish streams whose source stopped, refill the rest.
    ///
    /// Automatic streams are not refilled here; only their notices are
    /// collected and their finished threads reaped.
    pub fn update(
        &mut self,
        device: &dyn AudioDevice,
        loader: &dyn SoundLoader,
    ) -> Vec<SoundStageEvent> {
        let mut events = Vec::new();

        let mut still_active = Vec::with_capacity(self.active.len());
        for mut session in self.active.drain(..) {
            let Some(source) = session.source else {
                continue;
            };
            if !device.source_state(source).is_active() {
                Self::finish(session, device, &mut events);
                continue;
            }
            if let Err(err) = session.refill(device, loader, &mut events) {
                log::error!("Stream {} failed: {}", session.resource, err);
                events.push(SoundStageEvent::decode_failure(session.resource.clone(), &err));
                device.stop(source);
                events.push(SoundStageEvent::SourceStopped { source });
            }
            still_active.push(session);
        }
        self.active = still_active;

        self.drain_notices(&mut events);
        let (finished, running): (Vec<_>, Vec<_>) = self
            .streamers
            .drain(..)
            .partition(|streamer| streamer.handle.is_finished());
        self.streamers = running;
        for streamer in finished {
            if let Some(session) = streamer.join() {
                Self::finish(session, device, &mut events);
            }
        }
        // A thread may have sent notices between the drain and its exit.
        self.drain_notices(&mut events);

        events
    }

    /// Stops every refill thread and releases all attached and primed sessions.
    pub fn shutdown(&mut self, device: &dyn AudioDevice) -> Vec<SoundStageEvent> {
        let mut events = Vec::new();
        for streamer in std::mem::take(&mut self.streamers) {
            if let Some(session) = streamer.join() {
                self.active.push(session);
            }
        }
        self.drain_notices(&mut events);
        for session in self.active.drain(..) {
            Self::finish(session, device, &mut events);
        }
        for (_, session) in self.primed.drain() {
            session.release(device, &mut events);
        }
        if !events.is_empty() {
            log::info!("Stream coordinator shut down");
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_device::{MockClip, MockDevice, MockFailure, MockLoader};

    // 1000 Hz mono 8-bit with 100 ms chunks: 100 bytes per chunk.
    fn format() -> PcmFormat {
        PcmFormat::new(1000, 1, 8)
    }

    const CHUNK: Duration = Duration::from_millis(100);

    fn setup(resource: &SoundResource, bytes: usize) -> (Arc<MockDevice>, Arc<MockLoader>) {
        let device = Arc::new(MockDevice::new());
        let loader = Arc::new(MockLoader::new().with_clip(
            resource.name.clone(),
            MockClip::new(format(), bytes),
        ));
        (device, loader)
    }

    fn start(
        coordinator: &mut StreamCoordinator,
        resource: &Arc<SoundResource>,
        device: &Arc<MockDevice>,
        loader: &Arc<MockLoader>,
    ) -> SourceHandle {
        let source = device.create_source().unwrap();
        let dyn_device: Arc<dyn AudioDevice> = device.clone();
        let dyn_loader: Arc<dyn SoundLoader> = loader.clone();
        let mut events = Vec::new();
        coordinator
            .attach(resource, source, &dyn_device, &dyn_loader, &mut events)
            .unwrap();
        assert!(matches!(
            events.last(),
            Some(SoundStageEvent::StreamStarted { .. })
        ));
        device.play(source);
        source
    }

    #[test]
    fn opening_loads_two_chunks() {
        let resource = Arc::new(SoundResource::new("music.ogg").streaming(true));
        let (device, loader) = setup(&resource, 1000);
        let session =
            StreamSession::open(resource, device.as_ref(), loader.as_ref(), CHUNK).unwrap();
        assert!(session.is_primed());
        assert_eq!(session.bytes_read(), 200);
        for buffer in session.buffers() {
            assert_eq!(device.buffer_size(buffer), 100);
        }
    }

    #[test]
    fn looping_stream_never_stalls() {
        let _ = env_logger::builder().is_test(true).try_init();
        let resource = Arc::new(SoundResource::new("loop.ogg").streaming(true).looping(true));
        let (device, loader) = setup(&resource, 150);
        let mut coordinator = StreamCoordinator::new(CHUNK, StreamMode::Manual);
        let source = start(&mut coordinator, &resource, &device, &loader);

        for _ in 0..5 {
            device.mark_processed(source, 1);
            let events = coordinator.update(device.as_ref(), loader.as_ref());
            assert!(
                events
                    .iter()
                    .any(|e| matches!(e, SoundStageEvent::BufferEnqueued { .. }))
            );
            assert_eq!(device.queued_buffers(source).len(), 2);
        }
        assert!(loader.opens("loop.ogg") >= 2);
        assert_eq!(coordinator.active_count(), 1);
    }

    #[test]
    fn non_looping_stream_drains_and_finishes() {
        let resource = Arc::new(SoundResource::new("speech.ogg").streaming(true));
        let (device, loader) = setup(&resource, 150);
        let mut coordinator = StreamCoordinator::new(CHUNK, StreamMode::Manual);
        let source = start(&mut coordinator, &resource, &device, &loader);

        device.mark_processed(source, 1);
        let _ = coordinator.update(device.as_ref(), loader.as_ref());
        assert_eq!(device.queued_buffers(source).len(), 1);

        device.finish_source(source);
        let events = coordinator.update(device.as_ref(), loader.as_ref());
        let released = events
            .iter()
            .filter(|e| matches!(e, SoundStageEvent::SoundReleased { .. }))
            .count();
        assert_eq!(released, 2);
        assert!(matches!(
            events.last(),
            Some(SoundStageEvent::StreamStopped { .. })
        ));
        assert_eq!(coordinator.active_count(), 0);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn primed_session_is_consumed_once() {
        let resource = Arc::new(SoundResource::new("intro.ogg").streaming(true));
        let (device, loader) = setup(&resource, 1000);
        let mut coordinator = StreamCoordinator::new(CHUNK, StreamMode::Manual);

        assert!(coordinator.prime(resource.clone(), device.as_ref(), loader.as_ref()).unwrap());
        assert!(!coordinator.prime(resource.clone(), device.as_ref(), loader.as_ref()).unwrap());
        assert_eq!(loader.opens("intro.ogg"), 1);

        let _ = start(&mut coordinator, &resource, &device, &loader);
        assert_eq!(loader.opens("intro.ogg"), 1);
        assert_eq!(coordinator.primed_count(), 0);
    }

    #[test]
    fn refill_errors_stop_only_that_stream() {
        let good = Arc::new(SoundResource::new("good.ogg").streaming(true));
        let bad = Arc::new(SoundResource::new("bad.ogg").streaming(true));
        let (device, loader) = setup(&good, 10_000);
        loader.insert(
            "bad.ogg",
            MockClip::new(format(), 10_000).failing(MockFailure::ReadIoAfter(2)),
        );
        let mut coordinator = StreamCoordinator::new(CHUNK, StreamMode::Manual);
        let good_source = start(&mut coordinator, &good, &device, &loader);
        let bad_source = start(&mut coordinator, &bad, &device, &loader);

        device.mark_processed(good_source, 1);
        device.mark_processed(bad_source, 1);
        let events = coordinator.update(device.as_ref(), loader.as_ref());
        assert!(events.iter().any(|e| matches!(e, SoundStageEvent::IoError { .. })));
        assert_eq!(device.source_state(bad_source), SourceState::Stopped);
        assert_eq!(device.source_state(good_source), SourceState::Playing);
        assert_eq!(device.queued_buffers(good_source).len(), 2);
    }

    #[test]
    fn shutdown_releases_primed_and_active_sessions() {
        let resource = Arc::new(SoundResource::new("amb.ogg").streaming(true));
        let other = Arc::new(SoundResource::new("wind.ogg").streaming(true));
        let (device, loader) = setup(&resource, 1000);
        loader.insert("wind.ogg", MockClip::new(format(), 1000));
        let mut coordinator = StreamCoordinator::new(CHUNK, StreamMode::Manual);
        let _ = start(&mut coordinator, &resource, &device, &loader);
        coordinator.prime(other, device.as_ref(), loader.as_ref()).unwrap();
        assert_eq!(device.live_buffers(), 4);

        let events = coordinator.shutdown(device.as_ref());
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SoundStageEvent::StreamStopped { .. }))
                .count(),
            1
        );
        assert!(coordinator.shutdown(device.as_ref()).is_empty());
    }

    #[test]
    fn automatic_streams_refill_on_their_own_thread() {
        let resource = Arc::new(SoundResource::new("auto.ogg").streaming(true).looping(true));
        let (device, loader) = setup(&resource, 150);
        let mut coordinator = StreamCoordinator::new(
            CHUNK,
            StreamMode::Automatic {
                interval: Duration::from_millis(1),
            },
        );
        let source = start(&mut coordinator, &resource, &device, &loader);
        device.mark_processed(source, 1);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while (device.processed_buffer_count(source) > 0 || device.queued_buffers(source).len() < 2)
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(device.processed_buffer_count(source), 0);
        assert_eq!(device.queued_buffers(source).len(), 2);

        device.finish_source(source);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while coordinator.active_count() > 0 && std::time::Instant::now() < deadline {
            let _ = coordinator.update(device.as_ref(), loader.as_ref());
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(coordinator.active_count(), 0);
        assert_eq!(device.live_buffers(), 0);
    }
}
