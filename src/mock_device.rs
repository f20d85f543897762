//! In-memory device and loader for tests and headless use.
//!
//! [`MockDevice`] keeps every source and buffer in a mutex-protected table and
//! models the parts of a real device the stage relies on: play/pause/stop
//! state, static buffers, buffer queues with a processed count, and listener
//! attributes. Tests drive playback forward explicitly with
//! [`finish_source`](MockDevice::finish_source) and
//! [`mark_processed`](MockDevice::mark_processed).

use crate::audio_data::{PcmFormat, SoundDecoder, SoundLoader};
use crate::config::SoundResource;
use crate::device::{
    AudioDevice, BufferHandle, DistanceModel, SourceCone, SourceHandle, SourceState,
};
use crate::error::{Result, SoundStageError};
use crate::math::Vec3;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Listener and global calls, recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    ListenerGain(f32),
    ListenerOrientation { facing: Vec3, up: Vec3 },
    ListenerPosition(Vec3),
    ListenerVelocity(Vec3),
    DistanceModel(DistanceModel),
    SpeedOfSound(f32),
    DopplerFactor(f32),
}

impl DeviceCall {
    fn is_listener_call(&self) -> bool {
        matches!(
            self,
            Self::ListenerGain(_)
                | Self::ListenerOrientation { .. }
                | Self::ListenerPosition(_)
                | Self::ListenerVelocity(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockSource {
    pub state: SourceState,
    pub looping: bool,
    pub relative: bool,
    pub position: Vec3,
    pub velocity: Vec3,
    pub direction: Vec3,
    pub gain: f32,
    pub pitch: f32,
    pub rolloff: f32,
    pub reference_distance: f32,
    pub max_distance: f32,
    pub cone: Option<SourceCone>,
    pub buffer: Option<BufferHandle>,
    pub queue: VecDeque<BufferHandle>,
    pub processed: usize,
}

impl Default for MockSource {
    fn default() -> Self {
        Self {
            state: SourceState::Initial,
            looping: false,
            relative: false,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::ZERO,
            gain: 1.0,
            pitch: 1.0,
            rolloff: 1.0,
            reference_distance: 1.0,
            max_distance: f32::MAX,
            cone: None,
            buffer: None,
            queue: VecDeque::new(),
            processed: 0,
        }
    }
}

impl MockSource {
    fn reset_parameters(&mut self) {
        let buffer = self.buffer.take();
        let queue = std::mem::take(&mut self.queue);
        let processed = self.processed;
        let state = self.state;
        *self = Self {
            state,
            buffer,
            queue,
            processed,
            ..Default::default()
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockBuffer {
    pub format: Option<PcmFormat>,
    pub bytes: usize,
    pub loads: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockListener {
    pub gain: f32,
    pub facing: Vec3,
    pub up: Vec3,
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Default for MockListener {
    fn default() -> Self {
        Self {
            gain: 1.0,
            facing: Vec3::NEG_Z,
            up: Vec3::Y,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u32,
    sources: HashMap<SourceHandle, MockSource>,
    buffers: HashMap<BufferHandle, MockBuffer>,
    listener: MockListener,
    calls: Vec<DeviceCall>,
    source_limit: Option<usize>,
    sources_created: usize,
}

impl MockState {
    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// A Send + Sync in-memory [`AudioDevice`].
#[derive(Debug, Default)]
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that fails after creating `limit` sources.
    pub fn with_source_limit(limit: usize) -> Self {
        let device = Self::default();
        device.state.lock().unwrap().source_limit = Some(limit);
        device
    }

    fn with_source<R>(
        &self,
        source: SourceHandle,
        f: impl FnOnce(&mut MockSource) -> R,
    ) -> Option<R> {
        self.state.lock().unwrap().sources.get_mut(&source).map(f)
    }

    /// Simulates a source reaching the end of its data.
    pub fn finish_source(&self, source: SourceHandle) {
        self.with_source(source, |s| {
            s.state = SourceState::Stopped;
            s.processed = s.queue.len();
        });
    }

    /// Simulates the device consuming `count` more queued buffers.
    pub fn mark_processed(&self, source: SourceHandle, count: usize) {
        self.with_source(source, |s| {
            s.processed = (s.processed + count).min(s.queue.len());
        });
    }

    pub fn source(&self, source: SourceHandle) -> Option<MockSource> {
        self.state.lock().unwrap().sources.get(&source).cloned()
    }

    pub fn queued_buffers(&self, source: SourceHandle) -> Vec<BufferHandle> {
        self.with_source(source, |s| s.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn buffer(&self, buffer: BufferHandle) -> Option<MockBuffer> {
        self.state.lock().unwrap().buffers.get(&buffer).cloned()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().unwrap().buffers.len()
    }

    pub fn live_sources(&self) -> usize {
        self.state.lock().unwrap().sources.len()
    }

    /// Sources currently playing, in no particular order.
    pub fn playing_sources(&self) -> Vec<SourceHandle> {
        self.state
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|(_, s)| s.state == SourceState::Playing)
            .map(|(handle, _)| *handle)
            .collect()
    }

    pub fn listener(&self) -> MockListener {
        self.state.lock().unwrap().listener.clone()
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn listener_call_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.is_listener_call())
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: DeviceCall) {
        let mut state = self.state.lock().unwrap();
        match &call {
            DeviceCall::ListenerGain(gain) => state.listener.gain = *gain,
            DeviceCall::ListenerOrientation { facing, up } => {
                state.listener.facing = *facing;
                state.listener.up = *up;
            }
            DeviceCall::ListenerPosition(position) => state.listener.position = *position,
            DeviceCall::ListenerVelocity(velocity) => state.listener.velocity = *velocity,
            _ => {}
        }
        state.calls.push(call);
    }
}

impl AudioDevice for MockDevice {
    fn create_source(&self) -> Result<SourceHandle> {
        let mut state = self.state.lock().unwrap();
        if state
            .source_limit
            .is_some_and(|limit| state.sources_created >= limit)
        {
            return Err(SoundStageError::AudioDevice(
                "Out of device sources".into(),
            ));
        }
        state.sources_created += 1;
        let handle = SourceHandle(state.next_handle());
        state.sources.insert(handle, MockSource::default());
        Ok(handle)
    }

    fn destroy_source(&self, source: SourceHandle) {
        self.state.lock().unwrap().sources.remove(&source);
    }

    fn source_state(&self, source: SourceHandle) -> SourceState {
        self.with_source(source, |s| s.state)
            .unwrap_or(SourceState::Stopped)
    }

    fn play(&self, source: SourceHandle) {
        self.with_source(source, |s| {
            s.state = if s.buffer.is_some() || !s.queue.is_empty() {
                SourceState::Playing
            } else {
                SourceState::Stopped
            };
        });
    }

    fn pause(&self, source: SourceHandle) {
        self.with_source(source, |s| {
            if s.state == SourceState::Playing {
                s.state = SourceState::Paused;
            }
        });
    }

    fn stop(&self, source: SourceHandle) {
        self.with_source(source, |s| {
            s.state = SourceState::Stopped;
            s.processed = s.queue.len();
        });
    }

    fn rewind(&self, source: SourceHandle) {
        self.with_source(source, |s| {
            s.state = SourceState::Initial;
            s.processed = 0;
        });
    }

    fn reset_source(&self, source: SourceHandle) {
        self.with_source(source, MockSource::reset_parameters);
    }

    fn set_looping(&self, source: SourceHandle, looping: bool) {
        self.with_source(source, |s| s.looping = looping);
    }

    fn set_relative(&self, source: SourceHandle, relative: bool) {
        self.with_source(source, |s| s.relative = relative);
    }

    fn set_position(&self, source: SourceHandle, position: Vec3) {
        self.with_source(source, |s| s.position = position);
    }

    fn set_velocity(&self, source: SourceHandle, velocity: Vec3) {
        self.with_source(source, |s| s.velocity = velocity);
    }

    fn set_direction(&self, source: SourceHandle, direction: Vec3) {
        self.with_source(source, |s| s.direction = direction);
    }

    fn set_gain(&self, source: SourceHandle, gain: f32) {
        self.with_source(source, |s| s.gain = gain);
    }

    fn set_pitch(&self, source: SourceHandle, pitch: f32) {
        self.with_source(source, |s| s.pitch = pitch);
    }

    fn set_rolloff(&self, source: SourceHandle, rolloff: f32) {
        self.with_source(source, |s| s.rolloff = rolloff);
    }

    fn set_reference_distance(&self, source: SourceHandle, distance: f32) {
        self.with_source(source, |s| s.reference_distance = distance);
    }

    fn set_max_distance(&self, source: SourceHandle, distance: f32) {
        self.with_source(source, |s| s.max_distance = distance);
    }

    fn set_cone(&self, source: SourceHandle, cone: SourceCone) {
        self.with_source(source, |s| s.cone = Some(cone));
    }

    fn set_buffer(&self, source: SourceHandle, buffer: Option<BufferHandle>) {
        self.with_source(source, |s| {
            s.buffer = buffer;
            s.queue.clear();
            s.processed = 0;
        });
    }

    fn enqueue_buffer(&self, source: SourceHandle, buffer: BufferHandle) {
        self.with_source(source, |s| s.queue.push_back(buffer));
    }

    fn dequeue_buffer(&self, source: SourceHandle) -> Option<BufferHandle> {
        self.with_source(source, |s| {
            if s.processed == 0 {
                return None;
            }
            s.processed -= 1;
            s.queue.pop_front()
        })
        .flatten()
    }

    fn processed_buffer_count(&self, source: SourceHandle) -> usize {
        self.with_source(source, |s| s.processed).unwrap_or(0)
    }

    fn create_buffer(&self) -> Result<BufferHandle> {
        let mut state = self.state.lock().unwrap();
        let handle = BufferHandle(state.next_handle());
        state.buffers.insert(handle, MockBuffer::default());
        Ok(handle)
    }

    /// Like a real driver, refuses to delete a buffer still attached to or
    /// queued on a source; the buffer then stays live.
    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock().unwrap();
        let in_use = state
            .sources
            .values()
            .any(|s| s.buffer == Some(buffer) || s.queue.contains(&buffer));
        if in_use {
            log::warn!("Refusing to destroy {} while a source still uses it", buffer);
            return;
        }
        state.buffers.remove(&buffer);
    }

    fn load_buffer(&self, buffer: BufferHandle, format: PcmFormat, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.buffers.get_mut(&buffer).ok_or_else(|| {
            SoundStageError::AudioDevice(format!("Unknown buffer {}", buffer))
        })?;
        entry.format = Some(format);
        entry.bytes = data.len();
        entry.loads += 1;
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferHandle) -> usize {
        self.state
            .lock()
            .unwrap()
            .buffers
            .get(&buffer)
            .map_or(0, |b| b.bytes)
    }

    fn set_listener_gain(&self, gain: f32) {
        self.record(DeviceCall::ListenerGain(gain));
    }

    fn set_listener_orientation(&self, facing: Vec3, up: Vec3) {
        self.record(DeviceCall::ListenerOrientation { facing, up });
    }

    fn set_listener_position(&self, position: Vec3) {
        self.record(DeviceCall::ListenerPosition(position));
    }

    fn set_listener_velocity(&self, velocity: Vec3) {
        self.record(DeviceCall::ListenerVelocity(velocity));
    }

    fn set_distance_model(&self, model: DistanceModel) {
        self.record(DeviceCall::DistanceModel(model));
    }

    fn set_speed_of_sound(&self, speed: f32) {
        self.record(DeviceCall::SpeedOfSound(speed));
    }

    fn set_doppler_factor(&self, factor: f32) {
        self.record(DeviceCall::DopplerFactor(factor));
    }
}

/// How a scripted clip fails, if it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Opening the clip fails with an I/O error
    OpenIo,
    /// Opening the clip fails as an unsupported format
    OpenUnsupported,
    /// Reads fail with an I/O error after this many successful reads
    ReadIoAfter(usize),
}

/// A scripted clip: `bytes` of silence in `format`.
#[derive(Debug, Clone, PartialEq)]
pub struct MockClip {
    pub format: PcmFormat,
    pub bytes: usize,
    pub failure: Option<MockFailure>,
}

impl MockClip {
    pub fn new(format: PcmFormat, bytes: usize) -> Self {
        Self {
            format,
            bytes,
            failure: None,
        }
    }

    pub fn failing(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

struct MockDecoder {
    format: PcmFormat,
    remaining: usize,
    reads: usize,
    fail_after: Option<usize>,
}

impl SoundDecoder for MockDecoder {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Err(SoundStageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "scripted read failure",
            )));
        }
        self.reads += 1;
        let n = buf.len().min(self.remaining);
        buf[..n].fill(0);
        self.remaining -= n;
        Ok(n)
    }
}

/// [`SoundLoader`] serving [`MockClip`]s by resource name.
#[derive(Debug, Default)]
pub struct MockLoader {
    clips: Mutex<HashMap<String, MockClip>>,
    opens: Mutex<HashMap<String, usize>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(self, name: impl Into<String>, clip: MockClip) -> Self {
        self.insert(name, clip);
        self
    }

    pub fn insert(&self, name: impl Into<String>, clip: MockClip) {
        self.clips.lock().unwrap().insert(name.into(), clip);
    }

    /// How many decoders have been opened for `name`.
    pub fn opens(&self, name: &str) -> usize {
        self.opens.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl SoundLoader for MockLoader {
    fn open(&self, resource: &SoundResource) -> Result<Box<dyn SoundDecoder>> {
        *self
            .opens
            .lock()
            .unwrap()
            .entry(resource.name.clone())
            .or_default() += 1;

        let clip = self
            .clips
            .lock()
            .unwrap()
            .get(&resource.name)
            .cloned()
            .ok_or_else(|| {
                SoundStageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Could not open sound resource {}", resource),
                ))
            })?;

        match clip.failure {
            Some(MockFailure::OpenIo) => Err(SoundStageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("scripted open failure for {}", resource),
            ))),
            Some(MockFailure::OpenUnsupported) => Err(SoundStageError::UnsupportedFormat(
                format!("scripted format failure for {}", resource),
            )),
            failure => Ok(Box::new(MockDecoder {
                format: clip.format,
                remaining: clip.bytes,
                reads: 0,
                fail_after: match failure {
                    Some(MockFailure::ReadIoAfter(n)) => Some(n),
                    _ => None,
                },
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_processing_follows_device_semantics() {
        let device = MockDevice::new();
        let source = device.create_source().unwrap();
        let a = device.create_buffer().unwrap();
        let b = device.create_buffer().unwrap();
        device.enqueue_buffer(source, a);
        device.enqueue_buffer(source, b);
        device.play(source);
        assert_eq!(device.source_state(source), SourceState::Playing);

        assert_eq!(device.dequeue_buffer(source), None);
        device.mark_processed(source, 1);
        assert_eq!(device.processed_buffer_count(source), 1);
        assert_eq!(device.dequeue_buffer(source), Some(a));
        assert_eq!(device.queued_buffers(source), vec![b]);

        device.finish_source(source);
        assert_eq!(device.source_state(source), SourceState::Stopped);
        assert_eq!(device.processed_buffer_count(source), 1);
    }

    #[test]
    fn buffers_in_use_are_not_destroyed() {
        let device = MockDevice::new();
        let source = device.create_source().unwrap();
        let attached = device.create_buffer().unwrap();
        let queued = device.create_buffer().unwrap();

        device.set_buffer(source, Some(attached));
        device.destroy_buffer(attached);
        assert!(device.buffer(attached).is_some());

        device.enqueue_buffer(source, queued);
        device.destroy_buffer(queued);
        assert!(device.buffer(queued).is_some());

        device.set_buffer(source, None);
        device.destroy_buffer(attached);
        device.destroy_buffer(queued);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn playing_without_data_stops_immediately() {
        let device = MockDevice::new();
        let source = device.create_source().unwrap();
        device.play(source);
        assert_eq!(device.source_state(source), SourceState::Stopped);
    }

    #[test]
    fn source_limit_is_enforced() {
        let device = MockDevice::with_source_limit(1);
        assert!(device.create_source().is_ok());
        assert!(device.create_source().is_err());
    }

    #[test]
    fn loader_scripts_clips_and_failures() {
        let format = PcmFormat::new(8000, 1, 8);
        let loader = MockLoader::new()
            .with_clip("ok", MockClip::new(format, 10))
            .with_clip("bad", MockClip::new(format, 10).failing(MockFailure::OpenUnsupported))
            .with_clip("flaky", MockClip::new(format, 10).failing(MockFailure::ReadIoAfter(1)));

        let mut decoder = loader.open(&SoundResource::new("ok")).unwrap();
        let mut buf = [1u8; 8];
        assert_eq!(decoder.read_chunk(&mut buf).unwrap(), 8);
        assert_eq!(decoder.read_chunk(&mut buf).unwrap(), 2);
        assert_eq!(decoder.read_chunk(&mut buf).unwrap(), 0);

        let err = loader.open(&SoundResource::new("bad")).err().unwrap();
        assert!(err.is_format_error());
        assert!(loader.open(&SoundResource::new("missing")).is_err());

        let mut flaky = loader.open(&SoundResource::new("flaky")).unwrap();
        assert!(flaky.read_chunk(&mut buf).is_ok());
        assert!(flaky.read_chunk(&mut buf).is_err());
        assert_eq!(loader.opens("ok"), 1);
    }
}
