//! The device layer the stage schedules onto.
//!
//! An [`AudioDevice`] owns the real voice channels ("sources") and PCM buffers,
//! performs 3D mixing, attenuation and doppler, and reports channel state. The
//! stage only ever calls it from the update thread, except for streams in
//! [`StreamMode::Automatic`](crate::config::StreamMode), whose refill thread
//! drives that one source's buffer queue. Implementations must therefore be
//! `Send + Sync`.

use crate::audio_data::PcmFormat;
use crate::error::Result;
use crate::math::Vec3;

/// Handle to one device voice channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub u32);

impl std::fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Source({})", self.0)
    }
}

/// Handle to one device PCM buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

impl std::fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer({})", self.0)
    }
}

/// Playback state of a device source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Never played, or rewound
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl SourceState {
    /// Playing or paused: the source still holds its voice.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Directional cone of a source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCone {
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub outer_gain: f32,
}

/// Distance attenuation model used by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceModel {
    None,
    InverseDistance,
    InverseDistanceClamped,
    LinearDistance,
    LinearDistanceClamped,
    ExponentDistance,
    ExponentDistanceClamped,
}

/// Audio device collaborator: voice channels, buffers and the listener.
pub trait AudioDevice: Send + Sync {
    fn create_source(&self) -> Result<SourceHandle>;
    fn destroy_source(&self, source: SourceHandle);

    fn source_state(&self, source: SourceHandle) -> SourceState;
    fn play(&self, source: SourceHandle);
    fn pause(&self, source: SourceHandle);
    fn stop(&self, source: SourceHandle);
    fn rewind(&self, source: SourceHandle);

    /// Restores a source's parameters to their defaults.
    fn reset_source(&self, source: SourceHandle);
    fn set_looping(&self, source: SourceHandle, looping: bool);
    fn set_relative(&self, source: SourceHandle, relative: bool);
    fn set_position(&self, source: SourceHandle, position: Vec3);
    fn set_velocity(&self, source: SourceHandle, velocity: Vec3);
    fn set_direction(&self, source: SourceHandle, direction: Vec3);
    fn set_gain(&self, source: SourceHandle, gain: f32);
    fn set_pitch(&self, source: SourceHandle, pitch: f32);
    fn set_rolloff(&self, source: SourceHandle, rolloff: f32);
    fn set_reference_distance(&self, source: SourceHandle, distance: f32);
    fn set_max_distance(&self, source: SourceHandle, distance: f32);
    fn set_cone(&self, source: SourceHandle, cone: SourceCone);

    /// Attaches a static buffer, or detaches everything (including queued buffers) with `None`.
    fn set_buffer(&self, source: SourceHandle, buffer: Option<BufferHandle>);
    fn enqueue_buffer(&self, source: SourceHandle, buffer: BufferHandle);
    /// Removes the oldest processed buffer from the source's queue.
    fn dequeue_buffer(&self, source: SourceHandle) -> Option<BufferHandle>;
    fn processed_buffer_count(&self, source: SourceHandle) -> usize;

    fn create_buffer(&self) -> Result<BufferHandle>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn load_buffer(&self, buffer: BufferHandle, format: PcmFormat, data: &[u8]) -> Result<()>;
    /// Size in bytes of the PCM data currently loaded into `buffer`.
    fn buffer_size(&self, buffer: BufferHandle) -> usize;

    fn set_listener_gain(&self, gain: f32);
    fn set_listener_orientation(&self, facing: Vec3, up: Vec3);
    fn set_listener_position(&self, position: Vec3);
    fn set_listener_velocity(&self, velocity: Vec3);

    fn set_distance_model(&self, model: DistanceModel);
    fn set_speed_of_sound(&self, speed: f32);
    fn set_doppler_factor(&self, factor: f32);
}
