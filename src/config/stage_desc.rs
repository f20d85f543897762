use crate::device::DistanceModel;
use crate::error::{Result, SoundStageError};
use std::time::Duration;

/// How streaming voices get their buffer queues refilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Refilled by the streams phase of the update cycle
    #[default]
    Manual,
    /// Each stream gets its own refill thread ticking at `interval`
    Automatic { interval: Duration },
}

/// Where a sound that should not be panned is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoPanMode {
    /// At the listener position
    #[default]
    Listener,
    /// One facing-unit in front of the listener
    ListenerFront,
}

/// Configuration descriptor for a sound stage
#[derive(Debug, Clone)]
pub struct SoundStageDesc {
    /// Number of device voices created up front; must be at least 1
    pub voices: usize,
    /// Byte budget of the buffer cache (0 or less means unlimited)
    pub cache_bytes: i64,
    /// Duration of each of the two streaming chunks
    pub stream_buffer_duration: Duration,
    /// Manual or automatic stream refilling
    pub stream_mode: StreamMode,
    /// Placement of sounds that are not panned
    pub no_pan_mode: NoPanMode,
    /// Device distance attenuation model
    pub distance_model: DistanceModel,
    /// Device speed of sound, left at the device default when `None`
    pub speed_of_sound: Option<f32>,
    /// Device doppler factor, left at the device default when `None`
    pub doppler_factor: Option<f32>,
    /// Seed for gain/pitch variance (None seeds from entropy)
    pub seed: Option<u64>,
}

impl Default for SoundStageDesc {
    fn default() -> Self {
        Self {
            voices: 32,
            cache_bytes: 8 * 1024 * 1024,
            stream_buffer_duration: Duration::from_secs(1),
            stream_mode: StreamMode::Manual,
            no_pan_mode: NoPanMode::Listener,
            distance_model: DistanceModel::InverseDistanceClamped,
            speed_of_sound: None,
            doppler_factor: None,
            seed: None,
        }
    }
}

impl SoundStageDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn cache_bytes(mut self, bytes: i64) -> Self {
        self.cache_bytes = bytes;
        self
    }

    pub fn stream_buffer_duration(mut self, duration: Duration) -> Self {
        self.stream_buffer_duration = duration;
        self
    }

    pub fn stream_mode(mut self, mode: StreamMode) -> Self {
        self.stream_mode = mode;
        self
    }

    pub fn no_pan_mode(mut self, mode: NoPanMode) -> Self {
        self.no_pan_mode = mode;
        self
    }

    pub fn distance_model(mut self, model: DistanceModel) -> Self {
        self.distance_model = model;
        self
    }

    pub fn speed_of_sound(mut self, speed: f32) -> Self {
        self.speed_of_sound = Some(speed);
        self
    }

    pub fn doppler_factor(mut self, factor: f32) -> Self {
        self.doppler_factor = Some(factor);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks the descriptor before any device resource is created.
    pub fn validate(&self) -> Result<()> {
        if self.voices < 1 {
            return Err(SoundStageError::Configuration(
                "The number of voices can't be less than 1".into(),
            ));
        }
        if self.stream_buffer_duration.is_zero() {
            return Err(SoundStageError::Configuration(
                "Stream buffer duration must be greater than zero".into(),
            ));
        }
        if let StreamMode::Automatic { interval } = self.stream_mode {
            if interval.is_zero() {
                return Err(SoundStageError::Configuration(
                    "Automatic stream interval must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor_is_valid() {
        let desc = SoundStageDesc::default();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.stream_mode, StreamMode::Manual);
        assert_eq!(desc.no_pan_mode, NoPanMode::Listener);
    }

    #[test]
    fn zero_voices_fails_fast() {
        let err = SoundStageDesc::new().voices(0).validate().unwrap_err();
        assert!(matches!(err, SoundStageError::Configuration(_)));
    }

    #[test]
    fn zero_stream_durations_are_rejected() {
        assert!(
            SoundStageDesc::new()
                .stream_buffer_duration(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            SoundStageDesc::new()
                .stream_mode(StreamMode::Automatic {
                    interval: Duration::ZERO
                })
                .validate()
                .is_err()
        );
    }
}
