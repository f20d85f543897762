//! # SoundStage
//!
//! A real-time voice scheduler and resource manager for 3D audio devices.
//!
//! A [`SoundStage`] sits between "play this sound" requests and a fixed pool of
//! device voices. Every update tick it decides which requests get a voice,
//! which voices get preempted, how decoded buffers are cached and reused, and
//! keeps streaming voices fed. The device itself and audio decoding are
//! supplied by the application through the [`AudioDevice`] and [`SoundLoader`]
//! traits.
//!
//! ## Quick Start
//!
//! ```
//! use soundstage::mock_device::{MockClip, MockDevice, MockLoader};
//! use soundstage::*;
//! use std::sync::Arc;
//!
//! let device = Arc::new(MockDevice::new());
//! let loader = MockLoader::new()
//!     .with_clip("door.wav", MockClip::new(PcmFormat::new(22050, 1, 16), 44100));
//!
//! let mut stage = SoundStage::new(
//!     SoundStageDesc::new().voices(8),
//!     device,
//!     Arc::new(loader),
//!     |_: &u32| SoundPose::default(),
//! )?;
//! stage.add_listener(LogListener);
//!
//! let door = Arc::new(SoundResource::new("door.wav").priority(2.0));
//! stage.play(door);
//! stage.update();
//! assert_eq!(stage.used_voices(), 1);
//! # Ok::<(), SoundStageError>(())
//! ```

pub mod audio_data;
pub mod binding;
pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod group;
pub mod listener;
pub mod math;
pub mod mock_device;
pub mod object;
pub mod playback;
pub mod stage;
pub mod stream;
pub mod voice;

pub use audio_data::{PcmFormat, SoundDecoder, SoundLoader};
pub use config::{NoPanMode, SoundResource, SoundStageDesc, StreamMode};
pub use device::{AudioDevice, BufferHandle, DistanceModel, SourceCone, SourceHandle, SourceState};
pub use error::{Result, SoundStageError};
pub use events::{ChannelListener, ListenerId, LogListener, SoundStageEvent, StageListener};
pub use group::{GroupId, SoundGroup, SoundGroups};
pub use math::Vec3;
pub use object::{ObjectModel, SoundPose};
pub use playback::{PlayRequest, StageCommand, StopTarget};
pub use stage::{HookId, PhaseTimings, SoundStage, StageHandle, UpdateHook};
