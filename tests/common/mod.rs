#![allow(dead_code)]

use crossbeam_channel::{Receiver, unbounded};
use soundstage::mock_device::{MockClip, MockDevice, MockLoader};
use soundstage::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 1000 Hz mono 8-bit: one byte per millisecond of audio.
pub fn format() -> PcmFormat {
    PcmFormat::new(1000, 1, 8)
}

pub struct Harness {
    pub stage: SoundStage<u32>,
    pub device: Arc<MockDevice>,
    pub loader: Arc<MockLoader>,
    pub poses: Arc<Mutex<HashMap<u32, SoundPose>>>,
    pub events: Receiver<SoundStageEvent>,
}

impl Harness {
    pub fn new(desc: SoundStageDesc) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let device = Arc::new(MockDevice::new());
        let loader = Arc::new(MockLoader::new());
        let poses: Arc<Mutex<HashMap<u32, SoundPose>>> = Arc::default();

        let model_poses = poses.clone();
        let mut stage = SoundStage::new(
            desc.seed(7),
            device.clone(),
            loader.clone(),
            move |object: &u32| {
                model_poses
                    .lock()
                    .unwrap()
                    .get(object)
                    .copied()
                    .unwrap_or_default()
            },
        )
        .unwrap();

        let (tx, events) = unbounded();
        stage.add_listener(ChannelListener::new(tx));

        Self {
            stage,
            device,
            loader,
            poses,
            events,
        }
    }

    /// Registers a clip of `bytes` PCM bytes and returns a resource for it.
    pub fn clip(&self, name: &str, bytes: usize) -> SoundResource {
        self.loader.insert(name, MockClip::new(format(), bytes));
        SoundResource::new(name)
    }

    pub fn place(&self, object: u32, position: Vec3) {
        self.poses
            .lock()
            .unwrap()
            .insert(object, SoundPose::from_position(position));
    }

    pub fn drain(&self) -> Vec<SoundStageEvent> {
        self.events.try_iter().collect()
    }

    pub fn assert_partitioned(&self) {
        assert_eq!(
            self.stage.available_voices() + self.stage.used_voices() + self.stage.dead_voices(),
            self.stage.voice_count()
        );
    }
}

pub fn count(events: &[SoundStageEvent], pred: impl Fn(&SoundStageEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

pub fn played(events: &[SoundStageEvent], name: &str) -> usize {
    count(events, |e| {
        matches!(e, SoundStageEvent::SoundPlayed { resource } if resource.name == name)
    })
}
