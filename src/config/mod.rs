mod sound_resource;
mod stage_desc;

pub use sound_resource::SoundResource;
pub use stage_desc::{NoPanMode, SoundStageDesc, StreamMode};
