use crate::math::Vec3;

/// Spatial state of a sound-emitting object at the time of an update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoundPose {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Facing direction, zero for omnidirectional objects
    pub direction: Vec3,
}

impl SoundPose {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// Maps application objects to their spatial state.
///
/// Objects are whatever the application uses to identify an emitter (an entity
/// id, a handle...). The stage keys its object bindings on them and asks the
/// model for their pose when computing 3D attributes and distance culling.
pub trait ObjectModel<O>: Send {
    fn sound_pose(&self, object: &O) -> SoundPose;
}

impl<O, F> ObjectModel<O> for F
where
    F: Fn(&O) -> SoundPose + Send,
{
    fn sound_pose(&self, object: &O) -> SoundPose {
        self(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_object_models() {
        let model = |id: &u32| SoundPose::from_position(Vec3::new(*id as f32, 0.0, 0.0));
        assert_eq!(model.sound_pose(&3).position, Vec3::new(3.0, 0.0, 0.0));
    }
}
