use crate::device::AudioDevice;
use crate::math::{Orientation, Vec3};

/// Listener attributes cached on the stage and pushed to the device lazily.
///
/// Each attribute group (gain, orientation, position + velocity) has its own
/// dirty flag; [`push`](Self::push) sends only the dirty groups and then
/// clears their flags. A new state starts fully dirty so the first push
/// initializes the device.
#[derive(Debug, Clone)]
pub struct ListenerState {
    gain: f32,
    orientation: Orientation,
    position: Vec3,
    velocity: Vec3,
    gain_dirty: bool,
    orientation_dirty: bool,
    position_dirty: bool,
}

impl Default for ListenerState {
    fn default() -> Self {
        Self {
            gain: 1.0,
            orientation: Orientation::default(),
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            gain_dirty: true,
            orientation_dirty: true,
            position_dirty: true,
        }
    }
}

impl ListenerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn facing(&self) -> Vec3 {
        self.orientation.facing
    }

    pub fn up(&self) -> Vec3 {
        self.orientation.up
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        self.gain_dirty = true;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.position_dirty = true;
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
        self.position_dirty = true;
    }

    pub fn set_up(&mut self, up: Vec3) {
        self.orientation.up = up;
        self.orientation_dirty = true;
    }

    pub fn set_facing(&mut self, facing: Vec3) {
        self.orientation.facing = facing;
        self.orientation_dirty = true;
    }

    /// Rotates the orientation about X, then Y, then Z (radians).
    pub fn rotate(&mut self, x: f32, y: f32, z: f32) {
        self.orientation.rotate(x, y, z);
        self.orientation_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.gain_dirty || self.orientation_dirty || self.position_dirty
    }

    /// Sends dirty attribute groups to the device and clears their flags.
    pub fn push(&mut self, device: &dyn AudioDevice) {
        if self.gain_dirty {
            device.set_listener_gain(self.gain);
            self.gain_dirty = false;
        }
        if self.orientation_dirty {
            device.set_listener_orientation(self.orientation.facing, self.orientation.up);
            self.orientation_dirty = false;
        }
        if self.position_dirty {
            device.set_listener_position(self.position);
            device.set_listener_velocity(self.velocity);
            self.position_dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_device::{DeviceCall, MockDevice};

    #[test]
    fn first_push_sends_everything_then_nothing() {
        let device = MockDevice::new();
        let mut listener = ListenerState::new();
        listener.push(&device);
        assert_eq!(device.listener_call_count(), 4);

        device.clear_calls();
        listener.push(&device);
        assert_eq!(device.listener_call_count(), 0);
        assert!(!listener.is_dirty());
    }

    #[test]
    fn only_dirty_groups_are_pushed() {
        let device = MockDevice::new();
        let mut listener = ListenerState::new();
        listener.push(&device);
        device.clear_calls();

        listener.set_velocity(Vec3::X);
        listener.push(&device);
        let calls = device.calls();
        assert_eq!(
            calls,
            vec![
                DeviceCall::ListenerPosition(Vec3::ZERO),
                DeviceCall::ListenerVelocity(Vec3::X),
            ]
        );

        device.clear_calls();
        listener.set_gain(0.5);
        listener.push(&device);
        assert_eq!(device.calls(), vec![DeviceCall::ListenerGain(0.5)]);
        assert_eq!(device.listener().gain, 0.5);
    }
}
