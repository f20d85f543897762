use std::hash::{Hash, Hasher};

/// Immutable descriptor of a playable sound and its scheduling policy.
///
/// The stage never mutates a resource; it is shared as `Arc<SoundResource>` and
/// used as the key of the buffer cache, the primed-stream table and the
/// resource-to-voice bindings. Two resources are the same resource when their
/// names are equal.
///
/// ```
/// use soundstage::SoundResource;
///
/// let shot = SoundResource::new("sfx/shot.wav")
///     .priority(5.0)
///     .limit(3)
///     .stops_oldest(true)
///     .pitch_variance(0.1);
/// assert_eq!(shot.limit, 3);
/// ```
#[derive(Debug, Clone)]
pub struct SoundResource {
    /// Name, usually the path the loader opens
    pub name: String,
    /// Higher priority sounds preempt lower ones on the same object channel
    pub priority: f32,
    pub init_gain: f32,
    pub init_pitch: f32,
    /// Gain is randomized within `init_gain ± gain_variance`
    pub gain_variance: f32,
    /// Pitch is randomized within `init_pitch ± pitch_variance`
    pub pitch_variance: f32,
    pub rolloff: f32,
    /// Distance under which the sound is not panned
    pub panning_deadzone: f32,
    pub attenuation_distance: f32,
    /// Requests farther than this are culled when rolloff is nonzero
    pub max_attenuation_distance: f32,
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,
    pub outer_cone_gain: f32,
    pub streaming: bool,
    pub looping: bool,
    pub not_doppled: bool,
    pub not_directed: bool,
    pub not_panned: bool,
    /// When the limit is reached, stop the oldest voice instead of dropping the request
    pub stops_oldest: bool,
    /// Requests that find no free voice are retried on the next tick
    pub must_be_played: bool,
    /// Maximum concurrent voices for this resource (0 = no limit)
    pub limit: usize,
}

impl SoundResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0.0,
            init_gain: 1.0,
            init_pitch: 1.0,
            gain_variance: 0.0,
            pitch_variance: 0.0,
            rolloff: 1.0,
            panning_deadzone: 0.0,
            attenuation_distance: 1.0,
            max_attenuation_distance: 2.0,
            inner_cone_angle: 360.0,
            outer_cone_angle: 360.0,
            outer_cone_gain: 1.0,
            streaming: false,
            looping: false,
            not_doppled: false,
            not_directed: false,
            not_panned: false,
            stops_oldest: false,
            must_be_played: false,
            limit: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(mut self, priority: f32) -> Self {
        self.priority = priority;
        self
    }

    pub fn init_gain(mut self, gain: f32) -> Self {
        self.init_gain = gain;
        self
    }

    pub fn init_pitch(mut self, pitch: f32) -> Self {
        self.init_pitch = pitch;
        self
    }

    pub fn gain_variance(mut self, variance: f32) -> Self {
        self.gain_variance = variance;
        self
    }

    pub fn pitch_variance(mut self, variance: f32) -> Self {
        self.pitch_variance = variance;
        self
    }

    pub fn rolloff(mut self, rolloff: f32) -> Self {
        self.rolloff = rolloff;
        self
    }

    pub fn panning_deadzone(mut self, distance: f32) -> Self {
        self.panning_deadzone = distance;
        self
    }

    pub fn attenuation_distance(mut self, distance: f32) -> Self {
        self.attenuation_distance = distance;
        self
    }

    pub fn max_attenuation_distance(mut self, distance: f32) -> Self {
        self.max_attenuation_distance = distance;
        self
    }

    pub fn cone(mut self, inner_angle: f32, outer_angle: f32, outer_gain: f32) -> Self {
        self.inner_cone_angle = inner_angle;
        self.outer_cone_angle = outer_angle;
        self.outer_cone_gain = outer_gain;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn not_doppled(mut self, value: bool) -> Self {
        self.not_doppled = value;
        self
    }

    pub fn not_directed(mut self, value: bool) -> Self {
        self.not_directed = value;
        self
    }

    pub fn not_panned(mut self, value: bool) -> Self {
        self.not_panned = value;
        self
    }

    pub fn stops_oldest(mut self, value: bool) -> Self {
        self.stops_oldest = value;
        self
    }

    pub fn must_be_played(mut self, value: bool) -> Self {
        self.must_be_played = value;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl PartialEq for SoundResource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for SoundResource {}

impl Hash for SoundResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for SoundResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_is_by_name() {
        let a = SoundResource::new("music/title.ogg").priority(1.0);
        let b = SoundResource::new("music/title.ogg").priority(9.0).looping(true);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn defaults_match_an_unconfigured_sound() {
        let res = SoundResource::new("x");
        assert_eq!(res.rolloff, 1.0);
        assert_eq!(res.max_attenuation_distance, 2.0);
        assert_eq!(res.limit, 0);
        assert!(!res.streaming && !res.must_be_played);
    }
}
