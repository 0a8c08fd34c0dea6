// Topics, loop constants, gait tuning
use std::time::Duration;

// State publish frequency
pub const STATE_HZ: u64 = 5;

// Zenoh topics
pub const TOPIC_CMD_MOTION: &str = "quad/cmd/motion"; // command verbs
pub const TOPIC_RT_STATUS: &str = "quad/rt/status"; // command acks
pub const TOPIC_STATE_GAIT: &str = "quad/state/gait"; // which gait is running

// I2C bus the PCA9685 hangs off (Raspberry Pi bus 1)
pub const DEFAULT_I2C_BUS: u8 = 1;

/// Gait tuning for one physical rig.
///
/// All angles are raw degrees (pre-inversion). These are empirical
/// calibration inputs, not derivable constants: they were tuned on the
/// actual robot and a different frame or servo batch needs its own set.
#[derive(Debug, Clone)]
pub struct Tuning {
    pub hip_neutral: f32,
    pub hip_forward: f32,
    pub hip_back: f32,

    pub knee_down: f32,
    pub knee_up: f32,

    /// Added to the stance pair's knee-down angle during a weight shift.
    pub press_delta: f32,
    /// Added to the swing pair's knee-down angle during a weight shift.
    pub lighten_delta: f32,

    /// Degrees per ramp increment.
    pub ramp_step: f32,
    /// Sleep between ramp increments.
    pub ramp_delay: Duration,
    /// Pause after a crawl/turn phase.
    pub dwell: Duration,
    /// Pause after a trot phase.
    pub trot_dwell: Duration,
    /// Pause after parking in the neutral stance.
    pub settle: Duration,
    /// How long `start` waits for a preempted gait task to exit before
    /// aborting it. Must exceed the longest single phase.
    pub preempt_timeout: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            hip_neutral: 90.0,
            hip_forward: 65.0,
            hip_back: 145.0,
            knee_down: 124.0,
            knee_up: 86.0,
            press_delta: 8.0,
            lighten_delta: -6.0,
            ramp_step: 3.0,
            ramp_delay: Duration::from_millis(10),
            dwell: Duration::from_millis(120),
            trot_dwell: Duration::from_millis(120),
            settle: Duration::from_millis(200),
            preempt_timeout: Duration::from_secs(5),
        }
    }
}

impl Tuning {
    /// Entry pose for walking gaits: hips midway between neutral and the
    /// given extreme.
    pub fn hip_bias(&self, toward: f32) -> f32 {
        (self.hip_neutral + toward) / 2.0
    }

    /// A tuning with all delays zeroed, for tests that only care about
    /// write sequences.
    #[cfg(test)]
    pub fn instant() -> Self {
        Self {
            ramp_delay: Duration::ZERO,
            dwell: Duration::ZERO,
            trot_dwell: Duration::ZERO,
            settle: Duration::ZERO,
            ..Self::default()
        }
    }
}
