// Posture and weight-shift vocabulary
//
// Everything here is built on the ramp engine only. Pair and whole-body
// operations always go through a single ramp_many call so the grouped
// channels stay in lockstep; issuing them as separate ramps would let the
// robot's weight rest transiently on the wrong legs.

use tokio::time::sleep;

use crate::config::Tuning;
use crate::gait::machine::Turn;
use crate::servo::{ChannelMap, DiagPair, Leg, PwmError, ServoDriver};

type Result<T> = std::result::Result<T, PwmError>;

/// The robot's motion vocabulary: owns the servo driver, the channel map,
/// and the rig tuning.
pub struct Body {
    driver: ServoDriver,
    map: ChannelMap,
    tune: Tuning,
}

impl Body {
    pub fn new(driver: ServoDriver, map: ChannelMap, tune: Tuning) -> Self {
        Self { driver, map, tune }
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tune
    }

    pub fn driver(&self) -> &ServoDriver {
        &self.driver
    }

    // === Single-joint ramps ===

    pub async fn hip(&mut self, leg: Leg, raw: f32) -> Result<()> {
        let ch = self.map.hip(leg);
        self.driver
            .ramp_one(ch, raw, self.tune.ramp_step, self.tune.ramp_delay)
            .await
    }

    pub async fn knee(&mut self, leg: Leg, raw: f32) -> Result<()> {
        let ch = self.map.knee(leg);
        self.driver
            .ramp_one(ch, raw, self.tune.ramp_step, self.tune.ramp_delay)
            .await
    }

    // === Synchronized group ramps ===

    pub async fn hip_pair(&mut self, pair: DiagPair, raw: f32) -> Result<()> {
        let chs = pair.legs().map(|leg| self.map.hip(leg));
        self.driver
            .ramp_many(&chs, &[raw, raw], self.tune.ramp_step, self.tune.ramp_delay)
            .await
    }

    pub async fn knee_pair(&mut self, pair: DiagPair, raw: f32) -> Result<()> {
        let chs = pair.legs().map(|leg| self.map.knee(leg));
        self.driver
            .ramp_many(&chs, &[raw, raw], self.tune.ramp_step, self.tune.ramp_delay)
            .await
    }

    pub async fn all_hips(&mut self, raw: f32) -> Result<()> {
        let chs = self.map.hips();
        self.driver
            .ramp_many(&chs, &[raw; 4], self.tune.ramp_step, self.tune.ramp_delay)
            .await
    }

    pub async fn all_knees(&mut self, raw: f32) -> Result<()> {
        let chs = self.map.knees();
        self.driver
            .ramp_many(&chs, &[raw; 4], self.tune.ramp_step, self.tune.ramp_delay)
            .await
    }

    // === Posture ===

    /// All knees to the planted (down) angle
    pub async fn plant_all(&mut self) -> Result<()> {
        let knee_down = self.tune.knee_down;
        self.all_knees(knee_down).await
    }

    pub async fn hips_neutral(&mut self) -> Result<()> {
        let neutral = self.tune.hip_neutral;
        self.all_hips(neutral).await
    }

    /// Known stable stance: knees down, hips neutral, short settle
    pub async fn park_neutral(&mut self) -> Result<()> {
        self.plant_all().await?;
        self.hips_neutral().await?;
        sleep(self.tune.settle).await;
        Ok(())
    }

    /// Entry pose for walking gaits: park, then ramp all hips to the
    /// midpoint between neutral and `toward`
    pub async fn bias_hips(&mut self, toward: f32) -> Result<()> {
        self.plant_all().await?;
        self.hips_neutral().await?;
        let bias = self.tune.hip_bias(toward);
        self.all_hips(bias).await?;
        sleep(self.tune.settle).await;
        Ok(())
    }

    // === Per-leg motion ===

    pub async fn lift(&mut self, leg: Leg) -> Result<()> {
        let up = self.tune.knee_up;
        self.knee(leg, up).await
    }

    pub async fn lower(&mut self, leg: Leg) -> Result<()> {
        let down = self.tune.knee_down;
        self.knee(leg, down).await
    }

    pub async fn swing_forward(&mut self, leg: Leg) -> Result<()> {
        let fwd = self.tune.hip_forward;
        self.hip(leg, fwd).await
    }

    pub async fn swing_back(&mut self, leg: Leg) -> Result<()> {
        let back = self.tune.hip_back;
        self.hip(leg, back).await
    }

    // === Per-pair motion (trot) ===

    pub async fn lift_pair(&mut self, pair: DiagPair) -> Result<()> {
        let up = self.tune.knee_up;
        self.knee_pair(pair, up).await
    }

    pub async fn lower_pair(&mut self, pair: DiagPair) -> Result<()> {
        let down = self.tune.knee_down;
        self.knee_pair(pair, down).await
    }

    pub async fn swing_pair_forward(&mut self, pair: DiagPair) -> Result<()> {
        let fwd = self.tune.hip_forward;
        self.hip_pair(pair, fwd).await
    }

    // === Weight shift ===

    /// Shift load off the swing pair: press the stance knees and lighten
    /// the swing knees in one synchronized ramp across all four knee
    /// channels, then dwell while the weight settles.
    pub async fn weight_shift(&mut self, swing: DiagPair) -> Result<()> {
        let stance = swing.opposite();
        let press = self.tune.knee_down + self.tune.press_delta;
        let lighten = self.tune.knee_down + self.tune.lighten_delta;

        let mut chs = Vec::with_capacity(4);
        let mut targets = Vec::with_capacity(4);
        for leg in stance.legs() {
            chs.push(self.map.knee(leg));
            targets.push(press);
        }
        for leg in swing.legs() {
            chs.push(self.map.knee(leg));
            targets.push(lighten);
        }
        self.driver
            .ramp_many(&chs, &targets, self.tune.ramp_step, self.tune.ramp_delay)
            .await?;
        sleep(self.tune.trot_dwell).await;
        Ok(())
    }

    /// Return all knees to the planted angle
    pub async fn clear_weight_shift(&mut self) -> Result<()> {
        self.plant_all().await
    }

    // === In-place turn ===

    /// Rotate pose: the turn side's hips sweep back while the other side
    /// sweeps forward, all four in one synchronized ramp
    pub async fn rotate_hips(&mut self, turn: Turn) -> Result<()> {
        let chs = self.map.hips();
        let targets = Leg::ALL.map(|leg| {
            let backward = match turn {
                Turn::Left => !leg.is_right(),
                Turn::Right => leg.is_right(),
            };
            if backward {
                self.tune.hip_back
            } else {
                self.tune.hip_forward
            }
        });
        self.driver
            .ramp_many(&chs, &targets, self.tune.ramp_step, self.tune.ramp_delay)
            .await
    }

    /// Quick knee pulse: up, brief hold, back down
    pub async fn pulse_knee(&mut self, leg: Leg) -> Result<()> {
        self.lift(leg).await?;
        sleep(self.tune.dwell.mul_f32(0.6)).await;
        self.lower(leg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::testing::Recorder;
    use crate::servo::{ChannelMap, ServoDriver};

    fn body() -> (Body, Recorder) {
        let recorder = Recorder::default();
        let driver = ServoDriver::new(Box::new(recorder.backend()));
        let body = Body::new(driver, ChannelMap::stock(), Tuning::instant());
        (body, recorder)
    }

    #[tokio::test]
    async fn test_weight_shift_is_one_synchronized_ramp() {
        let (mut body, rec) = body();
        body.plant_all().await.unwrap();
        rec.clear();

        body.weight_shift(DiagPair::B).await.unwrap();

        let map = ChannelMap::stock();
        // Stance pair A pressed by +8 from 124 -> raw 132
        let lf_knee = map.knee(Leg::LF);
        assert_eq!(
            body.driver().commanded(lf_knee.index),
            Some(132.0),
            "stance knee pressed"
        );
        // Swing pair B lightened by -6 -> raw 118, inverted on RF -> 62
        let rf_knee = map.knee(Leg::RF);
        assert_eq!(body.driver().commanded(rf_knee.index), Some(62.0));

        // All four knees share ticks: first four writes hit four distinct
        // channels before any channel is written twice
        let order = rec.indices();
        let mut first_tick: Vec<u8> = order[..4].to_vec();
        first_tick.sort_unstable();
        first_tick.dedup();
        assert_eq!(first_tick.len(), 4, "one write per knee per tick");
    }

    #[tokio::test]
    async fn test_clear_weight_shift_restores_plant() {
        let (mut body, _rec) = body();
        body.plant_all().await.unwrap();
        body.weight_shift(DiagPair::A).await.unwrap();
        body.clear_weight_shift().await.unwrap();

        let map = ChannelMap::stock();
        for leg in Leg::ALL {
            let ch = map.knee(leg);
            let expected = ServoDriver::effective(ch, 124.0);
            assert_eq!(body.driver().commanded(ch.index), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_park_neutral_is_idempotent_on_commanded() {
        let (mut body, rec) = body();
        body.park_neutral().await.unwrap();

        let snapshot: Vec<Option<f32>> =
            (0..16).map(|i| body.driver().commanded(i)).collect();
        rec.clear();

        body.park_neutral().await.unwrap();
        let after: Vec<Option<f32>> = (0..16).map(|i| body.driver().commanded(i)).collect();

        assert_eq!(snapshot, after, "commanded values unchanged");
        // Still performs writes (one snap per channel)
        assert_eq!(rec.write_count(), 8);
    }

    #[tokio::test]
    async fn test_rotate_hips_left_pose() {
        let (mut body, _rec) = body();
        body.park_neutral().await.unwrap();
        body.rotate_hips(Turn::Left).await.unwrap();

        let map = ChannelMap::stock();
        // Left side back (145), right side forward (65, inverted -> 115)
        assert_eq!(body.driver().commanded(map.hip(Leg::LF).index), Some(145.0));
        assert_eq!(body.driver().commanded(map.hip(Leg::LR).index), Some(145.0));
        assert_eq!(body.driver().commanded(map.hip(Leg::RF).index), Some(115.0));
        assert_eq!(body.driver().commanded(map.hip(Leg::RR).index), Some(115.0));
    }
}
