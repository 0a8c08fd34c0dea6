// Servo write path and synchronized ramp engine
//
// The driver owns the only record of what each channel was last told to
// do. Ramps always restart from that table, never from a driver readback,
// so a failed write leaves the table at the last known-good angle and the
// next ramp recomputes from there.

use std::time::Duration;

use tokio::time::sleep;
use tracing::trace;

use super::channel::ServoChannel;
use super::pca9685::{PwmBackend, Result};

/// Owns the PWM backend and the per-channel commanded-angle table.
///
/// All angles in the table are effective degrees (post-inversion), which
/// is what the hardware was actually told. Public entry points take raw
/// degrees and apply the channel's inversion rule.
pub struct ServoDriver {
    backend: Box<dyn PwmBackend>,
    commanded: [Option<f32>; 16],
}

impl ServoDriver {
    pub fn new(backend: Box<dyn PwmBackend>) -> Self {
        Self {
            backend,
            commanded: [None; 16],
        }
    }

    /// Apply the channel's inversion rule to a raw angle
    pub fn effective(ch: ServoChannel, raw: f32) -> f32 {
        if ch.invert { 180.0 - raw } else { raw }
    }

    /// One physical write, inversion applied, no delay
    pub fn write(&mut self, ch: ServoChannel, raw: f32) -> Result<()> {
        self.write_effective(ch.index, Self::effective(ch, raw))
    }

    /// Last commanded effective angle, or the inverted form of the given
    /// raw default if this channel was never written
    pub fn read_or_default(&self, ch: ServoChannel, raw_default: f32) -> f32 {
        self.commanded[ch.index as usize].unwrap_or_else(|| Self::effective(ch, raw_default))
    }

    /// Last commanded effective angle for a channel index, if any
    pub fn commanded(&self, index: u8) -> Option<f32> {
        self.commanded[index as usize]
    }

    /// Stop driving all channels. Commanded angles are kept; the next
    /// ramp still starts from the last commanded position.
    pub fn release(&mut self) -> Result<()> {
        self.backend.release_all()
    }

    fn write_effective(&mut self, index: u8, degrees: f32) -> Result<()> {
        // The table only advances on a successful write
        self.backend.set_angle(index, degrees)?;
        self.commanded[index as usize] = Some(degrees);
        Ok(())
    }

    /// Ramp a single channel to a raw target in `step`-degree increments
    /// with `delay` between writes, finishing with an exact write of the
    /// target. A channel already at the target is written once.
    pub async fn ramp_one(
        &mut self,
        ch: ServoChannel,
        raw_target: f32,
        step: f32,
        delay: Duration,
    ) -> Result<()> {
        let target = Self::effective(ch, raw_target);
        let mut cur = self.read_or_default(ch, raw_target);
        trace!("ramp ch {}: {:.1} -> {:.1}", ch.index, cur, target);

        if cur == target {
            return self.write_effective(ch.index, target);
        }

        let sgn = if target > cur { 1.0 } else { -1.0 };
        while (target - cur).abs() > step {
            cur += sgn * step;
            self.write_effective(ch.index, cur)?;
            sleep(delay).await;
        }
        self.write_effective(ch.index, target)
    }

    /// Ramp a group of channels to per-channel raw targets in lockstep.
    ///
    /// The group runs for `max(ceil(|target - current| / step))` ticks; on
    /// each tick every unarrived channel advances by at most `step` toward
    /// its own target and one shared delay separates ticks, so channels
    /// with different travel distances still arrive together in wall-clock
    /// time. Finishes with exact-snap writes to every channel.
    pub async fn ramp_many(
        &mut self,
        channels: &[ServoChannel],
        raw_targets: &[f32],
        step: f32,
        delay: Duration,
    ) -> Result<()> {
        debug_assert_eq!(channels.len(), raw_targets.len());

        let targets: Vec<f32> = channels
            .iter()
            .zip(raw_targets)
            .map(|(&ch, &raw)| Self::effective(ch, raw))
            .collect();
        let mut cur: Vec<f32> = channels
            .iter()
            .zip(raw_targets)
            .map(|(&ch, &raw)| self.read_or_default(ch, raw))
            .collect();

        let ticks = cur
            .iter()
            .zip(&targets)
            .map(|(&c, &t)| ((t - c).abs() / step).ceil() as u32)
            .max()
            .unwrap_or(0);

        for _ in 0..ticks {
            for (i, &ch) in channels.iter().enumerate() {
                let remaining = targets[i] - cur[i];
                if remaining == 0.0 {
                    continue;
                }
                if remaining.abs() <= step {
                    cur[i] = targets[i];
                } else {
                    cur[i] += step * remaining.signum();
                }
                self.write_effective(ch.index, cur[i])?;
            }
            sleep(delay).await;
        }

        for (i, &ch) in channels.iter().enumerate() {
            self.write_effective(ch.index, targets[i])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::channel::{ChannelMap, Leg};
    use crate::servo::testing::{FailingBackend, Recorder};

    const STEP: f32 = 3.0;

    fn driver() -> (ServoDriver, Recorder) {
        let recorder = Recorder::default();
        let driver = ServoDriver::new(Box::new(recorder.backend()));
        (driver, recorder)
    }

    #[tokio::test]
    async fn test_ramp_one_sequence() {
        let (mut drv, rec) = driver();
        let hip = ChannelMap::stock().hip(Leg::LF);

        drv.write(hip, 90.0).unwrap();
        rec.clear();
        drv.ramp_one(hip, 145.0, STEP, Duration::ZERO).await.unwrap();

        let mut expected: Vec<f32> = (1..=18).map(|k| 90.0 + 3.0 * k as f32).collect();
        expected.push(145.0);
        assert_eq!(rec.angles(hip.index), expected);
        assert_eq!(drv.commanded(hip.index), Some(145.0));
    }

    #[tokio::test]
    async fn test_ramp_one_already_at_target_writes_once() {
        let (mut drv, rec) = driver();
        let hip = ChannelMap::stock().hip(Leg::LF);

        drv.write(hip, 90.0).unwrap();
        rec.clear();
        drv.ramp_one(hip, 90.0, STEP, Duration::ZERO).await.unwrap();
        assert_eq!(rec.angles(hip.index), vec![90.0]);
    }

    #[tokio::test]
    async fn test_ramp_one_applies_inversion() {
        let (mut drv, rec) = driver();
        // RF hip is inverted: raw 65 -> effective 115
        let hip = ChannelMap::stock().hip(Leg::RF);

        drv.write(hip, 90.0).unwrap();
        assert_eq!(drv.commanded(hip.index), Some(90.0));
        rec.clear();
        drv.ramp_one(hip, 65.0, STEP, Duration::ZERO).await.unwrap();

        let writes = rec.angles(hip.index);
        assert_eq!(*writes.last().unwrap(), 115.0);
        assert_eq!(writes[0], 93.0);
    }

    #[tokio::test]
    async fn test_ramp_many_lockstep_ticks() {
        let (mut drv, rec) = driver();
        let map = ChannelMap::stock();
        let lf = map.knee(Leg::LF);
        let rf = map.knee(Leg::RF);

        drv.write(lf, 124.0).unwrap();
        // RF knee inverted: write raw 56 so effective current is 124 too
        drv.write(rf, 56.0).unwrap();
        rec.clear();

        // LF moves 124 -> 86 (13 ticks); RF stays put
        drv.ramp_many(&[lf, rf], &[86.0, 56.0], STEP, Duration::ZERO)
            .await
            .unwrap();

        let lf_writes = rec.angles(lf.index);
        // 12 full steps, one 2-degree tick, one exact snap
        assert_eq!(lf_writes.len(), 14);
        assert_eq!(lf_writes[0], 121.0);
        assert_eq!(lf_writes[11], 88.0);
        assert_eq!(lf_writes[12], 86.0);
        assert_eq!(lf_writes[13], 86.0);

        // Arrived channel gets no intermediate writes, only the final snap
        assert_eq!(rec.angles(rf.index), vec![124.0]);
    }

    #[tokio::test]
    async fn test_ramp_many_group_arrives_together() {
        let (mut drv, rec) = driver();
        let map = ChannelMap::stock();
        let lf = map.hip(Leg::LF);
        let lr = map.hip(Leg::LR);

        drv.write(lf, 90.0).unwrap();
        drv.write(lr, 130.0).unwrap();
        rec.clear();

        drv.ramp_many(&[lf, lr], &[145.0, 145.0], STEP, Duration::ZERO)
            .await
            .unwrap();

        // 55 degrees / 3 = 19 ticks; 15 degrees / 3 = 5 ticks
        assert_eq!(rec.angles(lf.index).len(), 19 + 1);
        assert_eq!(rec.angles(lr.index).len(), 5 + 1);
        assert_eq!(drv.commanded(lf.index), Some(145.0));
        assert_eq!(drv.commanded(lr.index), Some(145.0));

        // Lockstep: interleaved writes keep the pair within one step of
        // the same tick until the short channel arrives
        let order = rec.indices();
        let first_lf = order.iter().position(|&i| i == lf.index).unwrap();
        let first_lr = order.iter().position(|&i| i == lr.index).unwrap();
        assert!(first_lf < first_lr, "tick serves every channel in order");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_table_untouched() {
        let hip = ChannelMap::stock().hip(Leg::LF);
        let mut drv = ServoDriver::new(Box::new(FailingBackend));

        assert!(drv.write(hip, 90.0).is_err());
        assert_eq!(drv.commanded(hip.index), None);
        // Next ramp falls back to the caller-supplied default
        assert_eq!(drv.read_or_default(hip, 85.0), 85.0);
    }

    #[tokio::test]
    async fn test_read_or_default_inverts_default() {
        let (drv, _rec) = driver();
        let rf_hip = ChannelMap::stock().hip(Leg::RF);
        assert_eq!(drv.read_or_default(rf_hip, 65.0), 115.0);
    }
}
