// Gait state machines
//
// One parameterized loop per gait kind. Every gait checks its stop signal
// between phases only; a phase that has started always runs to completion,
// so cancellation granularity is one phase, never one ramp tick. On stop
// or preemption every gait parks the robot in the neutral stance before
// its task exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::gait::body::Body;
use crate::servo::{DiagPair, Leg, PwmError};

/// Travel direction for the crawl gait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// Turn direction for the in-place turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Turn {
    Left,
    Right,
}

impl Turn {
    /// The two knees pulsed during a turn cycle: the diagonal opposite
    /// the side doing the backward sweep
    fn pulse_legs(self) -> [Leg; 2] {
        match self {
            Turn::Left => DiagPair::B.legs(),
            Turn::Right => DiagPair::A.legs(),
        }
    }
}

/// Which gait is driving the servos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GaitKind {
    /// Locked-sync trot: diagonal pairs alternate swing and stance
    Trot,
    /// Sequential single-leg crawl
    Crawl(Direction),
    /// In-place turn
    Turn(Turn),
}

impl std::fmt::Display for GaitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GaitKind::Trot => write!(f, "trot"),
            GaitKind::Crawl(Direction::Forward) => write!(f, "crawl-forward"),
            GaitKind::Crawl(Direction::Backward) => write!(f, "crawl-backward"),
            GaitKind::Turn(Turn::Left) => write!(f, "turn-left"),
            GaitKind::Turn(Turn::Right) => write!(f, "turn-right"),
        }
    }
}

/// Cooperative stop signal shared between the supervisor and one gait task
#[derive(Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// Shared handle to the body; gait tasks lock it for one phase at a time
pub type SharedBody = Arc<Mutex<Body>>;

/// Fixed crawl order: diagonal-first, so consecutive swings never load
/// the same pair twice
const CRAWL_ORDER: [Leg; 4] = [Leg::LF, Leg::RR, Leg::RF, Leg::LR];

/// Run one gait until its stop signal is raised, then park neutral.
///
/// This is the body of every gait task the supervisor spawns. Hardware
/// write failures inside a cycle are logged and the loop continues
/// best-effort; a single transient miss must not strand the robot
/// mid-stride.
pub async fn run(kind: GaitKind, body: SharedBody, stop: StopSignal) {
    info!("gait {} starting", kind);
    match kind {
        GaitKind::Trot => trot(&body, &stop).await,
        GaitKind::Crawl(direction) => crawl(direction, &body, &stop).await,
        GaitKind::Turn(turn) => turn_in_place(turn, &body, &stop).await,
    }

    if let Err(e) = body.lock().await.park_neutral().await {
        warn!("parking after gait {}: {}", kind, e);
    }
    info!("gait {} stopped", kind);
}

fn log_phase_err(result: Result<(), PwmError>, what: &str) {
    if let Err(e) = result {
        warn!("{} failed, continuing: {}", what, e);
    }
}

/// Locked-sync trot: each cycle swings one diagonal pair while the other
/// holds stance, then swaps the roles.
async fn trot(body: &SharedBody, stop: &StopSignal) {
    let (hip_back, trot_dwell) = {
        let b = body.lock().await;
        (b.tuning().hip_back, b.tuning().trot_dwell)
    };
    log_phase_err(body.lock().await.bias_hips(hip_back).await, "trot entry pose");

    let mut swing = DiagPair::B;
    while !stop.is_raised() {
        // Both legs of the pair move via single synchronized calls; the
        // pair is in the same sub-phase at all times.
        log_phase_err(body.lock().await.weight_shift(swing).await, "weight shift");
        if stop.is_raised() {
            break;
        }
        log_phase_err(body.lock().await.lift_pair(swing).await, "pair lift");
        sleep(trot_dwell).await;
        if stop.is_raised() {
            break;
        }
        log_phase_err(
            body.lock().await.swing_pair_forward(swing).await,
            "pair swing",
        );
        sleep(trot_dwell).await;
        if stop.is_raised() {
            break;
        }
        log_phase_err(body.lock().await.lower_pair(swing).await, "pair lower");
        sleep(trot_dwell).await;
        if stop.is_raised() {
            break;
        }
        log_phase_err(
            body.lock().await.clear_weight_shift().await,
            "clear weight shift",
        );
        if stop.is_raised() {
            break;
        }
        // Stance push: all hips drive back together
        log_phase_err(body.lock().await.all_hips(hip_back).await, "stance push");
        sleep(trot_dwell).await;

        swing = swing.opposite();
    }
}

/// Crawl: swing one leg at a time in diagonal-first order, pushing all
/// hips toward the opposite extreme between swings.
async fn crawl(direction: Direction, body: &SharedBody, stop: &StopSignal) {
    let (hip_forward, hip_back, dwell) = {
        let b = body.lock().await;
        (b.tuning().hip_forward, b.tuning().hip_back, b.tuning().dwell)
    };
    // Bias toward the extreme the legs will swing to, push to the other
    let (swing_target, push_target) = match direction {
        Direction::Forward => (hip_forward, hip_back),
        Direction::Backward => (hip_back, hip_forward),
    };

    log_phase_err(
        body.lock().await.bias_hips(swing_target).await,
        "crawl entry pose",
    );

    'cycle: while !stop.is_raised() {
        for leg in CRAWL_ORDER {
            // Protect the swinging leg's pair by loading the other one
            log_phase_err(
                body.lock().await.weight_shift(leg.pair().opposite()).await,
                "weight shift",
            );
            if stop.is_raised() {
                break 'cycle;
            }
            log_phase_err(body.lock().await.lift(leg).await, "leg lift");
            sleep(dwell).await;
            if stop.is_raised() {
                break 'cycle;
            }
            let swung = match direction {
                Direction::Forward => body.lock().await.swing_forward(leg).await,
                Direction::Backward => body.lock().await.swing_back(leg).await,
            };
            log_phase_err(swung, "leg swing");
            sleep(dwell).await;
            if stop.is_raised() {
                break 'cycle;
            }
            log_phase_err(body.lock().await.lower(leg).await, "leg lower");
            sleep(dwell).await;
            if stop.is_raised() {
                break 'cycle;
            }
            log_phase_err(
                body.lock().await.clear_weight_shift().await,
                "clear weight shift",
            );
            if stop.is_raised() {
                break 'cycle;
            }
            log_phase_err(
                body.lock().await.all_hips(push_target).await,
                "stance push",
            );
            sleep(dwell).await;
            if stop.is_raised() {
                break 'cycle;
            }
        }
    }
}

/// In-place turn: rotate pose, pulse the outer diagonal knees, return to
/// neutral, repeat.
async fn turn_in_place(turn: Turn, body: &SharedBody, stop: &StopSignal) {
    let dwell = body.lock().await.tuning().dwell;
    log_phase_err(body.lock().await.park_neutral().await, "turn entry pose");

    while !stop.is_raised() {
        log_phase_err(body.lock().await.rotate_hips(turn).await, "rotate pose");
        sleep(dwell).await;
        if stop.is_raised() {
            break;
        }
        for leg in turn.pulse_legs() {
            log_phase_err(body.lock().await.pulse_knee(leg).await, "knee pulse");
            if stop.is_raised() {
                break;
            }
        }
        if stop.is_raised() {
            break;
        }
        log_phase_err(body.lock().await.hips_neutral().await, "hips neutral");
        sleep(dwell.mul_f32(0.5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::servo::testing::Recorder;
    use crate::servo::{ChannelMap, ServoDriver};

    fn shared_body() -> SharedBody {
        let recorder = Recorder::default();
        let driver = ServoDriver::new(Box::new(recorder.backend()));
        SharedBody::new(Mutex::new(Body::new(
            driver,
            ChannelMap::stock(),
            Tuning::instant(),
        )))
    }

    #[tokio::test]
    async fn test_gait_task_parks_neutral_on_stop() {
        let body = shared_body();
        let stop = StopSignal::default();

        let handle = tokio::spawn(run(
            GaitKind::Crawl(Direction::Forward),
            body.clone(),
            stop.clone(),
        ));
        stop.raise();
        handle.await.unwrap();

        let map = ChannelMap::stock();
        let b = body.lock().await;
        for leg in Leg::ALL {
            let hip = map.hip(leg);
            let knee = map.knee(leg);
            assert_eq!(
                b.driver().commanded(hip.index),
                Some(ServoDriver::effective(hip, 90.0))
            );
            assert_eq!(
                b.driver().commanded(knee.index),
                Some(ServoDriver::effective(knee, 124.0))
            );
        }
    }

    #[test]
    fn test_gait_kind_display() {
        assert_eq!(GaitKind::Trot.to_string(), "trot");
        assert_eq!(
            GaitKind::Crawl(Direction::Backward).to_string(),
            "crawl-backward"
        );
        assert_eq!(GaitKind::Turn(Turn::Right).to_string(), "turn-right");
    }
}
