// Gait supervisor
//
// Owns the single "current gait" handle. Starting a gait preempts the one
// in progress by raising its stop signal and joining its task, so the old
// loop has provably ceased writing before the new one is spawned; two
// gait loops can never drive the shared channels at once.

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::Tuning;
use crate::gait::body::Body;
use crate::gait::machine::{self, Direction, GaitKind, SharedBody, StopSignal, Turn};
use crate::messages::MotionCommand;

struct ActiveGait {
    kind: GaitKind,
    stop: StopSignal,
    handle: JoinHandle<()>,
}

pub struct Supervisor {
    body: SharedBody,
    tune: Tuning,
    active: Option<ActiveGait>,
}

impl Supervisor {
    pub fn new(body: Body) -> Self {
        let tune = body.tuning().clone();
        Self {
            body: SharedBody::new(tokio::sync::Mutex::new(body)),
            tune,
            active: None,
        }
    }

    /// The gait currently driving the servos, if any
    pub fn current(&self) -> Option<GaitKind> {
        self.active
            .as_ref()
            .filter(|a| !a.handle.is_finished())
            .map(|a| a.kind)
    }

    /// Shared body handle (for callers that need posture access)
    pub fn body(&self) -> SharedBody {
        self.body.clone()
    }

    /// Signal the active gait to stop and wait for its task to exit.
    ///
    /// The join is the ordering guarantee: the previous loop has parked
    /// and returned before this resolves. The wait is bounded by the
    /// preempt timeout; a task that overruns it is aborted.
    async fn preempt(&mut self) {
        let Some(prev) = self.active.take() else {
            return;
        };
        info!("preempting gait {}", prev.kind);
        prev.stop.raise();

        let abort = prev.handle.abort_handle();
        if timeout(self.tune.preempt_timeout, prev.handle).await.is_err() {
            warn!(
                "gait {} did not exit within {:?}, aborting its task",
                prev.kind, self.tune.preempt_timeout
            );
            abort.abort();
        }
    }

    /// Stop whatever is running, then launch `kind` on its own task
    pub async fn start(&mut self, kind: GaitKind) -> String {
        self.preempt().await;

        let stop = StopSignal::default();
        let handle = tokio::spawn(machine::run(kind, self.body.clone(), stop.clone()));
        self.active = Some(ActiveGait { kind, stop, handle });

        match kind {
            GaitKind::Trot => "Moving forward (locked-sync trot)...".to_string(),
            GaitKind::Crawl(Direction::Forward) => "Moving forward (crawl gait)...".to_string(),
            GaitKind::Crawl(Direction::Backward) => "Moving backward (crawl gait)...".to_string(),
            GaitKind::Turn(Turn::Left) => "Turning left...".to_string(),
            GaitKind::Turn(Turn::Right) => "Turning right...".to_string(),
        }
    }

    /// Stop the active gait and park neutral before returning, so the
    /// caller gets synchronous confirmation of "stopped"
    pub async fn stop(&mut self) -> String {
        self.preempt().await;
        if let Err(e) = self.body.lock().await.park_neutral().await {
            warn!("parking neutral on stop: {}", e);
        }
        "Stopping and parking neutral.".to_string()
    }

    /// Park neutral without touching the active gait. Serializes with a
    /// running gait at phase granularity through the body mutex.
    pub async fn neutral(&mut self) -> String {
        if let Err(e) = self.body.lock().await.park_neutral().await {
            warn!("parking neutral: {}", e);
        }
        "Neutral stance.".to_string()
    }

    /// Map a command verb onto the controller
    pub async fn dispatch(&mut self, cmd: MotionCommand) -> String {
        match cmd {
            MotionCommand::Forward => self.start(GaitKind::Trot).await,
            MotionCommand::Backward => self.start(GaitKind::Crawl(Direction::Backward)).await,
            MotionCommand::Left => self.start(GaitKind::Turn(Turn::Left)).await,
            MotionCommand::Right => self.start(GaitKind::Turn(Turn::Right)).await,
            MotionCommand::Stop => self.stop().await,
            MotionCommand::Neutral => self.neutral().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::testing::Recorder;
    use crate::servo::{ChannelMap, Leg, ServoDriver};

    fn supervisor() -> (Supervisor, Recorder) {
        let recorder = Recorder::default();
        let driver = ServoDriver::new(Box::new(recorder.backend()));
        let body = Body::new(driver, ChannelMap::stock(), Tuning::instant());
        (Supervisor::new(body), recorder)
    }

    #[tokio::test]
    async fn test_start_switch_never_two_active() {
        let (mut sup, _rec) = supervisor();

        sup.start(GaitKind::Trot).await;
        assert_eq!(sup.current(), Some(GaitKind::Trot));

        // Starting a second gait joins the first before spawning
        sup.start(GaitKind::Turn(Turn::Left)).await;
        assert_eq!(sup.current(), Some(GaitKind::Turn(Turn::Left)));

        sup.stop().await;
        assert_eq!(sup.current(), None);
    }

    #[tokio::test]
    async fn test_start_same_gait_twice_restarts() {
        let (mut sup, _rec) = supervisor();

        let first = sup.start(GaitKind::Trot).await;
        let second = sup.start(GaitKind::Trot).await;
        assert_eq!(first, second);
        assert_eq!(sup.current(), Some(GaitKind::Trot));

        sup.stop().await;
        assert_eq!(sup.current(), None);
    }

    #[tokio::test]
    async fn test_stop_parks_neutral() {
        let (mut sup, _rec) = supervisor();

        sup.start(GaitKind::Crawl(Direction::Backward)).await;
        sup.stop().await;

        let map = ChannelMap::stock();
        let body = sup.body();
        let body = body.lock().await;
        for leg in Leg::ALL {
            let hip = map.hip(leg);
            let knee = map.knee(leg);
            assert_eq!(
                body.driver().commanded(hip.index),
                Some(ServoDriver::effective(hip, 90.0))
            );
            assert_eq!(
                body.driver().commanded(knee.index),
                Some(ServoDriver::effective(knee, 124.0))
            );
        }
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_immediate_and_idempotent() {
        let (mut sup, rec) = supervisor();

        sup.stop().await;
        let snapshot: Vec<Option<f32>> = {
            let body = sup.body();
            let body = body.lock().await;
            (0..16).map(|i| body.driver().commanded(i)).collect()
        };

        rec.clear();
        sup.stop().await;

        let body = sup.body();
        let body = body.lock().await;
        let after: Vec<Option<f32>> = (0..16).map(|i| body.driver().commanded(i)).collect();
        assert_eq!(snapshot, after);
        assert!(rec.write_count() > 0, "stop still writes the neutral pose");
    }

    #[tokio::test]
    async fn test_dispatch_maps_verbs() {
        let (mut sup, _rec) = supervisor();

        sup.dispatch(MotionCommand::Forward).await;
        assert_eq!(sup.current(), Some(GaitKind::Trot));

        sup.dispatch(MotionCommand::Backward).await;
        assert_eq!(sup.current(), Some(GaitKind::Crawl(Direction::Backward)));

        sup.dispatch(MotionCommand::Right).await;
        assert_eq!(sup.current(), Some(GaitKind::Turn(Turn::Right)));

        sup.dispatch(MotionCommand::Stop).await;
        assert_eq!(sup.current(), None);

        let status = sup.dispatch(MotionCommand::Neutral).await;
        assert_eq!(status, "Neutral stance.");
        assert_eq!(sup.current(), None);
    }
}
