// Command loop: zenoh verbs in, gait supervision out
//
// The control surface (HTTP, chat, speech) lives in other processes; they
// publish one of six verbs and read back a status string. This loop is the
// only writer path to the servos.

use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{STATE_HZ, TOPIC_CMD_MOTION, TOPIC_RT_STATUS, TOPIC_STATE_GAIT, Tuning};
use crate::gait::{Body, Supervisor};
use crate::messages::{CommandAck, ControllerState, MotionCommand};
use crate::servo::{ChannelMap, DryRunBackend, Pca9685, PwmBackend, ServoDriver};

pub async fn run(bus: u8, dry_run: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MOTION).await?;
    let pub_status = session.declare_publisher(TOPIC_RT_STATUS).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_GAIT).await?;

    let backend: Box<dyn PwmBackend> = if dry_run {
        info!("Dry-run mode: servo writes are logged, not sent");
        Box::new(DryRunBackend)
    } else {
        info!("Opening PCA9685 on I2C bus {}", bus);
        Box::new(Pca9685::open(bus)?)
    };
    let driver = ServoDriver::new(backend);
    let mut body = Body::new(driver, ChannelMap::stock(), Tuning::default());

    info!("Setup: knees down, hips neutral...");
    body.park_neutral().await?;
    let mut supervisor = Supervisor::new(body);

    let mut tick = interval(Duration::from_millis(1000 / STATE_HZ));

    info!("Runtime started");
    info!("Subscribed to: {}", TOPIC_CMD_MOTION);
    info!("Publishing to: {}, {}", TOPIC_RT_STATUS, TOPIC_STATE_GAIT);

    loop {
        tokio::select! {
            sample = subscriber.recv_async() => {
                let sample = sample?;
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<MotionCommand>(&payload) {
                    Ok(cmd) => {
                        let status = supervisor.dispatch(cmd).await;
                        info!("Command {:?}: {}", cmd, status);
                        let ack = CommandAck { command: cmd, status };
                        pub_status.put(serde_json::to_string(&ack)?).await?;
                    }
                    Err(e) => {
                        warn!("Failed to parse command: {}", e);
                    }
                }
            }
            _ = tick.tick() => {
                let state = ControllerState { gait: supervisor.current() };
                pub_state.put(serde_json::to_string(&state)?).await?;
            }
        }
    }
}
