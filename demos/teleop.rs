// Keyboard teleop: W/S walk, A/D turn, Space stop, N neutral, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use quadruped_gait_runtime::config::{TOPIC_CMD_MOTION, TOPIC_RT_STATUS};
use quadruped_gait_runtime::messages::{CommandAck, MotionCommand};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Controls: W=forward, S=backward, A=left, D=right, Space=stop, N=neutral, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&session).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    session: &zenoh::Session,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let publisher = session.declare_publisher(TOPIC_CMD_MOTION).await?;
    let acks = session.declare_subscriber(TOPIC_RT_STATUS).await?;

    loop {
        // Poll for key with 20ms timeout
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                if !pressed {
                    continue;
                }

                let cmd = match code {
                    KeyCode::Char('w') => Some(MotionCommand::Forward),
                    KeyCode::Char('s') => Some(MotionCommand::Backward),
                    KeyCode::Char('a') => Some(MotionCommand::Left),
                    KeyCode::Char('d') => Some(MotionCommand::Right),
                    KeyCode::Char(' ') => Some(MotionCommand::Stop),
                    KeyCode::Char('n') => Some(MotionCommand::Neutral),
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => None,
                };

                if let Some(cmd) = cmd {
                    publisher.put(serde_json::to_string(&cmd)?).await?;
                    info!("Sent: {:?}", cmd);
                }
            }
        }

        // Print any status replies from the runtime
        while let Ok(Some(sample)) = acks.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<CommandAck>(&payload) {
                Ok(ack) => info!("Robot: {}", ack.status),
                Err(e) => warn!("Bad ack payload: {}", e),
            }
        }
    }

    // Park the robot on the way out
    publisher
        .put(serde_json::to_string(&MotionCommand::Stop)?)
        .await?;
    Ok(())
}
