use clap::Parser;
use tracing_subscriber::EnvFilter;

use quadruped_gait_runtime::config::DEFAULT_I2C_BUS;

#[derive(Parser)]
#[command(about = "Quadruped gait runtime: servo supervision over zenoh")]
struct Args {
    /// I2C bus the PCA9685 is wired to
    #[arg(long, default_value_t = DEFAULT_I2C_BUS)]
    bus: u8,

    /// Log servo writes instead of driving hardware
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    if let Err(e) = quadruped_gait_runtime::runtime::run(args.bus, args.dry_run).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
