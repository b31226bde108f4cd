//! camera-movement binary

use camera_movement::cli::Args;
use camera_movement::{CameraMovementNode, Config};
use vision_node::{run_node, setup_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    let args: Args = argh::from_env();
    let config = Config::from_args(args)?;
    run_node::<CameraMovementNode>(config).await?;
    Ok(())
}
