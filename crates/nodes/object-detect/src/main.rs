//! object-detect binary

use object_detect::cli::Args;
use object_detect::{Config, ObjectDetectNode};
use vision_node::{run_node, setup_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    let args: Args = argh::from_env();
    let config = Config::from_args(args)?;
    run_node::<ObjectDetectNode>(config).await?;
    Ok(())
}
