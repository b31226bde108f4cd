//! Command-line interface for object-detect

use argh::FromArgs;
use std::path::PathBuf;

/// Detect objects in regions of stored images on broker command
#[derive(FromArgs, Debug, Default)]
pub struct Args {
    /// optional YAML configuration file; flags override its values
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// broker host name
    #[argh(option, short = 's')]
    pub message_server: Option<String>,

    /// broker port (default: 5672)
    #[argh(option)]
    pub message_port: Option<u16>,

    /// broker user name (default: guest)
    #[argh(option, short = 'u')]
    pub message_user: Option<String>,

    /// broker password (default: guest)
    #[argh(option, short = 'p')]
    pub message_password: Option<String>,

    /// queue to consume commands from (default: vision_cmd_detect-face)
    #[argh(option, short = 'q')]
    pub queue: Option<String>,

    /// haar cascade file name (default: haarcascade_frontalface_default.xml)
    #[argh(option)]
    pub classifier: Option<String>,

    /// directory holding cascade files (default: ./cascades)
    #[argh(option)]
    pub cascade_dir: Option<PathBuf>,

    /// name of the detected object (default: face)
    #[argh(option, short = 'n')]
    pub object_name: Option<String>,

    /// url of the image store; results are stored there when given
    #[argh(option, short = 'o')]
    pub store_url: Option<String>,
}
