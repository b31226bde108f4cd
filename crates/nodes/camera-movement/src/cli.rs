//! Command-line interface for camera-movement

use argh::FromArgs;
use std::path::PathBuf;

/// Detect movement in a JPEG stream and publish episodes to the image store
#[derive(FromArgs, Debug, Default)]
pub struct Args {
    /// optional YAML configuration file; flags override its values
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// jpeg stream used for input
    #[argh(option, short = 'i')]
    pub input_url: Option<String>,

    /// url of the image store
    #[argh(option, short = 'o')]
    pub output_url: Option<String>,

    /// name of the source camera (default: camera)
    #[argh(option, short = 'n')]
    pub camera_name: Option<String>,

    /// minimum changed area in pixels for a region to count as movement (default: 5000)
    #[argh(option, short = 't')]
    pub threshold: Option<f64>,

    /// enable broker notifications
    #[argh(switch, short = 'r')]
    pub messaging: bool,

    /// broker host name
    #[argh(option, short = 's')]
    pub message_server: Option<String>,

    /// broker port (default: 5672)
    #[argh(option)]
    pub message_port: Option<u16>,

    /// broker user name (default: guest)
    #[argh(option)]
    pub message_user: Option<String>,

    /// broker password (default: guest)
    #[argh(option)]
    pub message_password: Option<String>,
}
