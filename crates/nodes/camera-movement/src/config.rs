use serde::{Deserialize, Serialize};
use std::time::Duration;
use vision_node::broker::BrokerConfig;
use vision_node::config::load_config_or_default;
use vision_node::NodeError;

use crate::change_detector::DEFAULT_AREA_THRESHOLD;
use crate::cli::Args;
use crate::sequence::TAIL_FRAME_LIMIT;

/// Camera-movement node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// URL of the multipart JPEG stream
    #[serde(default)]
    pub input_url: String,
    /// Base URL of the image store
    #[serde(default)]
    pub store_url: String,
    /// Camera name, used as record source and in the liveness routing key
    #[serde(default = "default_camera_name")]
    pub camera_name: String,
    /// Minimum contour area (pixels²) for a region to count as movement
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Non-detecting frames an episode may coast through before closing
    #[serde(default = "default_tail_frame_limit")]
    pub tail_frame_limit: u32,
    /// Timeout for each image store call
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Timeout for fetching one frame from the stream
    #[serde(default = "default_timeout_secs")]
    pub frame_timeout_secs: u64,
    /// Broker settings; notifications are disabled when absent
    #[serde(default)]
    pub broker: Option<BrokerConfig>,
}

fn default_camera_name() -> String {
    "camera".to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_AREA_THRESHOLD
}

fn default_tail_frame_limit() -> u32 {
    TAIL_FRAME_LIMIT
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_url: String::new(),
            store_url: String::new(),
            camera_name: default_camera_name(),
            threshold: default_threshold(),
            tail_frame_limit: default_tail_frame_limit(),
            http_timeout_secs: default_timeout_secs(),
            frame_timeout_secs: default_timeout_secs(),
            broker: None,
        }
    }
}

impl Config {
    /// Load the optional config file and apply command-line overrides.
    pub fn from_args(args: Args) -> Result<Self, NodeError> {
        let mut config: Config = load_config_or_default(args.config.as_deref())?;

        if let Some(url) = args.input_url {
            config.input_url = url;
        }
        if let Some(url) = args.output_url {
            config.store_url = url;
        }
        if let Some(name) = args.camera_name {
            config.camera_name = name;
        }
        if let Some(threshold) = args.threshold {
            config.threshold = threshold;
        }

        if args.messaging {
            let host = args
                .message_server
                .or_else(|| config.broker.as_ref().map(|b| b.host.clone()))
                .ok_or_else(|| {
                    NodeError::Config("messaging enabled but no broker host given".into())
                })?;
            let broker = config
                .broker
                .get_or_insert_with(|| BrokerConfig::for_host(&host));
            broker.host = host;
            if let Some(port) = args.message_port {
                broker.port = port;
            }
            if let Some(user) = args.message_user {
                broker.username = user;
            }
            if let Some(password) = args.message_password {
                broker.password = password;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.input_url.is_empty() {
            return Err(NodeError::Config("input url is required".into()));
        }
        if self.store_url.is_empty() {
            return Err(NodeError::Config("image store url is required".into()));
        }
        if self.camera_name.is_empty() || self.camera_name.contains(&['.', '*', '#'][..]) {
            return Err(NodeError::Config(format!(
                "invalid camera name '{}'",
                self.camera_name
            )));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(NodeError::Config(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if self.http_timeout_secs == 0 || self.frame_timeout_secs == 0 {
            return Err(NodeError::Config("timeouts must be positive".into()));
        }
        if let Some(broker) = &self.broker {
            broker.validate().map_err(NodeError::Config)?;
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_secs)
    }
}
