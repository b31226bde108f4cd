use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vision_node::broker::BrokerConfig;
use vision_node::config::load_config_or_default;
use vision_node::NodeError;

use crate::cli::Args;

/// Object-detect node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Broker to consume commands from and publish results to
    pub broker: Option<BrokerConfig>,
    /// Pre-provisioned durable queue shared by every worker for this object
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Cascade file name inside `cascade_dir`
    #[serde(default = "default_classifier")]
    pub classifier: String,
    #[serde(default = "default_cascade_dir")]
    pub cascade_dir: PathBuf,
    /// Label for detections; also picks the result routing key
    #[serde(default = "default_object_name")]
    pub object_name: String,
    /// Image store for results; results are only published when absent
    #[serde(default)]
    pub store_url: Option<String>,
    /// Timeout for each image fetch and store call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_queue() -> String {
    "vision_cmd_detect-face".to_string()
}

fn default_classifier() -> String {
    "haarcascade_frontalface_default.xml".to_string()
}

fn default_cascade_dir() -> PathBuf {
    PathBuf::from("./cascades")
}

fn default_object_name() -> String {
    "face".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: None,
            queue: default_queue(),
            classifier: default_classifier(),
            cascade_dir: default_cascade_dir(),
            object_name: default_object_name(),
            store_url: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Config {
    /// Load the optional config file and apply command-line overrides.
    pub fn from_args(args: Args) -> Result<Self, NodeError> {
        let mut config: Config = load_config_or_default(args.config.as_deref())?;

        if let Some(host) = args.message_server {
            let broker = config
                .broker
                .get_or_insert_with(|| BrokerConfig::for_host(&host));
            broker.host = host;
        }
        if let Some(broker) = config.broker.as_mut() {
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
        if let Some(queue) = args.queue {
            config.queue = queue;
        }
        if let Some(classifier) = args.classifier {
            config.classifier = classifier;
        }
        if let Some(dir) = args.cascade_dir {
            config.cascade_dir = dir;
        }
        if let Some(name) = args.object_name {
            config.object_name = name;
        }
        if let Some(url) = args.store_url {
            config.store_url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        let broker = self
            .broker
            .as_ref()
            .ok_or_else(|| NodeError::Config("broker host is required".into()))?;
        broker.validate().map_err(NodeError::Config)?;

        if self.queue.is_empty() {
            return Err(NodeError::Config("queue must be set".into()));
        }
        if self.object_name.is_empty() || self.object_name.contains(&['.', '*', '#'][..]) {
            return Err(NodeError::Config(format!(
                "invalid object name '{}'",
                self.object_name
            )));
        }
        if self.classifier.is_empty() {
            return Err(NodeError::Config("classifier file name is required".into()));
        }
        if self.store_url.as_deref() == Some("") {
            return Err(NodeError::Config("image store url must not be empty".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(NodeError::Config("http timeout must be positive".into()));
        }
        Ok(())
    }

    /// Path of the cascade file.
    pub fn classifier_path(&self) -> PathBuf {
        Path::new(&self.cascade_dir).join(&self.classifier)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
