//! Broker layer: messages, routing keys, publishing and command consumption.
//!
//! Nodes talk to a topic-routed broker through two narrow seams:
//! [`EventBus`] for fire-and-forget publishing and [`CommandQueue`] for
//! acknowledged, one-at-a-time consumption. [`amqp`] implements both.

pub mod amqp;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use amqp::{AmqpBroker, AmqpCommandQueue};

/// Ingress exchange every producer publishes to.
pub const GATEWAY_EXCHANGE: &str = "msg_gateway";

/// Routing key of movement notifications from camera nodes.
pub const MOVEMENT_KEY: &str = "vision.evt.detected-movement";

/// Type tag carried by content notifications and detection results.
pub const IMAGE_CONTENT_TYPE: &str = "ImageContent";

/// Routing key for results about `object_name`, e.g. `vision.evt.detected-face`.
pub fn detected_key(object_name: &str) -> String {
    format!("vision.evt.detected-{}", object_name)
}

/// Routing key of a camera's liveness message.
pub fn status_online_key(camera_name: &str) -> String {
    format!("vision.{}.status-online", camera_name)
}

/// Errors from the broker transport.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("no connection to the broker within {0:?}")]
    Timeout(Duration),

    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("delivery {0} is still being processed")]
    InFlight(u64),

    #[error("unknown delivery {0}")]
    UnknownDelivery(u64),
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_port() -> u16 {
    5672
}

fn default_credential() -> String {
    "guest".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_exchange() -> String {
    GATEWAY_EXCHANGE.to_string()
}

fn default_heartbeat() -> u16 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl BrokerConfig {
    /// Settings for `host` with every other field at its default.
    pub fn for_host(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: default_port(),
            username: default_credential(),
            password: default_credential(),
            vhost: default_vhost(),
            exchange: default_exchange(),
            heartbeat_secs: default_heartbeat(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("broker host must not be empty".into());
        }
        if self.exchange.trim().is_empty() {
            return Err("broker exchange must not be empty".into());
        }
        if self.heartbeat_secs != 0 && self.heartbeat_secs < 5 {
            return Err(format!(
                "broker heartbeat_secs must be 0 or at least 5, got {}",
                self.heartbeat_secs
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err("broker connect_timeout_secs must be positive".into());
        }
        Ok(())
    }
}

/// A message as published: the raw body plus its app id and type properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub app_id: String,
    pub kind: String,
    pub body: Vec<u8>,
}

impl Envelope {
    /// A message whose body is `body` serialized as bare JSON.
    pub fn json<T: Serialize>(app_id: &str, kind: &str, body: &T) -> Result<Self, BrokerError> {
        Ok(Self {
            app_id: app_id.to_string(),
            kind: kind.to_string(),
            body: serde_json::to_vec(body)?,
        })
    }

    pub fn text(app_id: &str, kind: &str, text: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            kind: kind.to_string(),
            body: text.as_bytes().to_vec(),
        }
    }

    /// Decode the JSON body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Publishing side of the broker.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, routing_key: &str, envelope: &Envelope) -> Result<(), BrokerError>;
}

/// A received message awaiting acknowledgement.
#[derive(Debug)]
pub struct Delivery {
    pub tag: u64,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

impl Delivery {
    /// Decode the JSON body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Consuming side of the broker.
///
/// At most one delivery is handed out at a time: `next` refuses to return a
/// new delivery until the previous one has been acknowledged.
#[async_trait]
pub trait CommandQueue: Send {
    /// Wait for the next delivery. `Ok(None)` means the queue is closed.
    async fn next(&mut self) -> Result<Option<Delivery>, BrokerError>;

    /// Acknowledge a delivery; it is not redelivered afterwards.
    async fn ack(&mut self, delivery: Delivery) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetectionCommand;
    use serde_json::json;

    #[test]
    fn test_routing_keys() {
        assert_eq!(detected_key("face"), "vision.evt.detected-face");
        assert_eq!(status_online_key("front"), "vision.front.status-online");
    }

    #[test]
    fn test_envelope_body_is_bare_json() {
        let envelope =
            Envelope::json("cato-detect", IMAGE_CONTENT_TYPE, &json!({"X": 1})).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&envelope.body).unwrap();
        assert_eq!(value, json!({"X": 1}));
        assert_eq!(envelope.app_id, "cato-detect");
        assert_eq!(envelope.kind, "ImageContent");
    }

    #[test]
    fn test_text_envelope() {
        let envelope = Envelope::text("camera-movement", "status", "Camera [a] starting");
        assert_eq!(envelope.body, b"Camera [a] starting");
        assert!(envelope.decode::<serde_json::Value>().is_err());
    }

    #[test]
    fn test_delivery_decodes_command() {
        let command = json!({
            "CommandId": "c-1",
            "ImageId": "abc_1.jpg",
            "ImageUrl": "http://store/api/image/abc_1.jpg",
            "X": 10, "Y": 20, "Width": 100, "Height": 80
        });
        let delivery = Delivery {
            tag: 1,
            routing_key: "vision.cmd.detect-face".into(),
            payload: command.to_string().into_bytes(),
        };
        let decoded: DetectionCommand = delivery.decode().unwrap();
        assert_eq!(decoded.command_id, "c-1");
    }

    #[test]
    fn test_delivery_rejects_garbage() {
        let delivery = Delivery {
            tag: 1,
            routing_key: String::new(),
            payload: b"not json".to_vec(),
        };
        assert!(delivery.decode::<DetectionCommand>().is_err());
    }

    #[test]
    fn test_broker_config_defaults() {
        let config: BrokerConfig = serde_yaml::from_str("host: rabbit").unwrap();
        assert_eq!(config, BrokerConfig::for_host("rabbit"));
        assert_eq!(config.port, 5672);
        assert_eq!(config.exchange, "msg_gateway");
        assert_eq!(config.vhost, "/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_broker_config_validation() {
        let mut config = BrokerConfig::for_host(" ");
        assert!(config.validate().is_err());
        config.host = "rabbit".into();
        config.heartbeat_secs = 2;
        assert!(config.validate().is_err());
        config.heartbeat_secs = 0;
        assert!(config.validate().is_ok());
        config.exchange = String::new();
        assert!(config.validate().is_err());
    }
}
