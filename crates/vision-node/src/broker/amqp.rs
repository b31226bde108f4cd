//! AMQP 0-9-1 transport for the broker layer.
//!
//! Producers publish to the ingress exchange (`msg_gateway` by default) with
//! the app id and type tag as message properties and the bare JSON record as
//! the body. Consumers read a named, pre-provisioned durable queue with a
//! prefetch of one, so several worker processes on the same queue share its
//! load and each holds at most one unacknowledged command.
//!
//! ```text
//!   AmqpBroker ──basic_publish──► exchange ──► broker routing
//!        │
//!        └─ channel (qos 1) ──basic_consume──► AmqpCommandQueue ──basic_ack──►
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use std::time::Duration;

use super::{BrokerConfig, BrokerError, CommandQueue, Delivery, Envelope, EventBus};

/// Unacknowledged deliveries a consumer may hold.
pub const PREFETCH_COUNT: u16 = 1;

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Connection URI for `config`.
pub fn amqp_uri(config: &BrokerConfig) -> AMQPUri {
    let mut uri = AMQPUri::default();
    uri.authority.host = config.host.clone();
    uri.authority.port = config.port;
    uri.authority.userinfo.username = config.username.clone();
    uri.authority.userinfo.password = config.password.clone();
    uri.vhost = config.vhost.clone();
    uri.query.heartbeat = Some(config.heartbeat_secs);
    uri
}

/// An open connection with one channel for publishing.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    exchange: String,
}

impl AmqpBroker {
    /// Connect, open the publishing channel and fail if either takes longer
    /// than `connect_timeout_secs`.
    ///
    /// `name` shows up as the connection name in the broker's management UI.
    pub async fn connect(config: &BrokerConfig, name: &str) -> Result<Self, BrokerError> {
        config.validate().map_err(BrokerError::Connection)?;

        let properties = ConnectionProperties::default().with_connection_name(name.into());
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let connection =
            tokio::time::timeout(timeout, Connection::connect_uri(amqp_uri(config), properties))
                .await
                .map_err(|_| BrokerError::Timeout(timeout))?
                .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = connection.create_channel().await?;

        log::info!(
            "Connected to broker at {}:{} as '{}' (exchange '{}')",
            config.host,
            config.port,
            name,
            config.exchange
        );

        Ok(Self {
            connection,
            channel,
            exchange: config.exchange.clone(),
        })
    }

    /// Consume `queue` on a dedicated channel with a prefetch of one.
    ///
    /// The queue must already exist; it is checked with a passive declare so
    /// a missing queue fails startup instead of consuming nothing.
    pub async fn consume(&self, queue: &str) -> Result<AmqpCommandQueue, BrokerError> {
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await?;

        let declared = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        log::info!(
            "Consuming '{}' ({} messages waiting)",
            queue,
            declared.message_count()
        );

        let consumer = channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(AmqpCommandQueue {
            channel,
            consumer,
            in_flight: None,
        })
    }

    /// Close the connection; unacknowledged deliveries go back to their queue.
    pub async fn disconnect(&self) {
        if let Err(e) = self.connection.close(REPLY_SUCCESS, "shutdown").await {
            log::warn!("Broker disconnect failed: {}", e);
        } else {
            log::info!("Disconnected from broker");
        }
    }
}

#[async_trait]
impl EventBus for AmqpBroker {
    async fn publish(&self, routing_key: &str, envelope: &Envelope) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_app_id(envelope.app_id.as_str().into())
            .with_kind(envelope.kind.as_str().into());
        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &envelope.body,
                properties,
            )
            .await?
            .await?;
        log::debug!("Published {} ({})", routing_key, envelope.kind);
        Ok(())
    }
}

/// Acknowledged, one-at-a-time consumption of a queue.
pub struct AmqpCommandQueue {
    channel: Channel,
    consumer: Consumer,
    in_flight: Option<(u64, Acker)>,
}

impl AmqpCommandQueue {
    /// Close the consuming channel; an unacknowledged delivery is requeued.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "shutdown").await {
            log::debug!("Consumer channel close failed: {}", e);
        }
    }
}

#[async_trait]
impl CommandQueue for AmqpCommandQueue {
    async fn next(&mut self) -> Result<Option<Delivery>, BrokerError> {
        if let Some((tag, _)) = &self.in_flight {
            return Err(BrokerError::InFlight(*tag));
        }

        let delivery = match self.consumer.next().await {
            Some(delivery) => delivery?,
            None => return Ok(None),
        };
        log::debug!(
            "Received delivery {} on '{}'",
            delivery.delivery_tag,
            delivery.routing_key.as_str()
        );

        let tag = delivery.delivery_tag;
        self.in_flight = Some((tag, delivery.acker));
        Ok(Some(Delivery {
            tag,
            routing_key: delivery.routing_key.as_str().to_string(),
            payload: delivery.data,
        }))
    }

    async fn ack(&mut self, delivery: Delivery) -> Result<(), BrokerError> {
        match self.in_flight.take() {
            Some((tag, acker)) if tag == delivery.tag => {
                acker.ack(BasicAckOptions::default()).await?;
                Ok(())
            }
            other => {
                self.in_flight = other;
                Err(BrokerError::UnknownDelivery(delivery.tag))
            }
        }
    }
}
