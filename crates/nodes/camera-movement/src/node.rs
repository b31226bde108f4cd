use std::time::Duration;

use vision_node::broker::{AmqpBroker, MOVEMENT_KEY};
use vision_node::prelude::*;
use vision_node::store::HttpImageStore;

use crate::change_detector::ChangeDetector;
use crate::config::Config;
use crate::frame_source::{FrameSource, MjpegFrameSource};
use crate::pipeline::{FrameOutcome, MovementPipeline};
use crate::publisher::EventPublisher;
use crate::sequence::SequenceTracker;

/// Pause before reconnecting after a failed frame fetch.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Camera movement node: frames in, episodes out.
pub struct CameraMovementNode {
    source: Box<dyn FrameSource>,
    pipeline: MovementPipeline,
    broker: Option<Arc<AmqpBroker>>,
}

impl CameraMovementNode {
    /// Assemble a node from already-built parts.
    pub fn new(source: Box<dyn FrameSource>, pipeline: MovementPipeline) -> Self {
        Self {
            source,
            pipeline,
            broker: None,
        }
    }
}

#[async_trait]
impl VisionNode for CameraMovementNode {
    type Config = Config;

    fn metadata() -> NodeMetadata {
        node_metadata!(
            publishes: &[MOVEMENT_KEY, "vision.<camera>.status-online"],
            consumes: &[],
        )
    }

    async fn init(config: Config) -> Result<Self, NodeError> {
        config.validate()?;
        info!(
            "Camera '{}' reading {} (threshold {}), store {}",
            config.camera_name, config.input_url, config.threshold, config.store_url
        );

        let http = vision_node::http_client(config.http_timeout())?;
        let store: Arc<dyn ImageStore> = Arc::new(HttpImageStore::new(http, &config.store_url));
        let source = MjpegFrameSource::new(&config.input_url, config.frame_timeout())
            .map_err(|e| NodeError::Init(format!("frame source: {e}")))?;

        let broker = match &config.broker {
            Some(broker_config) => {
                let name = format!("camera-movement-{}", config.camera_name);
                let broker = AmqpBroker::connect(broker_config, &name).await?;
                info!("Messaging enabled via {}:{}", broker_config.host, broker_config.port);
                Some(Arc::new(broker))
            }
            None => {
                info!("Messaging disabled");
                None
            }
        };
        let bus = broker.clone().map(|b| b as Arc<dyn EventBus>);

        let publisher = EventPublisher::new(store, bus, &config.camera_name);
        publisher.announce().await;

        let pipeline = MovementPipeline::new(
            ChangeDetector::new(config.threshold),
            SequenceTracker::new(config.tail_frame_limit),
            publisher,
        );
        Ok(Self {
            source: Box::new(source),
            pipeline,
            broker,
        })
    }

    async fn run(mut self, mut shutdown: watch::Receiver<()>) -> Result<(), NodeError> {
        let mut frames = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = self.source.next_frame() => next,
            };

            match next {
                Ok(Some(encoded)) => {
                    frames += 1;
                    let outcome = self.pipeline.process(encoded).await;
                    if let FrameOutcome::Published { slot, report } = outcome {
                        debug!(
                            "Frame {} -> {}_{} {:?}",
                            frames, slot.correlation_id, slot.sequence_number, report
                        );
                    }
                }
                Ok(None) => debug!("No frame this iteration"),
                Err(e) => {
                    warn!("Frame fetch failed: {}", e);
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!("Processed {} frames", frames);
        if let Some(broker) = &self.broker {
            broker.disconnect().await;
        }
        Ok(())
    }
}
