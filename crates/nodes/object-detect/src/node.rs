use vision_node::broker::AmqpBroker;
use vision_node::prelude::*;
use vision_node::store::{HttpImageFetcher, HttpImageStore};

use crate::classifier::load_classifier;
use crate::config::Config;
use crate::worker::DetectionWorker;

/// Detection node: commands in, detections out.
pub struct ObjectDetectNode {
    broker: Arc<AmqpBroker>,
    queue: String,
    worker: DetectionWorker,
}

#[async_trait]
impl VisionNode for ObjectDetectNode {
    type Config = Config;

    fn metadata() -> NodeMetadata {
        node_metadata!(
            publishes: &["vision.evt.detected-<object>"],
            consumes: &["vision_cmd_detect-<object> (queue)"],
        )
    }

    async fn init(config: Config) -> Result<Self, NodeError> {
        config.validate()?;
        let broker_config = config
            .broker
            .as_ref()
            .ok_or_else(|| NodeError::Config("broker host is required".into()))?;

        let classifier_path = config.classifier_path();
        let classifier =
            load_classifier(&classifier_path).map_err(|e| NodeError::Init(e.to_string()))?;

        let http = vision_node::http_client(config.http_timeout())?;
        let fetcher = Arc::new(HttpImageFetcher::new(http.clone()));
        let store = config.store_url.as_deref().map(|url| {
            info!("Results are stored in {}", url);
            Arc::new(HttpImageStore::new(http.clone(), url)) as Arc<dyn ImageStore>
        });

        let name = format!("object-detect-{}", config.object_name);
        let broker = Arc::new(AmqpBroker::connect(broker_config, &name).await?);
        let bus: Arc<dyn EventBus> = broker.clone();

        let worker = DetectionWorker::new(
            fetcher,
            Arc::from(classifier),
            store,
            bus,
            &config.object_name,
        );
        info!(
            "Detecting '{}' from queue {}, results on {}",
            config.object_name,
            config.queue,
            worker.result_key()
        );

        Ok(Self {
            broker,
            queue: config.queue,
            worker,
        })
    }

    async fn run(mut self, shutdown: watch::Receiver<()>) -> Result<(), NodeError> {
        let mut queue = self.broker.consume(&self.queue).await?;
        let result = self.worker.run(&mut queue, shutdown).await;

        info!("Handled {} commands", self.worker.handled());
        queue.close().await;
        self.broker.disconnect().await;
        result.map_err(NodeError::from)
    }
}
