//! Command handling for the detection node.
//!
//! One command is processed at a time:
//!
//! 1. decode the [`DetectionCommand`] from the delivery
//! 2. fetch the stored image and decode it
//! 3. crop to the command's rectangle (clamped to the image) and grayscale it
//! 4. classify the crop
//! 5. for every hit, store (optional) and publish a result in image coordinates
//! 6. acknowledge the delivery
//!
//! Any failure in steps 1-4 yields zero results. The delivery is acknowledged
//! exactly once in every case, so a bad command or a missing image is never
//! redelivered.

use std::sync::Arc;

use image::GrayImage;
use thiserror::Error;
use tokio::sync::watch;
use vision_node::broker::{
    detected_key, BrokerError, CommandQueue, Delivery, Envelope, EventBus, IMAGE_CONTENT_TYPE,
};
use vision_node::geometry::Rect;
use vision_node::models::{ContentRecord, DetectionCommand};
use vision_node::store::{ImageFetcher, ImageStore, StoreError};

use crate::classifier::{Classifier, ClassifierError};

/// App id on every result; also the content source name.
pub const APP_ID: &str = "cato-detect";

/// Reasons a command produced no results.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid command: {0}")]
    Command(#[from] serde_json::Error),
    #[error("image fetch failed: {0}")]
    Fetch(#[from] StoreError),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("region {rect:?} lies outside the {width}x{height} image")]
    EmptyCrop { rect: Rect, width: u32, height: u32 },
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("classifier task failed: {0}")]
    Task(String),
}

/// Everything a worker needs to handle commands.
pub struct DetectionWorker {
    fetcher: Arc<dyn ImageFetcher>,
    classifier: Arc<dyn Classifier>,
    store: Option<Arc<dyn ImageStore>>,
    bus: Arc<dyn EventBus>,
    object_name: String,
    result_key: String,
    handled: u64,
}

impl DetectionWorker {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        classifier: Arc<dyn Classifier>,
        store: Option<Arc<dyn ImageStore>>,
        bus: Arc<dyn EventBus>,
        object_name: &str,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            store,
            bus,
            object_name: object_name.to_string(),
            result_key: detected_key(object_name),
            handled: 0,
        }
    }

    /// Routing key results are published under.
    pub fn result_key(&self) -> &str {
        &self.result_key
    }

    /// Commands handled so far.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Consume until the queue closes or shutdown is signalled.
    ///
    /// A command being handled is always finished and acknowledged first.
    pub async fn run(
        &mut self,
        queue: &mut dyn CommandQueue,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<(), BrokerError> {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = queue.next() => next?,
            };
            let Some(delivery) = delivery else {
                log::info!("Command queue closed");
                break;
            };
            self.process(queue, delivery).await?;
        }
        Ok(())
    }

    /// Handle one delivery and acknowledge it.
    pub async fn process(
        &mut self,
        queue: &mut dyn CommandQueue,
        delivery: Delivery,
    ) -> Result<Vec<ContentRecord>, BrokerError> {
        let results = self.handle(&delivery).await;
        queue.ack(delivery).await?;
        self.handled += 1;
        Ok(results)
    }

    /// Run detection for a delivery and emit its results. Never fails.
    pub async fn handle(&self, delivery: &Delivery) -> Vec<ContentRecord> {
        let command: DetectionCommand = match delivery.decode() {
            Ok(command) => command,
            Err(e) => {
                log::warn!("Dropping undecodable command on {}: {}", delivery.routing_key, e);
                return Vec::new();
            }
        };

        let results = match self.detect(&command).await {
            Ok(results) => results,
            Err(e) => {
                log::warn!("Command {} for {}: {}", command.command_id, command.image_url, e);
                return Vec::new();
            }
        };

        for result in &results {
            log::info!("Detected {} in {} at {:?}", self.object_name, result.image_id, result.rect);
            self.emit(result).await;
        }
        results
    }

    /// Fetch, crop and classify; results are in image coordinates.
    pub async fn detect(
        &self,
        command: &DetectionCommand,
    ) -> Result<Vec<ContentRecord>, DetectError> {
        let bytes = self.fetcher.fetch(&command.image_url).await?;
        let image = image::load_from_memory(&bytes)?;

        let crop = command
            .rect
            .clamp_to(image.width(), image.height())
            .ok_or(DetectError::EmptyCrop {
                rect: command.rect,
                width: image.width(),
                height: image.height(),
            })?;
        if crop != command.rect {
            log::debug!("Clamped region {:?} to {:?}", command.rect, crop);
        }

        let gray: GrayImage = image
            .crop_imm(crop.x as u32, crop.y as u32, crop.width, crop.height)
            .to_luma8();

        let classifier = Arc::clone(&self.classifier);
        let hits = tokio::task::spawn_blocking(move || classifier.detect(&gray))
            .await
            .map_err(|e| DetectError::Task(e.to_string()))??;

        Ok(hits
            .iter()
            .map(|hit| {
                ContentRecord::new(
                    &command.image_id,
                    &command.image_url,
                    hit.offset_by(&crop),
                    &self.object_name,
                    APP_ID,
                )
            })
            .collect())
    }

    async fn emit(&self, result: &ContentRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.add_content(result).await {
                log::warn!("Failed to store result {}: {}", result.content_id, e);
            }
        }

        let envelope = match Envelope::json(APP_ID, IMAGE_CONTENT_TYPE, result) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("Failed to encode result {}: {}", result.content_id, e);
                return;
            }
        };
        if let Err(e) = self.bus.publish(&self.result_key, &envelope).await {
            log::warn!("Failed to publish result {}: {}", result.content_id, e);
        }
    }
}
