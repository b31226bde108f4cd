//! Uploads and notifications for published frames.

use std::sync::Arc;

use vision_node::broker::{
    status_online_key, Envelope, EventBus, IMAGE_CONTENT_TYPE, MOVEMENT_KEY,
};
use vision_node::geometry::Rect;
use vision_node::models::{event_time_now, ContentRecord, ImageRecord};
use vision_node::store::ImageStore;

use crate::sequence::FrameSlot;

/// App id on every message this node sends; also the content source name.
pub const APP_ID: &str = "camera-movement";
/// Description of movement regions.
pub const MOVEMENT_DESCRIPTION: &str = "movement";

/// Outcome of the side effects for one frame.
///
/// Failures are logged where they happen; the report only counts them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub image_uploaded: bool,
    pub record_uploaded: bool,
    pub contents_uploaded: usize,
    pub contents_failed: usize,
    pub notifications_sent: usize,
}

pub struct EventPublisher {
    store: Arc<dyn ImageStore>,
    bus: Option<Arc<dyn EventBus>>,
    camera_name: String,
}

impl EventPublisher {
    /// `bus` is `None` when messaging is disabled.
    pub fn new(
        store: Arc<dyn ImageStore>,
        bus: Option<Arc<dyn EventBus>>,
        camera_name: &str,
    ) -> Self {
        Self {
            store,
            bus,
            camera_name: camera_name.to_string(),
        }
    }

    /// Announce the camera on the broker. No-op without messaging.
    pub async fn announce(&self) {
        let Some(bus) = &self.bus else {
            return;
        };
        let key = status_online_key(&self.camera_name);
        let text = format!("Camera [{}] starting", self.camera_name);
        match bus.publish(&key, &Envelope::text(APP_ID, "status", &text)).await {
            Ok(()) => log::info!("Announced {} on {}", self.camera_name, key),
            Err(e) => log::warn!("Failed to announce camera on {}: {}", key, e),
        }
    }

    /// Upload the frame, its record and its regions, and notify the broker.
    ///
    /// Every call is attempted on its own; nothing here fails the frame loop.
    pub async fn publish(
        &self,
        slot: &FrameSlot,
        encoded: Vec<u8>,
        regions: &[Rect],
    ) -> PublishReport {
        let mut report = PublishReport::default();
        let record = ImageRecord::new(
            &slot.correlation_id,
            slot.sequence_number,
            &self.camera_name,
            self.store.base_url(),
            event_time_now(),
        );

        match self.store.upload_image(&record.image_id, encoded).await {
            Ok(()) => report.image_uploaded = true,
            Err(e) => log::warn!("Image upload failed for {}: {}", record.image_id, e),
        }
        match self.store.add_image(&record).await {
            Ok(()) => report.record_uploaded = true,
            Err(e) => log::warn!("Image record upload failed for {}: {}", record.image_id, e),
        }

        if !slot.detected {
            log::debug!("Tail frame {} published", record.image_id);
            return report;
        }

        for rect in regions {
            let content = ContentRecord::new(
                &record.image_id,
                &record.image_url,
                *rect,
                MOVEMENT_DESCRIPTION,
                APP_ID,
            );
            match self.store.add_content(&content).await {
                Ok(()) => report.contents_uploaded += 1,
                Err(e) => {
                    report.contents_failed += 1;
                    log::warn!("Content upload failed for {}: {}", record.image_id, e);
                }
            }
            if self.notify(&content).await {
                report.notifications_sent += 1;
            }
        }

        log::debug!(
            "Frame {} published with {} regions",
            record.image_id,
            regions.len()
        );
        report
    }

    async fn notify(&self, content: &ContentRecord) -> bool {
        let Some(bus) = &self.bus else {
            return false;
        };
        let envelope = match Envelope::json(APP_ID, IMAGE_CONTENT_TYPE, content) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("Failed to encode movement event: {}", e);
                return false;
            }
        };
        match bus.publish(MOVEMENT_KEY, &envelope).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to publish movement event: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;
    use vision_node::broker::BrokerError;
    use vision_node::store::{self, StoreError};

    fn refused(what: &str) -> StoreError {
        StoreError::Status {
            url: what.to_string(),
            status: 500,
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        fail_images: bool,
        fail_records: bool,
        fail_contents: bool,
        images: Mutex<Vec<String>>,
        records: Mutex<Vec<ImageRecord>>,
        contents: Mutex<Vec<ContentRecord>>,
    }

    #[async_trait]
    impl ImageStore for MemoryStore {
        fn base_url(&self) -> &str {
            "http://store"
        }

        async fn upload_image(&self, image_id: &str, _jpeg: Vec<u8>) -> store::Result<()> {
            if self.fail_images {
                return Err(refused(image_id));
            }
            self.images.lock().unwrap().push(image_id.to_string());
            Ok(())
        }

        async fn add_image(&self, record: &ImageRecord) -> store::Result<()> {
            if self.fail_records {
                return Err(refused(&record.image_id));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn add_content(&self, record: &ContentRecord) -> store::Result<()> {
            if self.fail_contents {
                return Err(refused(&record.content_id));
            }
            self.contents.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryBus {
        sent: Mutex<Vec<(String, Envelope)>>,
    }

    #[async_trait]
    impl EventBus for MemoryBus {
        async fn publish(&self, routing_key: &str, envelope: &Envelope) -> Result<(), BrokerError> {
            self.sent
                .lock()
                .unwrap()
                .push((routing_key.to_string(), envelope.clone()));
            Ok(())
        }
    }

    struct DownBus;

    #[async_trait]
    impl EventBus for DownBus {
        async fn publish(&self, _key: &str, _envelope: &Envelope) -> Result<(), BrokerError> {
            Err(BrokerError::Connection("broker unreachable".into()))
        }
    }

    fn slot(detected: bool) -> FrameSlot {
        FrameSlot {
            correlation_id: Uuid::nil(),
            sequence_number: 2,
            detected,
        }
    }

    #[tokio::test]
    async fn test_detected_frame_uploads_everything() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus::default());
        let publisher = EventPublisher::new(store.clone(), Some(bus.clone()), "porch");
        let regions = [Rect::new(1, 2, 3, 4), Rect::new(10, 20, 30, 40)];

        let report = publisher.publish(&slot(true), vec![0xFF], &regions).await;
        assert!(report.image_uploaded && report.record_uploaded);
        assert_eq!(report.contents_uploaded, 2);
        assert_eq!(report.notifications_sent, 2);

        let image_id = format!("{}_2.jpg", Uuid::nil());
        let records = store.records.lock().unwrap();
        assert_eq!(records[0].image_id, image_id);
        assert_eq!(records[0].source, "porch");
        assert_eq!(records[0].image_url, format!("http://store/api/image/{image_id}"));

        let contents = store.contents.lock().unwrap();
        assert_eq!(contents[1].rect, regions[1]);
        assert_eq!(contents[1].content_description, "movement");
        assert_eq!(contents[1].source, "camera-movement");
        assert_ne!(contents[0].content_id, contents[1].content_id);

        let sent = bus.sent.lock().unwrap();
        assert!(sent.iter().all(|(key, _)| key == MOVEMENT_KEY));
        assert_eq!(sent[0].1.kind, IMAGE_CONTENT_TYPE);
        assert_eq!(sent[0].1.app_id, APP_ID);
        let body: ContentRecord = sent[1].1.decode().unwrap();
        assert_eq!(body, contents[1]);
    }

    #[tokio::test]
    async fn test_tail_frame_has_no_content() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus::default());
        let publisher = EventPublisher::new(store.clone(), Some(bus.clone()), "porch");

        let report = publisher.publish(&slot(false), vec![0xFF], &[]).await;
        assert!(report.record_uploaded);
        assert_eq!(report.contents_uploaded, 0);
        assert!(store.contents.lock().unwrap().is_empty());
        assert!(bus.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_image_upload_does_not_stop_the_rest() {
        let store = Arc::new(MemoryStore {
            fail_images: true,
            ..Default::default()
        });
        let publisher = EventPublisher::new(store.clone(), None, "porch");

        let report = publisher
            .publish(&slot(true), vec![0xFF], &[Rect::new(0, 0, 80, 80)])
            .await;
        assert!(!report.image_uploaded);
        assert!(report.record_uploaded);
        assert_eq!(report.contents_uploaded, 1);
        assert_eq!(report.notifications_sent, 0);
    }

    #[tokio::test]
    async fn test_announce() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus::default());
        EventPublisher::new(store, Some(bus.clone()), "porch").announce().await;

        let sent = bus.sent.lock().unwrap();
        assert_eq!(sent[0].0, "vision.porch.status-online");
        assert_eq!(sent[0].1.body, b"Camera [porch] starting");
    }

    #[tokio::test]
    async fn test_failed_content_upload_still_notifies() {
        let store = Arc::new(MemoryStore {
            fail_contents: true,
            ..Default::default()
        });
        let bus = Arc::new(MemoryBus::default());
        let publisher = EventPublisher::new(store.clone(), Some(bus.clone()), "porch");
        let regions = [Rect::new(0, 0, 80, 80), Rect::new(100, 0, 80, 80)];

        let report = publisher.publish(&slot(true), vec![0xFF], &regions).await;
        assert!(report.image_uploaded && report.record_uploaded);
        assert_eq!(report.contents_uploaded, 0);
        assert_eq!(report.contents_failed, 2);
        assert_eq!(report.notifications_sent, 2);
        assert_eq!(bus.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_record_upload_does_not_stop_contents() {
        let store = Arc::new(MemoryStore {
            fail_records: true,
            ..Default::default()
        });
        let publisher = EventPublisher::new(store.clone(), None, "porch");

        let report = publisher
            .publish(&slot(true), vec![0xFF], &[Rect::new(0, 0, 80, 80)])
            .await;
        assert!(report.image_uploaded);
        assert!(!report.record_uploaded);
        assert_eq!(report.contents_uploaded, 1);
        assert_eq!(store.images.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broker_failure_does_not_stop_uploads() {
        let store = Arc::new(MemoryStore::default());
        let publisher = EventPublisher::new(store.clone(), Some(Arc::new(DownBus)), "porch");
        let regions = [Rect::new(0, 0, 80, 80), Rect::new(100, 0, 80, 80)];

        let report = publisher.publish(&slot(true), vec![0xFF], &regions).await;
        assert!(report.image_uploaded && report.record_uploaded);
        assert_eq!(report.contents_uploaded, 2);
        assert_eq!(report.notifications_sent, 0);
        assert_eq!(store.contents.lock().unwrap().len(), 2);

        publisher.announce().await;
    }
}
