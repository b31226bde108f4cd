//! Records exchanged with the image store and over the broker.
//!
//! Field names follow the store's existing wire format, which is why the
//! image record is all-lowercase while content records are PascalCase.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Rect;

/// Format of every `eventtime` field (local time, second precision).
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current local time in [`EVENT_TIME_FORMAT`].
pub fn event_time_now() -> String {
    chrono::Local::now().format(EVENT_TIME_FORMAT).to_string()
}

/// Deterministic image id for a frame of an episode: `<correlation>_<seq>.jpg`.
pub fn image_id(correlation_id: &Uuid, sequence_number: u32) -> String {
    format!("{}_{}.jpg", correlation_id, sequence_number)
}

/// Public URL of an image held by the store at `store_url`.
pub fn image_url(store_url: &str, image_id: &str) -> String {
    format!("{}/api/image/{}", store_url.trim_end_matches('/'), image_id)
}

/// Metadata for one published frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "imageid")]
    pub image_id: String,
    pub source: String,
    #[serde(rename = "correlationid")]
    pub correlation_id: String,
    #[serde(rename = "sequencenumber")]
    pub sequence_number: u32,
    #[serde(rename = "eventtime")]
    pub event_time: String,
    #[serde(rename = "imageurl")]
    pub image_url: String,
}

impl ImageRecord {
    /// Build the record for frame `sequence_number` of episode `correlation_id`.
    pub fn new(
        correlation_id: &Uuid,
        sequence_number: u32,
        source: &str,
        store_url: &str,
        event_time: String,
    ) -> Self {
        let image_id = image_id(correlation_id, sequence_number);
        let image_url = image_url(store_url, &image_id);
        Self {
            image_id,
            source: source.to_string(),
            correlation_id: correlation_id.to_string(),
            sequence_number,
            event_time,
            image_url,
        }
    }
}

/// Something found inside an image: a moving region or a classifier hit.
///
/// Detection results share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentRecord {
    pub content_id: String,
    pub image_id: String,
    pub image_url: String,
    #[serde(flatten)]
    pub rect: Rect,
    pub content_description: String,
    #[serde(default)]
    pub content_data: String,
    pub source: String,
}

impl ContentRecord {
    pub fn new(
        image_id: &str,
        image_url: &str,
        rect: Rect,
        description: &str,
        source: &str,
    ) -> Self {
        Self {
            content_id: Uuid::new_v4().to_string(),
            image_id: image_id.to_string(),
            image_url: image_url.to_string(),
            rect,
            content_description: description.to_string(),
            content_data: String::new(),
            source: source.to_string(),
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.content_data = data.into();
        self
    }
}

/// Request to look for objects inside a region of a stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectionCommand {
    pub command_id: String,
    pub image_id: String,
    pub image_url: String,
    #[serde(flatten)]
    pub rect: Rect,
}
