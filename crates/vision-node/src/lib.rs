//! Shared runtime for the vision nodes.
//!
//! Both nodes in this workspace (camera movement and object detection) are
//! thin loops around a handful of collaborators. This crate owns everything
//! they share:
//!
//! ```text
//!   camera-movement ──► ImageStore (HTTP) ◄── object-detect
//!          │                                      ▲   │
//!          └──────────► EventBus (AMQP) ──────────┘   │
//!                           ▲                         │
//!                           └── CommandQueue ◄────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: YAML config loading shared by both nodes.
//! - [`geometry`]: Integer rectangles used for regions and crops.
//! - [`models`]: Records exchanged with the image store and the broker.
//! - [`store`]: Image store HTTP client.
//! - [`wire`]: Legacy JSON body encoding expected by the image store.
//! - [`broker`]: Messages, routing keys and the AMQP transport.

pub mod broker;
pub mod config;
mod error;
pub mod geometry;
pub mod models;
mod runner;
pub mod store;
mod traits;
pub mod wire;

pub use error::NodeError;
pub use runner::{http_client, run_node, setup_logging, setup_shutdown};
pub use traits::{NodeMetadata, VisionNode};

/// Commonly used items for node crates.
pub mod prelude {
    pub use crate::broker::{Envelope, EventBus};
    pub use crate::geometry::Rect;
    pub use crate::models::{ContentRecord, DetectionCommand, ImageRecord};
    pub use crate::store::{ImageStore, StoreError};
    pub use crate::{node_metadata, run_node, NodeError, NodeMetadata, VisionNode};
    pub use async_trait::async_trait;
    pub use log::{debug, error, info, warn};
    pub use std::sync::Arc;
    pub use tokio::sync::watch;
}
