//! Object detection on command.
//!
//! The node consumes [`DetectionCommand`](vision_node::models::DetectionCommand)s
//! from a durable broker queue, runs a classifier on the commanded region of
//! the stored image, and publishes one result per detected object under
//! `vision.evt.detected-<object>`.

pub mod classifier;
pub mod cli;
mod config;
mod node;
pub mod worker;

pub use config::Config;
pub use node::ObjectDetectNode;
