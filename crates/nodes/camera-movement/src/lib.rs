//! Movement detection for a JPEG camera stream.
//!
//! Frames are pulled from the camera one at a time, compared against a
//! running-average background, and grouped into movement episodes. Every
//! frame of an episode is stored in the image store together with the
//! regions that moved; with messaging enabled each region is also announced
//! on the broker.
//!
//! ```text
//! FrameSource ─► ChangeDetector ─► SequenceTracker ─► EventPublisher
//! ```

pub mod change_detector;
pub mod cli;
mod config;
pub mod frame_source;
mod node;
pub mod pipeline;
pub mod publisher;
pub mod sequence;

pub use config::Config;
pub use node::CameraMovementNode;
