//! Per-frame processing: detect, track, publish.

use std::sync::{Arc, Mutex, PoisonError};

use vision_node::geometry::Rect;

use crate::change_detector::ChangeDetector;
use crate::publisher::{EventPublisher, PublishReport};
use crate::sequence::{FrameDecision, FrameSlot, SequenceTracker};

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Bytes did not decode; the episode state was not touched.
    Undecodable,
    /// Frame seeded the background model.
    WarmUp,
    /// Not part of an episode.
    Skipped,
    Published {
        slot: FrameSlot,
        report: PublishReport,
    },
}

enum Analysis {
    Undecodable,
    WarmUp,
    Regions(Vec<Rect>),
}

/// Decode a frame and run change detection on it.
fn analyse(detector: &Mutex<ChangeDetector>, encoded: &[u8]) -> Analysis {
    let frame = match image::load_from_memory(encoded) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("Skipping undecodable frame ({} bytes): {}", encoded.len(), e);
            return Analysis::Undecodable;
        }
    };

    let mut detector = detector.lock().unwrap_or_else(PoisonError::into_inner);
    match detector.detect(&frame) {
        Some(regions) => Analysis::Regions(regions),
        None => {
            log::debug!("Background seeded from {}x{} frame", frame.width(), frame.height());
            Analysis::WarmUp
        }
    }
}

pub struct MovementPipeline {
    detector: Arc<Mutex<ChangeDetector>>,
    tracker: SequenceTracker,
    publisher: EventPublisher,
}

impl MovementPipeline {
    pub fn new(
        detector: ChangeDetector,
        tracker: SequenceTracker,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            detector: Arc::new(Mutex::new(detector)),
            tracker,
            publisher,
        }
    }

    /// Run one encoded frame through the pipeline.
    ///
    /// Decoding and detection run on the blocking pool.
    pub async fn process(&mut self, encoded: Vec<u8>) -> FrameOutcome {
        let detector = Arc::clone(&self.detector);
        let analysed = tokio::task::spawn_blocking(move || {
            let analysis = analyse(&detector, &encoded);
            (encoded, analysis)
        })
        .await;

        let (encoded, regions) = match analysed {
            Ok((encoded, Analysis::Regions(regions))) => (encoded, regions),
            Ok((_, Analysis::WarmUp)) => return FrameOutcome::WarmUp,
            Ok((_, Analysis::Undecodable)) => return FrameOutcome::Undecodable,
            Err(e) => {
                log::error!("Frame analysis task failed: {}", e);
                return FrameOutcome::Undecodable;
            }
        };

        match self.tracker.advance(!regions.is_empty()) {
            FrameDecision::Skip => FrameOutcome::Skipped,
            FrameDecision::Publish(slot) => {
                let report = self.publisher.publish(&slot, encoded, &regions).await;
                FrameOutcome::Published { slot, report }
            }
        }
    }
}
