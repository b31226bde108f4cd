//! Object classifiers.
//!
//! A classifier looks at a grayscale crop and reports the rectangles, in crop
//! coordinates, where it found the object. The Haar cascade implementation
//! needs OpenCV and is only built with the `opencv` feature.

use image::GrayImage;
use std::path::Path;
use thiserror::Error;
use vision_node::geometry::Rect;

/// Scale step between detection passes.
pub const SCALE_FACTOR: f64 = 1.3;
/// Neighbouring hits needed to keep a detection.
pub const MIN_NEIGHBORS: i32 = 5;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to load classifier from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("classifier support not built; rebuild with the `opencv` feature")]
    Unsupported,
    #[error("classification failed: {0}")]
    Detect(String),
}

/// Finds objects in a grayscale image.
pub trait Classifier: Send + Sync {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<Rect>, ClassifierError>;
}

/// Load the cascade at `path`.
#[cfg(feature = "opencv")]
pub fn load_classifier(path: &Path) -> Result<Box<dyn Classifier>, ClassifierError> {
    Ok(Box::new(haar::HaarCascade::load(path)?))
}

/// Load the cascade at `path`.
#[cfg(not(feature = "opencv"))]
pub fn load_classifier(path: &Path) -> Result<Box<dyn Classifier>, ClassifierError> {
    log::error!("Cannot load {}: built without OpenCV", path.display());
    Err(ClassifierError::Unsupported)
}

#[cfg(feature = "opencv")]
mod haar {
    use super::*;
    use image::ImageFormat;
    use opencv::core::{Rect as CvRect, Size, Vector};
    use opencv::imgcodecs;
    use opencv::objdetect::CascadeClassifier;
    use opencv::prelude::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// OpenCV Haar cascade classifier.
    pub struct HaarCascade {
        // detect_multi_scale takes &mut self
        inner: Mutex<CascadeClassifier>,
    }

    impl HaarCascade {
        pub fn load(path: &Path) -> Result<Self, ClassifierError> {
            let load_error = |reason: String| ClassifierError::Load {
                path: path.display().to_string(),
                reason,
            };
            let file = path
                .to_str()
                .ok_or_else(|| load_error("path is not valid UTF-8".into()))?;
            let classifier = CascadeClassifier::new(file).map_err(|e| load_error(e.to_string()))?;
            if classifier.empty().map_err(|e| load_error(e.to_string()))? {
                return Err(load_error("no cascade loaded".into()));
            }
            log::info!("Classifier loaded from {}", path.display());
            Ok(Self {
                inner: Mutex::new(classifier),
            })
        }
    }

    impl Classifier for HaarCascade {
        fn detect(&self, gray: &GrayImage) -> Result<Vec<Rect>, ClassifierError> {
            let detect_error = |e: opencv::Error| ClassifierError::Detect(e.to_string());

            // Hand the pixels over losslessly through an in-memory PNG.
            let mut png = Vec::new();
            gray.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .map_err(|e| ClassifierError::Detect(e.to_string()))?;
            let buf = Vector::<u8>::from_slice(&png);
            let mat =
                imgcodecs::imdecode(&buf, imgcodecs::IMREAD_GRAYSCALE).map_err(detect_error)?;

            let mut found = Vector::<CvRect>::new();
            let mut classifier = self
                .inner
                .lock()
                .map_err(|_| ClassifierError::Detect("classifier lock poisoned".into()))?;
            classifier
                .detect_multi_scale(
                    &mat,
                    &mut found,
                    SCALE_FACTOR,
                    MIN_NEIGHBORS,
                    0,
                    Size::new(0, 0),
                    Size::new(0, 0),
                )
                .map_err(detect_error)?;

            Ok(found
                .iter()
                .map(|r| Rect::new(r.x, r.y, r.width.max(0) as u32, r.height.max(0) as u32))
                .collect())
        }
    }
}
