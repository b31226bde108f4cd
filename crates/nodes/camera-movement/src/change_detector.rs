//! Background subtraction and region extraction.
//!
//! Every frame is reduced to a blurred grayscale image and blended into a
//! running-average background. Pixels that differ from the background by more
//! than [`DIFF_THRESHOLD`] form a binary mask; the mask is dilated, and the
//! bounding box of every 8-connected blob whose outer boundary encloses at
//! least the configured area becomes a region.

use std::collections::VecDeque;

use image::{DynamicImage, GrayImage, Luma};
use vision_node::geometry::Rect;

/// Blur applied before differencing (equivalent of a 21x21 Gaussian kernel).
pub const BLUR_SIGMA: f32 = 3.5;
/// Minimum per-pixel difference counted as change.
pub const DIFF_THRESHOLD: u8 = 5;
/// Number of 3x3 dilation passes over the mask.
pub const DILATE_ITERATIONS: usize = 2;
/// Weight of the newest frame in the running average.
pub const BACKGROUND_WEIGHT: f32 = 0.5;
/// Default minimum blob area for a region.
pub const DEFAULT_AREA_THRESHOLD: f64 = 5000.0;

/// Grayscale and blur a decoded frame.
pub fn prepare(frame: &DynamicImage) -> GrayImage {
    image::imageops::blur(&frame.to_luma8(), BLUR_SIGMA)
}

/// Running-average background image.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl BackgroundModel {
    /// Seed the model from a prepared frame.
    pub fn from_frame(gray: &GrayImage) -> Self {
        Self {
            width: gray.width(),
            height: gray.height(),
            data: gray.pixels().map(|p| f32::from(p[0])).collect(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Blend a prepared frame into the background.
    pub fn accumulate(&mut self, gray: &GrayImage) {
        for (avg, pixel) in self.data.iter_mut().zip(gray.pixels()) {
            *avg = (1.0 - BACKGROUND_WEIGHT) * *avg + BACKGROUND_WEIGHT * f32::from(pixel[0]);
        }
    }

    /// Binary mask (0 or 255) of pixels that differ from the background.
    pub fn difference_mask(&self, gray: &GrayImage) -> GrayImage {
        let mut mask = GrayImage::new(self.width, self.height);
        for ((out, pixel), avg) in mask.pixels_mut().zip(gray.pixels()).zip(&self.data) {
            let background = avg.round().clamp(0.0, 255.0) as u8;
            let diff = pixel[0].abs_diff(background);
            *out = Luma([if diff > DIFF_THRESHOLD { 255 } else { 0 }]);
        }
        mask
    }
}

/// Grow set pixels into their 3x3 neighbourhood, `iterations` times.
pub fn dilate(mask: &GrayImage, iterations: usize) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut current = mask.clone();
    for _ in 0..iterations {
        let mut next = GrayImage::new(width, height);
        for (x, y, pixel) in current.enumerate_pixels() {
            if pixel[0] == 0 {
                continue;
            }
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    next.put_pixel(nx, ny, Luma([255]));
                }
            }
        }
        current = next;
    }
    current
}

/// A connected blob of the change mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub rect: Rect,
    /// Area enclosed by the outer boundary, through boundary pixel centres.
    /// Holes count towards it; a single pixel or a one-pixel line has none.
    pub area: f64,
}

/// Neighbour offsets in clockwise order (image y axis points down), east first.
const NEIGHBOURS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

fn is_set(mask: &GrayImage, x: i64, y: i64) -> bool {
    x >= 0
        && y >= 0
        && x < i64::from(mask.width())
        && y < i64::from(mask.height())
        && mask.get_pixel(x as u32, y as u32)[0] != 0
}

/// First set neighbour of `p`, searching clockwise from direction `from`.
fn next_boundary_pixel(
    mask: &GrayImage,
    p: (i64, i64),
    from: usize,
) -> Option<((i64, i64), usize)> {
    (0..8).map(|i| (from + i) % 8).find_map(|dir| {
        let (dx, dy) = NEIGHBOURS[dir];
        let q = (p.0 + dx, p.1 + dy);
        is_set(mask, q.0, q.1).then_some((q, dir))
    })
}

/// Outer boundary of the blob whose first pixel in scan order is `start`.
///
/// Moore-neighbour tracing; stops when the step out of `start` repeats.
fn outer_boundary(mask: &GrayImage, start: (i64, i64), max_steps: usize) -> Vec<(i64, i64)> {
    let mut boundary = vec![start];
    // Everything west and north of the first scanned pixel is clear.
    let Some(first) = next_boundary_pixel(mask, start, 4) else {
        return boundary;
    };

    let (mut current, mut dir) = first;
    for _ in 0..max_steps {
        // Resume from the clear neighbour checked just before `current`.
        let from = if dir % 2 == 0 { (dir + 6) % 8 } else { (dir + 5) % 8 };
        let Some(next) = next_boundary_pixel(mask, current, from) else {
            break;
        };
        if current == start && next == first {
            break;
        }
        boundary.push(current);
        (current, dir) = next;
    }
    boundary
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[(i64, i64)]) -> f64 {
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.0 * b.1 - b.0 * a.1)
        .sum();
    twice.abs() as f64 / 2.0
}

/// 8-connected blobs of a binary mask, in scan order of their first pixel.
pub fn find_blobs(mask: &GrayImage) -> Vec<Blob> {
    let (width, height) = mask.dimensions();
    let index = |x: u32, y: u32| (y * width + x) as usize;
    let mut visited = vec![false; (width * height) as usize];
    let mut blobs = Vec::new();
    let mut queue = VecDeque::new();

    for (sx, sy, pixel) in mask.enumerate_pixels() {
        if pixel[0] == 0 || visited[index(sx, sy)] {
            continue;
        }

        visited[index(sx, sy)] = true;
        queue.push_back((sx, sy));
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
        let mut pixels = 0usize;

        while let Some((x, y)) = queue.pop_front() {
            pixels += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    if !visited[index(nx, ny)] && mask.get_pixel(nx, ny)[0] != 0 {
                        visited[index(nx, ny)] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }

        // A boundary pixel is entered at most once from each side.
        let boundary = outer_boundary(mask, (i64::from(sx), i64::from(sy)), 4 * pixels + 4);
        blobs.push(Blob {
            rect: Rect::new(
                min_x as i32,
                min_y as i32,
                max_x - min_x + 1,
                max_y - min_y + 1,
            ),
            area: polygon_area(&boundary),
        });
    }
    blobs
}

/// Keep the blobs whose area reaches `threshold`.
pub fn select_regions(blobs: &[Blob], threshold: f64) -> Vec<Rect> {
    blobs
        .iter()
        .filter(|blob| {
            let keep = blob.area >= threshold;
            if !keep {
                log::debug!("diff: {} / {}", blob.area, threshold);
            }
            keep
        })
        .map(|blob| blob.rect)
        .collect()
}

/// Change detection over a stream of frames.
#[derive(Debug)]
pub struct ChangeDetector {
    model: Option<BackgroundModel>,
    area_threshold: f64,
}

impl ChangeDetector {
    pub fn new(area_threshold: f64) -> Self {
        Self {
            model: None,
            area_threshold,
        }
    }

    /// Regions of change in `frame`.
    ///
    /// Returns `None` while warming up: the first frame, and the first frame
    /// after a resolution change, only seed the background.
    pub fn detect(&mut self, frame: &DynamicImage) -> Option<Vec<Rect>> {
        let gray = prepare(frame);

        let seeded = self.model.as_ref().map(BackgroundModel::dimensions);
        if seeded != Some(gray.dimensions()) {
            if let Some(previous) = seeded {
                log::info!(
                    "Frame size changed from {:?} to {:?}, re-seeding background",
                    previous,
                    gray.dimensions()
                );
            }
            self.model = Some(BackgroundModel::from_frame(&gray));
            return None;
        }
        let model = self.model.as_mut()?;

        model.accumulate(&gray);
        let mask = model.difference_mask(&gray);
        let mask = dilate(&mask, DILATE_ITERATIONS);
        Some(select_regions(&find_blobs(&mask), self.area_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::imageops;

    fn frame_with_square(x: i64, y: i64, size: u32) -> DynamicImage {
        let mut img = GrayImage::new(320, 240);
        imageops::replace(&mut img, &GrayImage::from_pixel(size, size, Luma([255])), x, y);
        DynamicImage::ImageLuma8(img)
    }

    fn black(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::new(width, height))
    }

    #[test]
    fn test_first_frame_warms_up() {
        let mut detector = ChangeDetector::new(DEFAULT_AREA_THRESHOLD);
        assert_eq!(detector.detect(&black(320, 240)), None);
        assert_eq!(detector.detect(&black(320, 240)), Some(vec![]));
    }

    #[test]
    fn test_static_scene_has_no_regions() {
        let mut detector = ChangeDetector::new(DEFAULT_AREA_THRESHOLD);
        detector.detect(&black(320, 240));
        assert_eq!(detector.detect(&black(320, 240)), Some(vec![]));
    }

    #[test]
    fn test_large_change_yields_one_region() {
        let mut detector = ChangeDetector::new(DEFAULT_AREA_THRESHOLD);
        detector.detect(&black(320, 240));

        let regions = detector.detect(&frame_with_square(80, 60, 150)).unwrap();
        assert_eq!(regions.len(), 1);
        let region = regions[0];
        assert!(region.x <= 80 && region.y <= 60);
        assert!(region.right() >= 230 && region.bottom() >= 210);
        assert!(region.right() <= 320 && region.bottom() <= 240);
    }

    #[test]
    fn test_small_change_is_below_threshold() {
        let mut detector = ChangeDetector::new(DEFAULT_AREA_THRESHOLD);
        detector.detect(&black(320, 240));
        assert_eq!(detector.detect(&frame_with_square(100, 100, 20)), Some(vec![]));
    }

    #[test]
    fn test_resolution_change_reseeds() {
        let mut detector = ChangeDetector::new(DEFAULT_AREA_THRESHOLD);
        detector.detect(&black(320, 240));
        assert_eq!(detector.detect(&black(160, 120)), None);
        assert_eq!(detector.detect(&black(160, 120)), Some(vec![]));
    }

    #[test]
    fn test_background_converges() {
        let gray = GrayImage::from_pixel(4, 4, Luma([200]));
        let mut model = BackgroundModel::from_frame(&GrayImage::new(4, 4));
        model.accumulate(&gray);
        assert_eq!(model.difference_mask(&gray).get_pixel(0, 0)[0], 255);
        for _ in 0..8 {
            model.accumulate(&gray);
        }
        assert_eq!(model.difference_mask(&gray).get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let blobs = [
            Blob {
                rect: Rect::new(0, 0, 100, 50),
                area: 5000.0,
            },
            Blob {
                rect: Rect::new(200, 0, 10, 10),
                area: 4999.0,
            },
        ];
        assert_eq!(select_regions(&blobs, 5000.0), vec![Rect::new(0, 0, 100, 50)]);
        assert_eq!(select_regions(&blobs, 4999.0).len(), 2);
    }

    #[test]
    fn test_blob_geometry() {
        let mut mask = GrayImage::new(40, 40);
        imageops::replace(&mut mask, &GrayImage::from_pixel(11, 21, Luma([255])), 5, 10);
        let blobs = find_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].rect, Rect::new(5, 10, 11, 21));
        assert_eq!(blobs[0].area, 200.0);
    }

    #[test]
    fn test_diagonal_pixels_are_one_blob() {
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(2, 2, Luma([255]));
        mask.put_pixel(3, 3, Luma([255]));
        mask.put_pixel(8, 8, Luma([255]));
        let blobs = find_blobs(&mask);
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].rect, Rect::new(2, 2, 2, 2));
        assert_eq!(blobs[0].area, 0.0);
        assert_eq!(blobs[1].area, 0.0);
    }

    #[test]
    fn test_dilate_grows_by_one_per_pass() {
        let mut mask = GrayImage::new(11, 11);
        mask.put_pixel(5, 5, Luma([255]));
        let once = find_blobs(&dilate(&mask, 1));
        assert_eq!(once[0].rect, Rect::new(4, 4, 3, 3));
        let twice = find_blobs(&dilate(&mask, DILATE_ITERATIONS));
        assert_eq!(twice[0].rect, Rect::new(3, 3, 5, 5));
        assert_eq!(twice[0].area, 16.0);

        let mut corner = GrayImage::new(4, 4);
        corner.put_pixel(0, 0, Luma([255]));
        assert_eq!(find_blobs(&dilate(&corner, 1))[0].rect, Rect::new(0, 0, 2, 2));
    }

    fn outline(mask: &mut GrayImage, x: i64, y: i64, size: u32, thickness: u32) {
        imageops::replace(mask, &GrayImage::from_pixel(size, size, Luma([255])), x, y);
        let inner = size - 2 * thickness;
        let t = i64::from(thickness);
        imageops::replace(mask, &GrayImage::new(inner, inner), x + t, y + t);
    }

    #[test]
    fn test_hollow_outline_counts_enclosed_area() {
        let mut mask = GrayImage::new(320, 240);
        outline(&mut mask, 20, 20, 200, 5);

        let blobs = find_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].rect, Rect::new(20, 20, 200, 200));
        assert_eq!(blobs[0].area, 199.0 * 199.0);
        assert_eq!(select_regions(&blobs, DEFAULT_AREA_THRESHOLD).len(), 1);
    }

    #[test]
    fn test_area_is_measured_between_pixel_centres() {
        let mut mask = GrayImage::new(100, 100);
        imageops::replace(&mut mask, &GrayImage::from_pixel(71, 71, Luma([255])), 10, 10);
        let blobs = find_blobs(&mask);
        assert_eq!(blobs[0].area, 4900.0);
        assert!(select_regions(&blobs, DEFAULT_AREA_THRESHOLD).is_empty());

        let mut mask = GrayImage::new(100, 100);
        imageops::replace(&mut mask, &GrayImage::from_pixel(72, 72, Luma([255])), 10, 10);
        assert_eq!(find_blobs(&mask)[0].area, 5041.0);
    }

    #[test]
    fn test_concave_blob_area() {
        // L shape: a 10x3 bar with a 3x10 leg hanging from its left end.
        let mut mask = GrayImage::new(20, 20);
        imageops::replace(&mut mask, &GrayImage::from_pixel(10, 3, Luma([255])), 0, 0);
        imageops::replace(&mut mask, &GrayImage::from_pixel(3, 10, Luma([255])), 0, 0);
        let blobs = find_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        // (0,0) (9,0) (9,2) (3,2) (2,3) (2,9) (0,9): the inner corner is cut.
        assert_eq!(blobs[0].area, 32.5);
    }
}
