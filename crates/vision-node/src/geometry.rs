//! Integer rectangles for detected regions and crops.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel coordinates.
///
/// Serialized with the store's field names (`X`, `Y`, `Width`, `Height`) so it
/// can be flattened straight into content records and commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Move a rectangle expressed relative to `origin` into origin's frame.
    ///
    /// Used to turn classifier hits inside a crop back into absolute image
    /// coordinates.
    pub fn offset_by(&self, origin: &Rect) -> Rect {
        Rect {
            x: origin.x.saturating_add(self.x),
            y: origin.y.saturating_add(self.y),
            width: self.width,
            height: self.height,
        }
    }

    /// Intersect with an image of the given size.
    ///
    /// Returns `None` when nothing of the rectangle lies inside the image.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Option<Rect> {
        let left = i64::from(self.x).max(0);
        let top = i64::from(self.y).max(0);
        let right = self.right().min(i64::from(image_width));
        let bottom = self.bottom().min(i64::from(image_height));

        if right <= left || bottom <= top {
            return None;
        }

        Some(Rect {
            x: left as i32,
            y: top as i32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}
