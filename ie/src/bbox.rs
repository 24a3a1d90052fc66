//! Bounding boxes and cross-keyword non-max suppression.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBox {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    fn right(&self) -> u32 {
        self.x + self.w
    }

    fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn intersection(&self, other: &BBox) -> u64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x2 <= x1 || y2 <= y1 {
            return 0;
        }
        (x2 - x1) as u64 * (y2 - y1) as u64
    }

    /// Intersection area divided by the area of the smaller box.
    ///
    /// Unlike IoU this reaches 1.0 when a small box sits entirely inside a large one.
    pub fn overlap_of_smaller(&self, other: &BBox) -> f64 {
        let inter = self.intersection(other);
        if inter == 0 {
            return 0.0;
        }
        let smaller = self.area().min(other.area());
        inter as f64 / smaller as f64
    }
}

/// A keyword located in a frame at the scale where it scored best.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedMatch {
    pub keyword: String,
    pub score: f64,
    pub bbox: BBox,
}

/// Sort candidates by score, highest first. Equal scores keep their relative order.
pub fn rank(candidates: &mut [DetectedMatch]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Greedy non-max suppression over an already ranked list.
///
/// A candidate survives only if its overlap with every kept candidate stays
/// below `threshold`. Keywords are ignored: two different keywords competing
/// for the same spot are resolved in favour of the higher score.
pub fn suppress(ranked: &[DetectedMatch], threshold: f64) -> Vec<DetectedMatch> {
    let mut kept: Vec<DetectedMatch> = Vec::new();
    for candidate in ranked {
        let collides = kept
            .iter()
            .any(|k| k.bbox.overlap_of_smaller(&candidate.bbox) >= threshold);
        if !collides {
            kept.push(candidate.clone());
        }
    }
    kept
}
