//! 5-point facial landmarks tagged with the coordinate space they live in.

use crate::shared::region::{CoordinateSpace, CropSpace, FrameSpace, Point, Region};

pub const LEFT_EYE: usize = 0;
pub const RIGHT_EYE: usize = 1;
pub const NOSE: usize = 2;
pub const MOUTH_LEFT: usize = 3;
pub const MOUTH_RIGHT: usize = 4;

/// Left eye, right eye, nose, mouth left, mouth right.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LandmarkSet<S: CoordinateSpace> {
    points: [Point<S>; 5],
}

impl<S: CoordinateSpace> LandmarkSet<S> {
    pub fn new(points: [Point<S>; 5]) -> Self {
        Self { points }
    }

    /// Builds the set from ten interleaved `x, y` values.
    pub fn from_coords(coords: [i32; 10]) -> Self {
        Self::new(std::array::from_fn(|i| {
            Point::new(coords[2 * i], coords[2 * i + 1])
        }))
    }

    pub fn points(&self) -> &[Point<S>; 5] {
        &self.points
    }

    pub fn left_eye(&self) -> Point<S> {
        self.points[LEFT_EYE]
    }

    pub fn right_eye(&self) -> Point<S> {
        self.points[RIGHT_EYE]
    }

    pub fn nose(&self) -> Point<S> {
        self.points[NOSE]
    }

    pub fn mouth_left(&self) -> Point<S> {
        self.points[MOUTH_LEFT]
    }

    pub fn mouth_right(&self) -> Point<S> {
        self.points[MOUTH_RIGHT]
    }

    /// Interleaved `x, y` values in landmark order.
    pub fn to_coords(&self) -> [i32; 10] {
        std::array::from_fn(|i| {
            let p = self.points[i / 2];
            if i % 2 == 0 {
                p.x
            } else {
                p.y
            }
        })
    }
}

impl LandmarkSet<CropSpace> {
    pub fn to_frame(&self, crop_box: &Region<FrameSpace>) -> LandmarkSet<FrameSpace> {
        LandmarkSet::new(self.points.map(|p| p.to_frame(crop_box)))
    }
}
