use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;

/// Marker for the coordinate space a [`Region`] or [`Point`] lives in.
pub trait CoordinateSpace: Copy + Clone + fmt::Debug + PartialEq + Eq + Default + Send + Sync {
    const NAME: &'static str;
}

/// Pixel coordinates of the captured frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSpace;

/// Pixel coordinates relative to a crop's own top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropSpace;

impl CoordinateSpace for FrameSpace {
    const NAME: &'static str = "frame";
}

impl CoordinateSpace for CropSpace {
    const NAME: &'static str = "crop";
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("region ({xmin}, {ymin})-({xmax}, {ymax}) has no area")]
    Empty {
        xmin: i32,
        ymin: i32,
        xmax: i32,
        ymax: i32,
    },
}

/// Axis-aligned rectangle `[xmin, xmax) x [ymin, ymax)` in space `S`.
///
/// Construction guarantees `xmin < xmax` and `ymin < ymax`. The only way
/// to move a region between spaces is [`Region::<CropSpace>::to_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region<S: CoordinateSpace> {
    xmin: i32,
    ymin: i32,
    xmax: i32,
    ymax: i32,
    space: PhantomData<S>,
}

impl<S: CoordinateSpace> Region<S> {
    pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Result<Self, RegionError> {
        if xmin >= xmax || ymin >= ymax {
            return Err(RegionError::Empty {
                xmin,
                ymin,
                xmax,
                ymax,
            });
        }
        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
            space: PhantomData,
        })
    }

    /// Clamps the corners into `[0, width] x [0, height]` before validating.
    ///
    /// Fails when nothing of the rectangle is left inside the bounds.
    pub fn clamped(
        xmin: i32,
        ymin: i32,
        xmax: i32,
        ymax: i32,
        width: u32,
        height: u32,
    ) -> Result<Self, RegionError> {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        Self::new(
            xmin.clamp(0, w),
            ymin.clamp(0, h),
            xmax.clamp(0, w),
            ymax.clamp(0, h),
        )
    }

    pub fn xmin(&self) -> i32 {
        self.xmin
    }

    pub fn ymin(&self) -> i32 {
        self.ymin
    }

    pub fn xmax(&self) -> i32 {
        self.xmax
    }

    pub fn ymax(&self) -> i32 {
        self.ymax
    }

    pub fn width(&self) -> u32 {
        (self.xmax as i64 - self.xmin as i64) as u32
    }

    pub fn height(&self) -> u32 {
        (self.ymax as i64 - self.ymin as i64) as u32
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn top_left(&self) -> Point<S> {
        Point::new(self.xmin, self.ymin)
    }

    pub fn as_tuple(&self) -> (i32, i32, i32, i32) {
        (self.xmin, self.ymin, self.xmax, self.ymax)
    }

    /// True when the region lies fully inside `[0, width] x [0, height]`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.xmin >= 0
            && self.ymin >= 0
            && self.xmax as i64 <= width as i64
            && self.ymax as i64 <= height as i64
    }
}

impl Region<CropSpace> {
    /// Translates a crop-local region into frame space using the crop's
    /// own frame-space box as origin. Saturates at the `i32` range.
    pub fn to_frame(&self, crop_box: &Region<FrameSpace>) -> Region<FrameSpace> {
        Region {
            xmin: self.xmin.saturating_add(crop_box.xmin),
            ymin: self.ymin.saturating_add(crop_box.ymin),
            xmax: self.xmax.saturating_add(crop_box.xmin),
            ymax: self.ymax.saturating_add(crop_box.ymin),
            space: PhantomData,
        }
    }
}

impl<S: CoordinateSpace> fmt::Display for Region<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ({}, {})-({}, {})",
            S::NAME,
            self.xmin,
            self.ymin,
            self.xmax,
            self.ymax
        )
    }
}

/// Integer pixel position in space `S`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point<S: CoordinateSpace> {
    pub x: i32,
    pub y: i32,
    space: PhantomData<S>,
}

impl<S: CoordinateSpace> Point<S> {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }
}

impl Point<CropSpace> {
    pub fn to_frame(&self, crop_box: &Region<FrameSpace>) -> Point<FrameSpace> {
        Point::new(
            self.x.saturating_add(crop_box.xmin),
            self.y.saturating_add(crop_box.ymin),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // ── Construction ─────────────────────────────────────────────────

    #[test]
    fn test_new_valid_region() {
        let r = Region::<FrameSpace>::new(10, 20, 110, 70).unwrap();
        assert_eq!(r.width(), 100);
        assert_eq!(r.height(), 50);
        assert_eq!(r.area(), 5000);
        assert_eq!(r.as_tuple(), (10, 20, 110, 70));
    }

    #[rstest]
    #[case::zero_width(10, 10, 10, 50)]
    #[case::zero_height(10, 10, 50, 10)]
    #[case::inverted_x(50, 10, 10, 50)]
    #[case::inverted_y(10, 50, 50, 10)]
    fn test_new_rejects_empty(
        #[case] xmin: i32,
        #[case] ymin: i32,
        #[case] xmax: i32,
        #[case] ymax: i32,
    ) {
        let result = Region::<CropSpace>::new(xmin, ymin, xmax, ymax);
        assert!(matches!(result, Err(RegionError::Empty { .. })));
    }

    // ── Clamping ─────────────────────────────────────────────────────

    #[test]
    fn test_clamped_inside_bounds_is_unchanged() {
        let r = Region::<CropSpace>::clamped(5, 5, 45, 45, 100, 100).unwrap();
        assert_eq!(r.as_tuple(), (5, 5, 45, 45));
    }

    #[test]
    fn test_clamped_negative_lower_bound() {
        let r = Region::<CropSpace>::clamped(-15, -3, 25, 37, 100, 100).unwrap();
        assert_eq!(r.as_tuple(), (0, 0, 25, 37));
    }

    #[test]
    fn test_clamped_upper_bound() {
        let r = Region::<CropSpace>::clamped(80, 90, 120, 130, 100, 100).unwrap();
        assert_eq!(r.as_tuple(), (80, 90, 100, 100));
        assert!(r.fits_within(100, 100));
    }

    #[test]
    fn test_clamped_fully_outside_is_empty() {
        let result = Region::<CropSpace>::clamped(120, 10, 160, 50, 100, 100);
        assert!(result.is_err());
    }

    // ── Space conversion ─────────────────────────────────────────────

    #[test]
    fn test_to_frame_adds_crop_origin() {
        let face = Region::<FrameSpace>::new(100, 150, 300, 350).unwrap();
        let eye = Region::<CropSpace>::new(40, 60, 80, 100).unwrap();
        let converted = eye.to_frame(&face);
        assert_eq!(converted.as_tuple(), (140, 210, 180, 250));
        assert_eq!(converted.width(), eye.width());
    }

    #[test]
    fn test_point_to_frame() {
        let face = Region::<FrameSpace>::new(100, 150, 300, 350).unwrap();
        let p = Point::<CropSpace>::new(12, 34).to_frame(&face);
        assert_eq!((p.x, p.y), (112, 184));
    }

    #[test]
    fn test_to_frame_saturates_instead_of_overflowing() {
        let face = Region::<FrameSpace>::new(100, 150, 300, 350).unwrap();
        let p = Point::<CropSpace>::new(i32::MAX, i32::MAX - 10).to_frame(&face);
        assert_eq!((p.x, p.y), (i32::MAX, i32::MAX));

        let far = Region::<CropSpace>::new(i32::MAX - 60, 0, i32::MAX - 50, 10).unwrap();
        let converted = far.to_frame(&face);
        assert_eq!(converted.xmax(), i32::MAX);
        assert_eq!(converted.ymin(), 150);
    }

    #[test]
    fn test_top_left() {
        let r = Region::<FrameSpace>::new(7, 9, 20, 30).unwrap();
        let p = r.top_left();
        assert_eq!((p.x, p.y), (7, 9));
    }

    #[test]
    fn test_display_names_space() {
        let r = Region::<CropSpace>::new(1, 2, 3, 4).unwrap();
        assert_eq!(r.to_string(), "[crop] (1, 2)-(3, 4)");
    }
}
