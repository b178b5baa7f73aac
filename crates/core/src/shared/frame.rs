use ndarray::ArrayView3;

use crate::shared::region::{CoordinateSpace, Region, RegionError};

/// A single captured frame or crop: contiguous RGB bytes in row-major order.
///
/// Frames are never mutated by the pipeline. Crops are copied into new
/// frames so they stay valid after the source frame is recycled.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Uniformly filled frame, mostly useful for synthetic streams.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: usize) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of the source frame in the stream. Crops inherit it.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels under `region` into a new frame.
    ///
    /// The region is clamped to this frame first, so a region that is
    /// entirely outside the frame yields [`RegionError::Empty`].
    pub fn crop<S: CoordinateSpace>(&self, region: &Region<S>) -> Result<Frame, RegionError> {
        let bounded = Region::<S>::clamped(
            region.xmin(),
            region.ymin(),
            region.xmax(),
            region.ymax(),
            self.width,
            self.height,
        )?;

        let x1 = bounded.xmin() as usize;
        let y1 = bounded.ymin() as usize;
        let crop_w = bounded.width() as usize;
        let crop_h = bounded.height() as usize;
        let channels = self.channels as usize;
        let stride = self.width as usize * channels;

        let mut data = Vec::with_capacity(crop_w * crop_h * channels);
        for row in y1..y1 + crop_h {
            let start = row * stride + x1 * channels;
            data.extend_from_slice(&self.data[start..start + crop_w * channels]);
        }

        Ok(Frame::new(
            data,
            crop_w as u32,
            crop_h as u32,
            self.channels,
            self.index,
        ))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
