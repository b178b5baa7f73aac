//! Conversion between frames and model tensors.
//!
//! Encoding resamples an image to a model's spatial input size with
//! bilinear interpolation (pixel-center aligned), reorders HWC to CHW in the
//! model's channel order and prepends a batch axis. Decoding helpers read
//! flat values out of output tensors without mutating them.

use ndarray::Array4;

use crate::inference::domain::inference_session::{InferenceError, Tensor};
use crate::shared::frame::Frame;
use crate::shared::region::{CoordinateSpace, Region, RegionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Spatial size and pixel convention a model expects for one image input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputLayout {
    pub width: u32,
    pub height: u32,
    pub channel_order: ChannelOrder,
    /// Multiplier applied to raw `0..=255` values.
    pub scale: f32,
}

impl InputLayout {
    /// BGR, unscaled: the convention of the stock gaze model family.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channel_order: ChannelOrder::Bgr,
            scale: 1.0,
        }
    }

    pub fn with_channel_order(mut self, channel_order: ChannelOrder) -> Self {
        self.channel_order = channel_order;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Reads `H` and `W` from a declared `[N, C, H, W]` shape.
    pub fn from_shape(shape: &[i64]) -> Option<Self> {
        if shape.len() != 4 || shape[2] <= 0 || shape[3] <= 0 {
            return None;
        }
        Some(Self::new(shape[3] as u32, shape[2] as u32))
    }
}

/// Encodes a whole frame into a `[1, 3, H, W]` tensor.
pub fn encode(frame: &Frame, layout: &InputLayout) -> Result<Array4<f32>, RegionError> {
    if frame.is_empty() {
        return Err(RegionError::Empty {
            xmin: 0,
            ymin: 0,
            xmax: frame.width() as i32,
            ymax: frame.height() as i32,
        });
    }

    let src = frame.as_ndarray();
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;
    let dst_w = layout.width as usize;
    let dst_h = layout.height as usize;
    let grayscale = frame.channels() == 1;

    let x_taps: Vec<(usize, usize, f32)> = (0..dst_w).map(|x| taps(x, src_w, dst_w)).collect();
    let y_taps: Vec<(usize, usize, f32)> = (0..dst_h).map(|y| taps(y, src_h, dst_h)).collect();

    let mut tensor = Array4::<f32>::zeros((1, 3, dst_h, dst_w));

    for (y, &(y0, y1, fy)) in y_taps.iter().enumerate() {
        for (x, &(x0, x1, fx)) in x_taps.iter().enumerate() {
            for c in 0..3 {
                let sc = if grayscale {
                    0
                } else {
                    match layout.channel_order {
                        ChannelOrder::Rgb => c,
                        ChannelOrder::Bgr => 2 - c,
                    }
                };
                let top = lerp(src[[y0, x0, sc]], src[[y0, x1, sc]], fx);
                let bottom = lerp(src[[y1, x0, sc]], src[[y1, x1, sc]], fx);
                tensor[[0, c, y, x]] = (top + (bottom - top) * fy) * layout.scale;
            }
        }
    }

    Ok(tensor)
}

/// Crops `region` out of `frame` and encodes the crop.
pub fn encode_region<S: CoordinateSpace>(
    frame: &Frame,
    region: &Region<S>,
    layout: &InputLayout,
) -> Result<Array4<f32>, RegionError> {
    encode(&frame.crop(region)?, layout)
}

/// Source sample positions and weight for destination index `dst`.
fn taps(dst: usize, src_len: usize, dst_len: usize) -> (usize, usize, f32) {
    let scale = src_len as f32 / dst_len as f32;
    let pos = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
    let i0 = (pos.floor() as usize).min(src_len - 1);
    let i1 = (i0 + 1).min(src_len - 1);
    (i0, i1, pos - i0 as f32)
}

fn lerp(a: u8, b: u8, t: f32) -> f32 {
    a as f32 + (b as f32 - a as f32) * t
}

/// All values of `tensor` in logical (row-major) order.
pub fn flatten(tensor: &Tensor) -> Vec<f32> {
    tensor.iter().copied().collect()
}

/// The first `count` values of a named output.
pub fn leading_values(name: &str, tensor: &Tensor, count: usize) -> Result<Vec<f32>, InferenceError> {
    if tensor.len() < count {
        return Err(InferenceError::TooFewValues {
            name: name.to_string(),
            expected: count,
            actual: tensor.len(),
        });
    }
    Ok(tensor.iter().take(count).copied().collect())
}

pub fn scalar(name: &str, tensor: &Tensor) -> Result<f32, InferenceError> {
    Ok(leading_values(name, tensor, 1)?[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::IxDyn;
    use rstest::rstest;

    use crate::shared::region::CropSpace;

    fn gradient_row(values: &[u8]) -> Frame {
        let mut data = Vec::new();
        for &v in values {
            data.extend_from_slice(&[v, v, v]);
        }
        Frame::new(data, values.len() as u32, 1, 3, 0)
    }

    #[test]
    fn test_encode_shape_is_nchw_with_batch() {
        let frame = Frame::filled(200, 100, [128, 128, 128], 0);
        let tensor = encode(&frame, &InputLayout::new(60, 40)).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 40, 60]);
    }

    #[rstest]
    #[case::bgr(ChannelOrder::Bgr, [30.0, 20.0, 10.0])]
    #[case::rgb(ChannelOrder::Rgb, [10.0, 20.0, 30.0])]
    fn test_encode_channel_order(#[case] order: ChannelOrder, #[case] expected: [f32; 3]) {
        let frame = Frame::filled(8, 8, [10, 20, 30], 0);
        let layout = InputLayout::new(4, 4).with_channel_order(order);
        let tensor = encode(&frame, &layout).unwrap();
        for (c, value) in expected.iter().enumerate() {
            assert_relative_eq!(tensor[[0, c, 2, 2]], *value);
        }
    }

    #[test]
    fn test_encode_same_size_is_identity() {
        let frame = gradient_row(&[0, 50, 100, 250]);
        let tensor = encode(&frame, &InputLayout::new(4, 1)).unwrap();
        let row: Vec<f32> = (0..4).map(|x| tensor[[0, 0, 0, x]]).collect();
        assert_eq!(row, vec![0.0, 50.0, 100.0, 250.0]);
    }

    #[test]
    fn test_encode_bilinear_upsample() {
        // Pixel-center aligned: dst 0..4 maps to src -0.25, 0.25, 0.75, 1.25
        let frame = gradient_row(&[0, 100]);
        let tensor = encode(&frame, &InputLayout::new(4, 1)).unwrap();
        let row: Vec<f32> = (0..4).map(|x| tensor[[0, 1, 0, x]]).collect();
        assert_relative_eq!(row[0], 0.0);
        assert_relative_eq!(row[1], 25.0);
        assert_relative_eq!(row[2], 75.0);
        assert_relative_eq!(row[3], 100.0);
    }

    #[test]
    fn test_encode_applies_scale() {
        let frame = Frame::filled(4, 4, [255, 255, 255], 0);
        let layout = InputLayout::new(2, 2).with_scale(1.0 / 255.0);
        let tensor = encode(&frame, &layout).unwrap();
        assert_relative_eq!(tensor[[0, 0, 0, 0]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_encode_grayscale_replicates_channel() {
        let frame = Frame::new(vec![42; 4], 2, 2, 1, 0);
        let tensor = encode(&frame, &InputLayout::new(2, 2)).unwrap();
        assert_relative_eq!(tensor[[0, 0, 1, 1]], 42.0);
        assert_relative_eq!(tensor[[0, 2, 1, 1]], 42.0);
    }

    #[test]
    fn test_encode_empty_frame_fails() {
        let frame = Frame::new(Vec::new(), 0, 10, 3, 0);
        let result = encode(&frame, &InputLayout::new(4, 4));
        assert!(matches!(result, Err(RegionError::Empty { .. })));
    }

    #[test]
    fn test_encode_region_crops_first() {
        let mut data = vec![0u8; 4 * 4 * 3];
        // bottom-right 2x2 block is white
        for y in 2..4 {
            for x in 2..4 {
                let i = (y * 4 + x) * 3;
                data[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let frame = Frame::new(data, 4, 4, 3, 0);
        let region = Region::<CropSpace>::new(2, 2, 4, 4).unwrap();
        let tensor = encode_region(&frame, &region, &InputLayout::new(2, 2)).unwrap();
        assert!(tensor.iter().all(|&v| (v - 255.0).abs() < 1e-6));
    }

    #[test]
    fn test_layout_from_shape() {
        let layout = InputLayout::from_shape(&[1, 3, 384, 672]).unwrap();
        assert_eq!((layout.width, layout.height), (672, 384));
        assert_eq!(layout.channel_order, ChannelOrder::Bgr);
    }

    #[rstest]
    #[case::dynamic(&[1, 3, -1, -1])]
    #[case::wrong_rank(&[1, 3, 60])]
    fn test_layout_from_shape_rejects(#[case] shape: &[i64]) {
        assert!(InputLayout::from_shape(shape).is_none());
    }

    #[test]
    fn test_leading_values_and_scalar() {
        let t = Tensor::from_shape_vec(IxDyn(&[1, 3]), vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(leading_values("g", &t, 2).unwrap(), vec![0.1, 0.2]);
        assert_relative_eq!(scalar("g", &t).unwrap(), 0.1);
        assert_eq!(flatten(&t).len(), 3);
    }

    #[test]
    fn test_leading_values_too_few() {
        let t = Tensor::from_shape_vec(IxDyn(&[1, 2]), vec![0.1, 0.2]).unwrap();
        let err = leading_values("gaze_vector", &t, 3).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::TooFewValues {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }
}
