use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::pipeline::frame_result::FrameResult;
use crate::shared::frame::Frame;
use crate::shared::region::{FrameSpace, Point, Region};
use crate::visualization::domain::overlay_flags::OverlayFlags;

const GREEN: [u8; 3] = [0, 255, 0];
const CYAN: [u8; 3] = [0, 255, 255];
const BOX_THICKNESS: u32 = 2;
const DOT_RADIUS: i32 = 10;
const DOT_THICKNESS: i32 = 4;

/// Draws the face box, landmarks and eye boxes of a result onto a copy of
/// its frame. Pose and gaze have no geometric overlay here; they are
/// reported as text by [`OverlayTextSink`](super::overlay_text_sink::OverlayTextSink).
pub struct FrameAnnotator {
    flags: OverlayFlags,
}

impl FrameAnnotator {
    pub fn new(flags: OverlayFlags) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> OverlayFlags {
        self.flags
    }

    pub fn annotate(&self, frame: &Frame, result: &FrameResult) -> Frame {
        let mut img = rgb_image(frame);

        if self.flags.face {
            draw_box(&mut img, &result.face_box, BOX_THICKNESS, GREEN);
        }
        if self.flags.landmarks {
            for point in result.landmarks.points() {
                draw_ring(&mut img, *point, GREEN);
            }
            for eye in &result.eye_regions {
                draw_box(&mut img, eye, 1, CYAN);
            }
        }

        let (width, height) = img.dimensions();
        Frame::new(img.into_raw(), width, height, 3, frame.index())
    }
}

/// Copies a frame into an RGB image; grayscale is replicated.
fn rgb_image(frame: &Frame) -> RgbImage {
    let pixels = frame.as_ndarray();
    let gray = frame.channels() == 1;
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let (x, y) = (x as usize, y as usize);
        if gray {
            Rgb([pixels[[y, x, 0]]; 3])
        } else {
            Rgb([pixels[[y, x, 0]], pixels[[y, x, 1]], pixels[[y, x, 2]]])
        }
    })
}

/// Outline drawn inwards from the region's edges.
fn draw_box(img: &mut RgbImage, region: &Region<FrameSpace>, thickness: u32, color: [u8; 3]) {
    for t in 0..thickness {
        let (w, h) = (region.width(), region.height());
        if w <= 2 * t || h <= 2 * t {
            break;
        }
        let rect = Rect::at(region.xmin() + t as i32, region.ymin() + t as i32)
            .of_size(w - 2 * t, h - 2 * t);
        draw_hollow_rect_mut(img, rect, Rgb(color));
    }
}

fn draw_ring(img: &mut RgbImage, center: Point<FrameSpace>, color: [u8; 3]) {
    let inner = (DOT_RADIUS - DOT_THICKNESS / 2).max(0);
    for radius in inner..=DOT_RADIUS + DOT_THICKNESS / 2 {
        draw_hollow_circle_mut(img, (center.x, center.y), radius, Rgb(color));
    }
}
