use std::path::Path;

use crate::shared::frame::Frame;
use crate::video::domain::video_source::VideoSource;

/// A single image presented as a one-frame stream.
pub struct ImageFileSource {
    frame: Option<Frame>,
}

impl ImageFileSource {
    /// Decodes the image eagerly so a bad file fails at open time.
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let rgb = image::open(path)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Self {
            frame: Some(Frame::new(rgb.into_raw(), width, height, 3, 0)),
        })
    }
}

impl VideoSource for ImageFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        Ok(self.frame.take())
    }

    fn close(&mut self) {
        self.frame = None;
    }
}
