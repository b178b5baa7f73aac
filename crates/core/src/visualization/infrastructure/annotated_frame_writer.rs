use std::path::{Path, PathBuf};

use crate::pipeline::frame_result::{FrameResult, FrameResultSink};
use crate::shared::frame::Frame;
use crate::visualization::domain::frame_annotator::FrameAnnotator;

/// Writes every annotated frame as `frame_NNNNNN.png` into a directory
/// using the `image` crate.
pub struct AnnotatedFrameWriter {
    dir: PathBuf,
    annotator: FrameAnnotator,
    written: usize,
}

impl AnnotatedFrameWriter {
    pub fn new(dir: &Path, annotator: FrameAnnotator) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            annotator,
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path_for(&self, frame_index: usize) -> PathBuf {
        self.dir.join(format!("frame_{frame_index:06}.png"))
    }
}

impl FrameResultSink for AnnotatedFrameWriter {
    fn consume(&mut self, frame: &Frame, result: &FrameResult) -> Result<(), Box<dyn std::error::Error>> {
        let annotated = self.annotator.annotate(frame, result);
        let path = self.path_for(result.frame_index);
        match annotated.channels() {
            1 => image::GrayImage::from_raw(
                annotated.width(),
                annotated.height(),
                annotated.data().to_vec(),
            )
            .ok_or("Failed to create image from frame data")?
            .save(&path)?,
            _ => image::RgbImage::from_raw(
                annotated.width(),
                annotated.height(),
                annotated.data().to_vec(),
            )
            .ok_or("Failed to create image from frame data")?
            .save(&path)?,
        }
        self.written += 1;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}
