use crate::shared::frame::Frame;

/// Pull-based source of frames: a video file, a camera or a single image.
///
/// Implementations hide codec and device details; the pipeline only sees
/// RGB [`Frame`]s with increasing indices.
pub trait VideoSource: Send {
    /// Returns the next frame, or `None` once the input is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Nominal frame rate, when the container or device declares one.
    fn fps(&self) -> Option<f64> {
        None
    }

    /// Releases any resources held by the source.
    fn close(&mut self) {}
}

impl<T: VideoSource + ?Sized> VideoSource for Box<T> {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        (**self).next_frame()
    }

    fn fps(&self) -> Option<f64> {
        (**self).fps()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
