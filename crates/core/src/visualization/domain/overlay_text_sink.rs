use crate::pipeline::frame_result::{FrameResult, FrameResultSink};
use crate::shared::frame::Frame;
use crate::visualization::domain::overlay_flags::OverlayFlags;

/// Text lines describing `result` for the enabled flags.
pub fn overlay_lines(flags: OverlayFlags, result: &FrameResult) -> Vec<String> {
    let mut lines = Vec::new();
    if flags.face {
        let (x0, y0, x1, y1) = result.face_box.as_tuple();
        lines.push(format!(
            "Face: ({x0}, {y0})-({x1}, {y1}) conf {:.2}",
            result.face_confidence
        ));
    }
    if flags.head_pose {
        let p = result.pose;
        lines.push(format!(
            "Head pose: yaw: {:.3}, pitch: {:.3}, roll: {:.3}",
            p.yaw, p.pitch, p.roll
        ));
    }
    if flags.landmarks {
        let coords = result
            .landmarks
            .points()
            .iter()
            .map(|p| format!("({}, {})", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!("Landmarks: {coords}"));
    }
    if flags.gaze {
        let g = result.gaze;
        lines.push(format!(
            "Gaze estimate: x: {:.3}, y: {:.3}, z: {:.3}",
            g.x, g.y, g.z
        ));
    }
    lines
}

/// Logs the selected intermediate results of every frame.
pub struct OverlayTextSink {
    flags: OverlayFlags,
}

impl OverlayTextSink {
    pub fn new(flags: OverlayFlags) -> Self {
        Self { flags }
    }
}

impl FrameResultSink for OverlayTextSink {
    fn consume(&mut self, _frame: &Frame, result: &FrameResult) -> Result<(), Box<dyn std::error::Error>> {
        for line in overlay_lines(self.flags, result) {
            log::info!("[frame {}] {line}", result.frame_index);
        }
        Ok(())
    }
}
