use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown visualization flag '{0}' (expected any of F, H, L, G)")]
pub struct UnknownOverlayFlag(pub char);

/// Which intermediate results to visualize.
///
/// Parsed from a string of letters: `F` face box, `H` head pose,
/// `L` landmarks and eye boxes, `G` gaze vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayFlags {
    pub face: bool,
    pub head_pose: bool,
    pub landmarks: bool,
    pub gaze: bool,
}

impl OverlayFlags {
    pub fn all() -> Self {
        Self {
            face: true,
            head_pose: true,
            landmarks: true,
            gaze: true,
        }
    }

    /// Parses flags, case-insensitively. Whitespace and commas are ignored.
    pub fn parse(flags: &str) -> Result<Self, UnknownOverlayFlag> {
        let mut parsed = Self::default();
        for c in flags.chars().filter(|c| !c.is_whitespace() && *c != ',') {
            match c.to_ascii_uppercase() {
                'F' => parsed.face = true,
                'H' => parsed.head_pose = true,
                'L' => parsed.landmarks = true,
                'G' => parsed.gaze = true,
                _ => return Err(UnknownOverlayFlag(c)),
            }
        }
        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        !(self.face || self.head_pose || self.landmarks || self.gaze)
    }

    /// Flags that are drawn into the image rather than written as text.
    pub fn draws_geometry(&self) -> bool {
        self.face || self.landmarks
    }
}
