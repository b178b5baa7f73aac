use std::fmt;
use std::str::FromStr;

use crate::estimation::domain::gaze_stage::GazeVector;
use crate::shared::constants::DEFAULT_POINTER_INTERVAL;

/// Moves an on-screen pointer by a relative offset.
pub trait PointerController: Send {
    fn move_by(&mut self, dx: f64, dy: f64) -> Result<(), Box<dyn std::error::Error>>;
}

impl<T: PointerController + ?Sized> PointerController for Box<T> {
    fn move_by(&mut self, dx: f64, dy: f64) -> Result<(), Box<dyn std::error::Error>> {
        (**self).move_by(dx, dy)
    }
}

/// Gain applied to the gaze vector before it reaches the pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointerPrecision {
    High,
    #[default]
    Medium,
    Low,
}

impl PointerPrecision {
    pub fn gain(&self) -> f64 {
        match self {
            PointerPrecision::High => 100.0,
            PointerPrecision::Medium => 500.0,
            PointerPrecision::Low => 1000.0,
        }
    }
}

impl FromStr for PointerPrecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(PointerPrecision::High),
            "medium" => Ok(PointerPrecision::Medium),
            "low" => Ok(PointerPrecision::Low),
            other => Err(format!("unknown precision '{other}' (expected high, medium or low)")),
        }
    }
}

impl fmt::Display for PointerPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PointerPrecision::High => "high",
            PointerPrecision::Medium => "medium",
            PointerPrecision::Low => "low",
        })
    }
}

/// Scales moves by a gain and flips the vertical axis: gaze `y` points
/// up while screen `y` grows downwards.
pub struct ScaledPointer<P> {
    inner: P,
    gain: f64,
}

impl<P: PointerController> ScaledPointer<P> {
    pub fn new(inner: P, precision: PointerPrecision) -> Self {
        Self::with_gain(inner, precision.gain())
    }

    pub fn with_gain(inner: P, gain: f64) -> Self {
        Self { inner, gain }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: PointerController> PointerController for ScaledPointer<P> {
    fn move_by(&mut self, dx: f64, dy: f64) -> Result<(), Box<dyn std::error::Error>> {
        self.inner.move_by(dx * self.gain, -dy * self.gain)
    }
}

/// Forwards every `interval`-th gaze vector to the pointer.
///
/// Only frames that produced a gaze count towards the interval.
pub struct ThrottledPointer {
    inner: Box<dyn PointerController>,
    interval: usize,
    processed: usize,
    moves: usize,
}

impl ThrottledPointer {
    pub fn new(inner: Box<dyn PointerController>, interval: usize) -> Self {
        Self {
            inner,
            interval: interval.max(1),
            processed: 0,
            moves: 0,
        }
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    pub fn moves(&self) -> usize {
        self.moves
    }

    /// Counts one processed frame. Returns whether the pointer moved.
    pub fn on_gaze(&mut self, gaze: &GazeVector) -> Result<bool, Box<dyn std::error::Error>> {
        self.processed += 1;
        if self.processed % self.interval != 0 {
            return Ok(false);
        }
        self.inner.move_by(f64::from(gaze.x), f64::from(gaze.y))?;
        self.moves += 1;
        Ok(true)
    }
}

impl Default for ThrottledPointer {
    fn default() -> Self {
        Self::new(Box::new(NoopPointer), DEFAULT_POINTER_INTERVAL)
    }
}

/// Pointer that ignores moves.
pub struct NoopPointer;

impl PointerController for NoopPointer {
    fn move_by(&mut self, _dx: f64, _dy: f64) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
