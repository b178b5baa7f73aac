use crate::pointer::domain::pointer_controller::PointerController;

/// Pointer that logs moves and tracks where the pointer would be,
/// starting from the origin.
#[derive(Debug, Default)]
pub struct LoggingPointerController {
    position: (f64, f64),
    moves: usize,
}

impl LoggingPointerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn moves(&self) -> usize {
        self.moves
    }
}

impl PointerController for LoggingPointerController {
    fn move_by(&mut self, dx: f64, dy: f64) -> Result<(), Box<dyn std::error::Error>> {
        self.position.0 += dx;
        self.position.1 += dy;
        self.moves += 1;
        log::info!(
            "Pointer move ({dx:+.1}, {dy:+.1}) -> ({:.1}, {:.1})",
            self.position.0,
            self.position.1
        );
        Ok(())
    }
}
