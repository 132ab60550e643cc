//! Single-shot scheduled events on a room's simulation clock

/// One outstanding deadline. Scheduling again replaces the pending one, so a
/// stale event can never fire after the room has moved on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timer {
    fires_at: Option<f64>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer `delay_ms` after `now`, cancelling any pending deadline.
    pub fn schedule(&mut self, now: f64, delay_ms: f64) {
        self.fires_at = Some(now + delay_ms);
    }

    pub fn cancel(&mut self) {
        self.fires_at = None;
    }

    pub fn is_pending(&self) -> bool {
        self.fires_at.is_some()
    }

    /// Returns true exactly once, on the first call at or after the deadline.
    pub fn fire(&mut self, now: f64) -> bool {
        match self.fires_at {
            Some(at) if now >= at => {
                self.fires_at = None;
                true
            }
            _ => false,
        }
    }
}
