use std::time::Duration;

/// How long the close guard stays held after the close request finishes.
pub const CLOSE_SETTLE: Duration = Duration::from_millis(500);

/// At most one in-progress instance of an action class.
///
/// Release is driven by the caller after a settle delay, not by the outcome of
/// the guarded action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SingleFlight {
    in_flight: bool,
}

impl SingleFlight {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Run `action` unless another one is already in flight.
    ///
    /// Returns `false` without running anything when the guard is held.
    pub fn guard(&mut self, action: impl FnOnce()) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        action();
        true
    }

    pub fn release(&mut self) {
        self.in_flight = false;
    }
}
