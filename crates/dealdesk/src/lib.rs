//! Single entry point for Dealdesk embedders.
//!
//! Re-exports the overlay core and the wire types. [`Panel`] is the
//! synchronous face of the reducer for callers that run effects themselves.

pub use dealdesk_engine as engine;
pub use dealdesk_protocol as protocol;

use engine::{project, Effect, Event, Reducer, Session, ViewModel};
use time::OffsetDateTime;

/// A session plus the reducer that advances it.
#[derive(Debug, Default)]
pub struct Panel {
    reducer: Reducer,
    session: Session,
}

impl Panel {
    pub fn new(reducer: Reducer) -> Self {
        Self {
            reducer,
            session: Session::default(),
        }
    }

    /// Apply `event` at `now`; the caller owns the returned effects.
    pub fn handle(&mut self, event: Event, now: OffsetDateTime) -> Vec<Effect> {
        let session = std::mem::take(&mut self.session);
        let (next, effects) = self.reducer.apply(session, event, now);
        self.session = next;
        effects
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn view(&self) -> ViewModel {
        project(&self.session)
    }
}
