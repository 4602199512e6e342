//! Overlay core for Dealdesk.
//!
//! The [`reducer`] owns all session state transitions. The remaining modules
//! are the pieces it hands work to: the estimator, retry policy, close guard,
//! expiry timer and host transport.

pub mod estimate;
pub mod guard;
pub mod reducer;
pub mod retry;
pub mod session;
pub mod theme;
pub mod timer;
pub mod transport;
pub mod view;

pub use estimate::{estimate, format_price, risk_level, AmountStatus, Estimate, RiskLevel};
pub use guard::{SingleFlight, CLOSE_SETTLE};
pub use reducer::{Effect, Event, Reducer};
pub use retry::{fetch_catalog_with_retry, CatalogSource, Exhausted, RetryPolicy};
pub use session::{Notice, NoticeKind, PlayerStats, Selection, Session};
pub use timer::{ExpiryTimer, AUTO_EXPIRY};
pub use transport::{HostTransport, HttpTransport, TransportError};
pub use view::{project, ViewModel};
