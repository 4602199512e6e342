//! View-state reducer.
//!
//! `apply` is the only place a [`Session`] changes. It never performs I/O:
//! everything the outside world must do is returned as an [`Effect`], and
//! the results come back later as new [`Event`]s.

use crate::estimate::format_price;
use crate::retry::CatalogSource;
use crate::session::{NoticeKind, Selection, Session};
use crate::theme::validate_colors;
use crate::timer::AUTO_EXPIRY;
use dealdesk_protocol::{
    CatalogItem, Coords, HostMessage, OpenPayload, SellRequest, SellResult, ThemeColors,
};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;

/// Stepper ceiling while nothing is selected.
const UNSELECTED_MAX_AMOUNT: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    HostOpened(OpenPayload),
    HostClosed,
    HostError { text: String },
    UserSelectedItem { name: String },
    UserChangedAmount { value: i64 },
    UserSteppedAmount { delta: i64 },
    UserRequestedSell,
    UserRequestedClose,
    UserSavedColors { colors: ThemeColors },
    SellCompleted { generation: u64, result: SellResult },
    SellErrored { generation: u64, error: String },
    CatalogLoaded {
        generation: u64,
        items: Vec<CatalogItem>,
        source: CatalogSource,
    },
    ColorsSaved { success: bool, message: Option<String> },
    ExpiryFired { generation: u64 },
    /// Close guard settle delay elapsed for the session `generation`.
    CloseSettled { generation: u64 },
    NoticeExpired { id: u64 },
}

impl Event {
    /// `None` for actions this overlay does not understand.
    pub fn from_host(msg: HostMessage) -> Option<Event> {
        match msg {
            HostMessage::Open(open) => Some(Event::HostOpened(open)),
            HostMessage::Close => Some(Event::HostClosed),
            HostMessage::Error { text } => Some(Event::HostError { text }),
            HostMessage::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Cancel any pending countdown and start a new one.
    ArmExpiry { generation: u64, after: Duration },
    CancelExpiry,
    RequestPlayerStats,
    /// Catalog fetch through the retry policy.
    FetchCatalog { generation: u64 },
    SendSell { generation: u64, request: SellRequest },
    /// Fire the close notification, then settle the close guard.
    SendClose { generation: u64 },
    SaveColors { colors: ThemeColors },
    /// Schedule dismissal of the notice.
    ShowNotice(crate::session::Notice),
}

#[derive(Debug, Clone, Copy)]
pub struct Reducer {
    pub expiry: Duration,
}

impl Default for Reducer {
    fn default() -> Self {
        Self {
            expiry: AUTO_EXPIRY,
        }
    }
}

impl Reducer {
    pub fn new(expiry: Duration) -> Self {
        Self { expiry }
    }

    pub fn apply(
        &self,
        mut session: Session,
        event: Event,
        now: OffsetDateTime,
    ) -> (Session, Vec<Effect>) {
        let mut effects = Vec::new();

        match event {
            Event::HostOpened(open) => {
                session.generation += 1;
                if session.close_guard.is_in_flight() {
                    debug!(generation = session.generation, "reopened before close settled");
                }
                session.close_guard.release();
                session.is_open = true;
                session.auth_token = open.token.clone();
                session.sell_in_flight = false;
                session.expiry_deadline = Some(now + self.expiry);
                session.player.apply_open(&open);
                if let Some(colors) = &open.colors {
                    session.theme.colors.merge(colors);
                }
                if let Some(gradients) = &open.gradients {
                    session.theme.gradients.merge(gradients);
                }
                effects.push(Effect::ArmExpiry {
                    generation: session.generation,
                    after: self.expiry,
                });
                effects.push(Effect::RequestPlayerStats);
                effects.push(Effect::FetchCatalog {
                    generation: session.generation,
                });
            }

            Event::HostClosed | Event::UserRequestedClose => {
                close(&mut session, &mut effects);
            }

            Event::ExpiryFired { generation } => {
                if generation != session.generation || !session.is_open {
                    debug!(generation, current = session.generation, "stale expiry ignored");
                } else {
                    close(&mut session, &mut effects);
                }
            }

            Event::HostError { text } => {
                let notice = session.notify(NoticeKind::Error, text);
                effects.push(Effect::ShowNotice(notice));
            }

            Event::UserSelectedItem { name } => {
                session.selection = Selection {
                    item: session.find_item(&name).cloned(),
                    amount: 1,
                };
            }

            Event::UserChangedAmount { value } => {
                session.selection.amount = value;
            }

            Event::UserSteppedAmount { delta } => {
                let current = if session.selection.amount >= 1 {
                    session.selection.amount
                } else {
                    1
                };
                let max = session
                    .selection
                    .item
                    .as_ref()
                    .map_or(UNSELECTED_MAX_AMOUNT, |item| i64::from(item.max_amount));
                if delta < 0 && current > 1 {
                    session.selection.amount = current - 1;
                } else if delta > 0 && current < max {
                    session.selection.amount = current + 1;
                }
            }

            Event::UserRequestedSell => request_sell(&mut session, &mut effects),

            Event::SellCompleted { generation, result } => {
                if generation != session.generation {
                    debug!(generation, "stale sell result ignored");
                } else {
                    session.sell_in_flight = false;
                    let notice = match result {
                        SellResult::Success {
                            money_earned,
                            xp_gained,
                            new_xp,
                        } => {
                            if let Some(xp) = new_xp {
                                session.player.xp = xp;
                            }
                            session.selection = Selection::default();
                            session.notify(
                                NoticeKind::Success,
                                format!(
                                    "Deal successful! Earned {} (+{xp_gained} XP)",
                                    format_price(money_earned)
                                ),
                            )
                        }
                        SellResult::Failure { reason } => {
                            session.notify(NoticeKind::Error, reason.message())
                        }
                    };
                    effects.push(Effect::ShowNotice(notice));
                }
            }

            Event::SellErrored { generation, error } => {
                if generation != session.generation {
                    debug!(generation, %error, "stale sell error ignored");
                } else {
                    session.sell_in_flight = false;
                    let notice = session.notify(NoticeKind::Error, "Connection error - try again");
                    effects.push(Effect::ShowNotice(notice));
                }
            }

            Event::CatalogLoaded {
                generation,
                items,
                source,
            } => {
                if generation != session.generation {
                    debug!(generation, current = session.generation, "stale catalog ignored");
                } else {
                    session.catalog = items;
                    let refreshed = session
                        .selection
                        .item
                        .as_ref()
                        .and_then(|item| session.find_item(&item.name).cloned());
                    match refreshed {
                        Some(item) => session.selection.item = Some(item),
                        None if session.selection.item.is_some() => {
                            session.selection = Selection::default();
                        }
                        None => {}
                    }
                    if let CatalogSource::Fallback { attempts } = source {
                        let notice = session.notify(
                            NoticeKind::Error,
                            format!("Failed to load available items after {attempts} attempts"),
                        );
                        effects.push(Effect::ShowNotice(notice));
                    }
                }
            }

            Event::UserSavedColors { colors } => match validate_colors(&colors) {
                Ok(colors) => {
                    session.theme.colors.merge(&colors);
                    effects.push(Effect::SaveColors { colors });
                }
                Err(err) => {
                    let notice = session.notify(NoticeKind::Error, err.to_string());
                    effects.push(Effect::ShowNotice(notice));
                }
            },

            Event::ColorsSaved { success, message } => {
                let notice = if success {
                    session.notify(NoticeKind::Success, "Colors saved")
                } else {
                    session.notify(
                        NoticeKind::Error,
                        message.unwrap_or_else(|| "Failed to save colors".to_string()),
                    )
                };
                effects.push(Effect::ShowNotice(notice));
            }

            Event::CloseSettled { generation } => {
                if generation == session.generation {
                    session.close_guard.release();
                } else {
                    debug!(generation, current = session.generation, "stale close settle ignored");
                }
            }

            Event::NoticeExpired { id } => {
                if session.notice.as_ref().is_some_and(|n| n.id == id) {
                    session.notice = None;
                }
            }
        }

        (session, effects)
    }
}

/// At most one close notification until the guard settles.
fn close(session: &mut Session, effects: &mut Vec<Effect>) {
    let generation = session.generation;
    let sent = session.close_guard.guard(|| {
        effects.push(Effect::CancelExpiry);
        effects.push(Effect::SendClose { generation });
    });
    if sent {
        session.end();
    } else {
        debug!("close already in flight");
    }
}

fn request_sell(session: &mut Session, effects: &mut Vec<Effect>) {
    if !session.is_open || session.sell_in_flight {
        debug!(
            open = session.is_open,
            in_flight = session.sell_in_flight,
            "sell request ignored"
        );
        return;
    }

    let amount = session.selection.amount;
    let rejection = match &session.selection.item {
        None => Some("Please select an item to sell".to_string()),
        Some(_) if amount < 1 => Some("Please enter a valid amount".to_string()),
        Some(item) if amount > i64::from(item.max_amount) => Some(format!(
            "Maximum amount for {} is {}",
            item.label, item.max_amount
        )),
        Some(_) => None,
    };
    if let Some(text) = rejection {
        let notice = session.notify(NoticeKind::Error, text);
        effects.push(Effect::ShowNotice(notice));
        return;
    }

    let Some(item) = &session.selection.item else {
        return;
    };
    let request = SellRequest {
        item: item.name.clone(),
        // Bounded by max_amount above.
        amount: amount as u32,
        coords: Coords::default(),
    };
    session.sell_in_flight = true;
    let notice = session.notify(NoticeKind::Info, "Negotiating with buyer...");
    effects.push(Effect::SendSell {
        generation: session.generation,
        request,
    });
    effects.push(Effect::ShowNotice(notice));
}
