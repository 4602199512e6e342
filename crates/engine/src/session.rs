use crate::guard::SingleFlight;
use crate::theme::Theme;
use dealdesk_protocol::{CatalogItem, OpenPayload};
use serde::Serialize;
use time::OffsetDateTime;

/// Progress shown for the player. Mutated only by host messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub level: u32,
    pub title: String,
    pub xp: u64,
    pub next_level_xp: u64,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            level: 0,
            title: "Street Rookie".to_string(),
            xp: 0,
            next_level_xp: 100,
        }
    }
}

impl PlayerStats {
    /// Stats arrive only when the host includes a level; partial payloads
    /// keep whatever the host left out.
    pub fn apply_open(&mut self, open: &OpenPayload) {
        let Some(level) = open.player_level else {
            return;
        };
        self.level = level;
        if let Some(title) = &open.player_title {
            self.title = title.clone();
        }
        if let Some(xp) = open.player_xp {
            self.xp = xp;
        }
        if let Some(next) = open.next_level_xp {
            self.next_level_xp = next.max(1);
        }
    }

    /// XP bar fill in percent, clamped to `0..=100`.
    pub fn xp_percent(&self) -> f64 {
        if self.next_level_xp <= self.xp {
            return 100.0;
        }
        // The host only reports the next threshold; level 2+ assumes a 100 XP floor.
        let prev = if self.level > 1 { 100 } else { 0 };
        let span = self.next_level_xp.saturating_sub(prev);
        if span == 0 {
            return 100.0;
        }
        let gained = self.xp as f64 - prev as f64;
        (gained / span as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Item picked in the form plus the raw amount typed by the user.
///
/// `amount` is kept verbatim; an amount above `max_amount` is representable
/// and only flagged by the estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub item: Option<CatalogItem>,
    pub amount: i64,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            item: None,
            amount: 1,
        }
    }
}

impl Selection {
    pub fn is_valid(&self) -> bool {
        match &self.item {
            Some(item) => self.amount >= 1 && self.amount <= i64::from(item.max_amount),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// Transient status line. `id` lets a dismissal timer clear only its own notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub text: String,
}

/// Live state for one open/close cycle, owned by the reducer.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub is_open: bool,
    pub auth_token: Option<String>,
    /// Bumped on every open; late results tagged with an older value are dropped.
    pub generation: u64,
    pub close_guard: SingleFlight,
    pub expiry_deadline: Option<OffsetDateTime>,
    pub player: PlayerStats,
    pub catalog: Vec<CatalogItem>,
    pub selection: Selection,
    pub sell_in_flight: bool,
    pub notice: Option<Notice>,
    pub theme: Theme,
    next_notice_id: u64,
}

impl Session {
    pub fn closing(&self) -> bool {
        self.close_guard.is_in_flight()
    }

    pub fn find_item(&self, name: &str) -> Option<&CatalogItem> {
        self.catalog.iter().find(|item| item.name == name)
    }

    /// Replace the current notice and return a copy for the dismissal timer.
    pub fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) -> Notice {
        self.next_notice_id += 1;
        let notice = Notice {
            id: self.next_notice_id,
            kind,
            text: text.into(),
        };
        self.notice = Some(notice.clone());
        notice
    }

    /// Drop per-open state. Stats, catalog, theme and counters survive.
    pub(crate) fn end(&mut self) {
        self.is_open = false;
        self.auth_token = None;
        self.expiry_deadline = None;
        self.sell_in_flight = false;
        self.selection = Selection::default();
    }
}
