use crate::estimate::{estimate_selection, format_price, AmountStatus, RiskLevel};
use crate::session::{Notice, Session};
use serde::Serialize;
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;

/// Everything a shell needs to draw the panel, derived from a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    pub is_open: bool,
    pub closing: bool,
    pub player: PlayerView,
    pub items: Vec<ItemOption>,
    pub selected: Option<SelectedView>,
    pub amount: i64,
    pub estimated_price: String,
    pub risk: RiskLevel,
    pub risk_label: &'static str,
    pub amount_status: Option<AmountStatus>,
    pub sell_enabled: bool,
    pub sell_label: &'static str,
    pub notice: Option<Notice>,
    pub css_vars: BTreeMap<String, String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub level_text: String,
    pub title: String,
    pub xp: u64,
    pub next_level_xp: u64,
    pub xp_percent: f64,
    pub xp_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOption {
    pub value: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedView {
    pub name: String,
    pub label: String,
    pub description: String,
    pub base_price: String,
    pub max_amount: u32,
}

pub fn project(session: &Session) -> ViewModel {
    let player = &session.player;
    let estimate = estimate_selection(&session.selection);

    ViewModel {
        is_open: session.is_open,
        closing: session.closing(),
        player: PlayerView {
            level_text: format!("Level {}", player.level),
            title: player.title.clone(),
            xp: player.xp,
            next_level_xp: player.next_level_xp,
            xp_percent: player.xp_percent(),
            xp_text: format!("{} / {} XP", player.xp, player.next_level_xp),
        },
        items: session
            .catalog
            .iter()
            .map(|item| ItemOption {
                value: item.name.clone(),
                text: format!("{} ({})", item.label, format_price(item.base_price)),
            })
            .collect(),
        selected: session.selection.item.as_ref().map(|item| SelectedView {
            name: item.name.clone(),
            label: item.label.clone(),
            description: item.description.clone(),
            base_price: format_price(item.base_price),
            max_amount: item.max_amount,
        }),
        amount: session.selection.amount,
        estimated_price: format_price(estimate.display_price as f64),
        risk: estimate.risk,
        risk_label: estimate.risk.label(),
        amount_status: estimate.amount_status,
        sell_enabled: session.is_open && !session.sell_in_flight,
        sell_label: if session.sell_in_flight {
            "Processing..."
        } else {
            "Make Deal"
        },
        notice: session.notice.clone(),
        css_vars: session.theme.css_variables(),
        expires_at: session
            .expiry_deadline
            .and_then(|deadline| deadline.format(&Rfc3339).ok()),
    }
}
