//! Client-side price and risk approximation.
//!
//! The host computes the authoritative price; these numbers only drive the form.

use crate::session::Selection;
use dealdesk_protocol::CatalogItem;
use serde::Serialize;

const MARKUP: f64 = 1.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AmountStatus {
    Valid,
    ExceedsMax { max: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub display_price: u64,
    pub risk: RiskLevel,
    pub amount_status: Option<AmountStatus>,
}

/// High before Medium; first matching tier wins.
pub fn risk_level(base_price: f64, amount: i64) -> RiskLevel {
    if base_price > 150.0 || amount > 20 {
        RiskLevel::High
    } else if base_price > 80.0 || amount > 10 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn estimate(item: &CatalogItem, amount: i64) -> Estimate {
    if amount <= 0 {
        return Estimate::default();
    }
    let display_price = (item.base_price * amount as f64 * MARKUP).floor().max(0.0) as u64;
    let amount_status = if amount > i64::from(item.max_amount) {
        AmountStatus::ExceedsMax {
            max: item.max_amount,
        }
    } else {
        AmountStatus::Valid
    };
    Estimate {
        display_price,
        risk: risk_level(item.base_price, amount),
        amount_status: Some(amount_status),
    }
}

pub fn estimate_selection(selection: &Selection) -> Estimate {
    match &selection.item {
        Some(item) => estimate(item, selection.amount),
        None => Estimate::default(),
    }
}

/// `$` plus thousands separators; cents only when present.
pub fn format_price(price: f64) -> String {
    let sign = if price < 0.0 { "-" } else { "" };
    let cents = (price.abs() * 100.0).round() as u64;
    let (whole, frac) = (cents / 100, cents % 100);
    let mut out = format!("{sign}${}", group_thousands(whole));
    if frac != 0 {
        if frac % 10 == 0 {
            out.push_str(&format!(".{}", frac / 10));
        } else {
            out.push_str(&format!(".{frac:02}"));
        }
    }
    out
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
