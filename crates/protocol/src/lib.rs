use serde::{Deserialize, Serialize};

/// Messages pushed by the host into the overlay.
///
/// Unknown `action` values decode to [`HostMessage::Unknown`] so a newer host
/// never crashes an older overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum HostMessage {
    Open(OpenPayload),
    Close,
    Error {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_title: Option<String>,
    #[serde(default, rename = "playerXP", skip_serializing_if = "Option::is_none")]
    pub player_xp: Option<u64>,
    #[serde(default, rename = "nextLevelXP", skip_serializing_if = "Option::is_none")]
    pub next_level_xp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<ThemeColors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradients: Option<ThemeGradients>,
}

/// Color overrides. Absent fields leave the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeColors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_muted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ThemeColors {
    /// Overlay every field present in `other` onto `self`.
    pub fn merge(&mut self, other: &ThemeColors) {
        fn take(dst: &mut Option<String>, src: &Option<String>) {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }
        take(&mut self.primary, &other.primary);
        take(&mut self.secondary, &other.secondary);
        take(&mut self.background, &other.background);
        take(&mut self.background_alt, &other.background_alt);
        take(&mut self.text, &other.text);
        take(&mut self.text_muted, &other.text_muted);
        take(&mut self.success, &other.success);
        take(&mut self.warning, &other.warning);
        take(&mut self.error, &other.error);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeGradients {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_bar: Option<String>,
}

impl ThemeGradients {
    pub fn merge(&mut self, other: &ThemeGradients) {
        if let Some(v) = &other.panel {
            self.panel = Some(v.clone());
        }
        if let Some(v) = &other.header {
            self.header = Some(v.clone());
        }
        if let Some(v) = &other.xp_bar {
            self.xp_bar = Some(v.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub base_price: f64,
    pub max_amount: u32,
    #[serde(default)]
    pub description: String,
}

/// Body returned by `/getAvailableItems`. A missing `items` field is an empty catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub items: Vec<CatalogItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellRequest {
    pub item: String,
    pub amount: u32,
    pub coords: Coords,
}

/// Flat response shape of `/requestSell`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money_earned: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_gained: Option<i64>,
    #[serde(default, rename = "playerXP", skip_serializing_if = "Option::is_none")]
    pub player_xp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SellResponse {
    /// Stand-in for a `/requestSell` call that answered with an empty body.
    pub fn empty() -> Self {
        Self {
            success: false,
            reason: Some(ReasonCode::EmptyResponse.as_str().to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SellResult {
    Success {
        money_earned: f64,
        xp_gained: i64,
        new_xp: Option<u64>,
    },
    Failure {
        reason: ReasonCode,
    },
}

impl From<SellResponse> for SellResult {
    fn from(resp: SellResponse) -> Self {
        if resp.success {
            SellResult::Success {
                money_earned: resp.money_earned.unwrap_or(0.0),
                xp_gained: resp.xp_gained.unwrap_or(0),
                new_xp: resp.player_xp,
            }
        } else {
            let code = resp.reason.as_deref().unwrap_or("unknown");
            SellResult::Failure {
                reason: ReasonCode::from_code(code),
            }
        }
    }
}

/// Business rejection reasons returned by the host for a failed sell.
///
/// Codes the overlay does not know are kept verbatim in [`ReasonCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReasonCode {
    NoToken,
    NoBuyer,
    InvalidItem,
    InvalidAmount,
    NotEnough,
    LevelTooLow,
    DealFailed,
    RateLimit,
    Cooldown,
    EmptyResponse,
    Other(String),
}

impl ReasonCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "no_token" => Self::NoToken,
            "no_buyer" => Self::NoBuyer,
            "invalid_item" => Self::InvalidItem,
            "invalid_amount" => Self::InvalidAmount,
            "not_enough" => Self::NotEnough,
            "level_too_low" => Self::LevelTooLow,
            "deal_failed" => Self::DealFailed,
            "rate_limit" => Self::RateLimit,
            "cooldown" => Self::Cooldown,
            "empty_response" => Self::EmptyResponse,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoToken => "no_token",
            Self::NoBuyer => "no_buyer",
            Self::InvalidItem => "invalid_item",
            Self::InvalidAmount => "invalid_amount",
            Self::NotEnough => "not_enough",
            Self::LevelTooLow => "level_too_low",
            Self::DealFailed => "deal_failed",
            Self::RateLimit => "rate_limit",
            Self::Cooldown => "cooldown",
            Self::EmptyResponse => "empty_response",
            Self::Other(code) => code,
        }
    }

    /// User-facing text for the status line.
    pub fn message(&self) -> String {
        match self {
            Self::NoToken => "No active session - request a new one".to_string(),
            Self::NoBuyer => "No buyer found - find someone to sell to".to_string(),
            Self::InvalidItem => "Invalid item selected".to_string(),
            Self::InvalidAmount => "Invalid amount specified".to_string(),
            Self::NotEnough => "You don't have enough of this item".to_string(),
            Self::LevelTooLow => "Your level is too low for this item".to_string(),
            Self::DealFailed => "Buyer rejected the deal".to_string(),
            Self::RateLimit => "Selling too fast - slow down".to_string(),
            Self::Cooldown => "Wait before making another deal".to_string(),
            Self::EmptyResponse => "Server communication error".to_string(),
            Self::Other(code) => format!("Deal failed: {code}"),
        }
    }
}

impl From<String> for ReasonCode {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<ReasonCode> for String {
    fn from(code: ReasonCode) -> Self {
        code.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveColorsRequest {
    pub colors: ThemeColors,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveColorsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Host callbacks the overlay posts to, relative to the resource base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Ready,
    Test,
    RequestPlayerStats,
    GetAvailableItems,
    RequestSell,
    Close,
    SaveColors,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Ready => endpoints::READY,
            Endpoint::Test => endpoints::TEST,
            Endpoint::RequestPlayerStats => endpoints::REQUEST_PLAYER_STATS,
            Endpoint::GetAvailableItems => endpoints::GET_AVAILABLE_ITEMS,
            Endpoint::RequestSell => endpoints::REQUEST_SELL,
            Endpoint::Close => endpoints::CLOSE,
            Endpoint::SaveColors => endpoints::SAVE_COLORS,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

pub mod endpoints {
    pub const READY: &str = "ready";
    pub const TEST: &str = "test";
    pub const REQUEST_PLAYER_STATS: &str = "requestPlayerStats";
    pub const GET_AVAILABLE_ITEMS: &str = "getAvailableItems";
    pub const REQUEST_SELL: &str = "requestSell";
    pub const CLOSE: &str = "close";
    pub const SAVE_COLORS: &str = "saveColors";
}
