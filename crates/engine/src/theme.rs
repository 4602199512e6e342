use dealdesk_protocol::{ThemeColors, ThemeGradients};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Theme {
    pub colors: ThemeColors,
    pub gradients: ThemeGradients,
}

impl Theme {
    /// CSS custom properties the shell should set on the document root.
    pub fn css_variables(&self) -> BTreeMap<String, String> {
        let c = &self.colors;
        let g = &self.gradients;
        [
            ("--color-primary", &c.primary),
            ("--color-secondary", &c.secondary),
            ("--color-background", &c.background),
            ("--color-background-alt", &c.background_alt),
            ("--color-text", &c.text),
            ("--color-text-muted", &c.text_muted),
            ("--color-success", &c.success),
            ("--color-warning", &c.warning),
            ("--color-error", &c.error),
            ("--gradient-panel", &g.panel),
            ("--gradient-header", &g.header),
            ("--gradient-xp", &g.xp_bar),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
        .collect()
    }
}

pub const PRESET_NAMES: [&str; 6] = ["default", "blue", "purple", "red", "gold", "cyan"];

/// Built-in palettes. Only the primary color differs between them.
pub fn preset(name: &str) -> Option<ThemeColors> {
    let primary = match name {
        "default" => "#00ff88",
        "blue" => "#00aaff",
        "purple" => "#aa00ff",
        "red" => "#ff0044",
        "gold" => "#ffaa00",
        "cyan" => "#00ffff",
        _ => return None,
    };
    Some(ThemeColors {
        primary: Some(primary.to_string()),
        success: Some("#00ff88".to_string()),
        warning: Some("#ffaa00".to_string()),
        error: Some("#ff4444".to_string()),
        text: Some("#ffffff".to_string()),
        text_muted: Some("#a0a0a0".to_string()),
        ..ThemeColors::default()
    })
}

/// Accept `RRGGBB` or `#RRGGBB` and return the `#`-prefixed form.
pub fn normalize_hex(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("#{digits}"))
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidColor {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for InvalidColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid color for {}: {}", self.field, self.value)
    }
}

impl std::error::Error for InvalidColor {}

/// Normalise every present color, failing on the first malformed one.
pub fn validate_colors(colors: &ThemeColors) -> Result<ThemeColors, InvalidColor> {
    fn check(field: &'static str, value: &Option<String>) -> Result<Option<String>, InvalidColor> {
        match value {
            None => Ok(None),
            Some(v) => normalize_hex(v).map(Some).ok_or_else(|| InvalidColor {
                field,
                value: v.clone(),
            }),
        }
    }

    Ok(ThemeColors {
        primary: check("primary", &colors.primary)?,
        secondary: check("secondary", &colors.secondary)?,
        background: check("background", &colors.background)?,
        background_alt: check("backgroundAlt", &colors.background_alt)?,
        text: check("text", &colors.text)?,
        text_muted: check("textMuted", &colors.text_muted)?,
        success: check("success", &colors.success)?,
        warning: check("warning", &colors.warning)?,
        error: check("error", &colors.error)?,
    })
}
