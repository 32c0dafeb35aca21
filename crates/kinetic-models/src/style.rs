//! Text overlay layout styles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Available overlay layout styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStyle {
    /// Dark translucent band near the bottom, white bold sans text
    #[default]
    Bold,
    /// Opaque white header band at the top, serif black text, orange attribution
    Reference,
}

impl LayoutStyle {
    pub const ALL: &'static [LayoutStyle] = &[LayoutStyle::Bold, LayoutStyle::Reference];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutStyle::Bold => "bold",
            LayoutStyle::Reference => "reference",
        }
    }

    /// Whether the band is opaque and pushes video content below it.
    pub fn has_header_band(&self) -> bool {
        matches!(self, LayoutStyle::Reference)
    }
}

impl fmt::Display for LayoutStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LayoutStyle {
    type Err = StyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bold" => Ok(LayoutStyle::Bold),
            "reference" => Ok(LayoutStyle::Reference),
            _ => Err(StyleParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown layout style: {0}")]
pub struct StyleParseError(String);
