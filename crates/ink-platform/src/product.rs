use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of package the updater manages. Decides where an update archive
/// is extracted below the content root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Plugin,
    Theme,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown product kind '{0}', expected 'plugin' or 'theme'")]
pub struct ProductKindParseError(pub String);

impl ProductKind {
    #[must_use]
    pub fn content_subdir(self) -> &'static str {
        match self {
            Self::Plugin => "plugins",
            Self::Theme => "themes",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Theme => "theme",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = ProductKindParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plugin" => Ok(Self::Plugin),
            "theme" => Ok(Self::Theme),
            _ => Err(ProductKindParseError(value.to_string())),
        }
    }
}
