//! Per-package hold and disable policy.
//!
//! Configured in the `[holds]` table of the settings file:
//!
//! ```toml
//! [holds]
//! bar = "1.5"        # only bar-1.5 may be chosen
//! legacy = "disabled" # never chosen
//! dash = "any"        # explicitly unrestricted
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::PackageDescriptor;
use crate::error::BlockReason;
use crate::version::{Version, VersionParseError};

/// Policy for one package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Hold {
    /// No candidate of this package may be chosen.
    Disabled,
    /// Only this exact version may be chosen.
    Held(Version),
    #[default]
    Unrestricted,
}

impl TryFrom<String> for Hold {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim() {
            "disabled" => Ok(Self::Disabled),
            "any" | "" => Ok(Self::Unrestricted),
            version => Ok(Self::Held(version.parse()?)),
        }
    }
}

impl From<Hold> for String {
    fn from(hold: Hold) -> Self {
        hold.to_string()
    }
}

impl fmt::Display for Hold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Held(version) => write!(f, "{version}"),
            Self::Unrestricted => f.write_str("any"),
        }
    }
}

/// Holds for every configured package; unlisted packages are unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldPolicy {
    holds: BTreeMap<String, Hold>,
}

impl HoldPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, hold: Hold) {
        self.holds.insert(name.into(), hold);
    }

    pub fn with(mut self, name: impl Into<String>, hold: Hold) -> Self {
        self.set(name, hold);
        self
    }

    pub fn get(&self, name: &str) -> &Hold {
        static UNRESTRICTED: Hold = Hold::Unrestricted;
        self.holds.get(name).unwrap_or(&UNRESTRICTED)
    }

    /// Why `desc` may not be chosen, or `None` if it may.
    pub fn blocks(&self, desc: &PackageDescriptor) -> Option<BlockReason> {
        match self.get(desc.name()) {
            Hold::Unrestricted => None,
            Hold::Disabled => Some(BlockReason::Disabled),
            Hold::Held(version) if version == desc.version() => None,
            Hold::Held(version) => Some(BlockReason::Held {
                held: version.clone(),
            }),
        }
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        matches!(self.get(name), Hold::Disabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Hold)> {
        self.holds.iter().map(|(name, hold)| (name.as_str(), hold))
    }
}
