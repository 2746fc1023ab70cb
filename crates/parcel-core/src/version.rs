//! Package versions.
//!
//! A [`Version`] is a sequence of integers. Release-type tags parse to
//! negative components so that they sort below the release they precede:
//!
//! | tag                                   | value |
//! |---------------------------------------|-------|
//! | `snapshot` (`git`, `cvs`, `svn`, ...)  | -4    |
//! | `alpha`                               | -3    |
//! | `beta`                                | -2    |
//! | `pre`, `rc`                           | -1    |
//!
//! Comparison pads the shorter vector with zeros, so `1.0 == 1.0.0` and
//! `1.0pre < 1.0 < 1.0.1`.
//!
//! # Examples
//!
//! ```
//! use parcel_core::version::Version;
//!
//! let v: Version = "22.8beta3".parse().unwrap();
//! assert_eq!(v.parts(), &[22, 8, -2, 3]);
//! assert!(v < "22.8".parse().unwrap());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const SNAPSHOT: i64 = -4;
pub const ALPHA: i64 = -3;
pub const BETA: i64 = -2;
pub const PRE: i64 = -1;

/// Error returned when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

impl VersionParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A totally ordered package version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    parts: Vec<i64>,
}

impl Version {
    /// Build a version from its components.
    pub fn new(parts: impl Into<Vec<i64>>) -> Self {
        Self {
            parts: parts.into(),
        }
    }

    /// The raw components, tags included as negative numbers.
    pub fn parts(&self) -> &[i64] {
        &self.parts
    }

    /// Whether this version carries no pre-release tag.
    pub fn is_release(&self) -> bool {
        self.parts.iter().all(|&p| p >= 0)
    }

    /// Components with trailing zeros removed; equal versions share this form.
    fn significant(&self) -> &[i64] {
        let end = self
            .parts
            .iter()
            .rposition(|&p| p != 0)
            .map_or(0, |idx| idx + 1);
        &self.parts[..end]
    }
}

fn tag_value(word: &str) -> Option<i64> {
    match word {
        "snapshot" | "git" | "cvs" | "svn" | "bzr" | "hg" | "darcs" | "unknown" => Some(SNAPSHOT),
        "alpha" => Some(ALPHA),
        "beta" => Some(BETA),
        "pre" | "rc" => Some(PRE),
        _ => None,
    }
}

fn tag_name(value: i64) -> &'static str {
    match value {
        PRE => "pre",
        BETA => "beta",
        ALPHA => "alpha",
        _ => "snapshot",
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(VersionParseError::new(s, "empty version"));
        }

        let chars: Vec<char> = input.chars().collect();
        let mut parts = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            if chars[i].is_ascii_digit() {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let number = digits
                    .parse::<i64>()
                    .map_err(|_| VersionParseError::new(s, format!("component '{digits}' is too large")))?;
                parts.push(number);
                continue;
            }

            if parts.is_empty() {
                return Err(VersionParseError::new(s, "must start with a number"));
            }

            let separator = matches!(chars[i], '.' | '-' | '_' | '+' | ' ').then_some(chars[i]);
            let mut j = i + usize::from(separator.is_some());

            let word_start = j;
            while j < chars.len() && chars[j].is_ascii_alphabetic() {
                j += 1;
            }

            if j > word_start {
                let word: String = chars[word_start..j].iter().collect::<String>().to_ascii_lowercase();
                let value = match tag_value(&word) {
                    Some(value) => value,
                    None if word.len() == 1 && separator != Some('.') => {
                        // Single letter suffix: its position in the alphabet
                        i64::from(word.as_bytes()[0] - b'a' + 1)
                    }
                    None => {
                        return Err(VersionParseError::new(s, format!("unknown tag '{word}'")));
                    }
                };
                parts.push(value);
                i = j;
                continue;
            }

            if separator == Some('.') && j < chars.len() && chars[j].is_ascii_digit() {
                i = j;
                continue;
            }

            return Err(VersionParseError::new(
                s,
                format!("unexpected '{}' at position {}", chars[i], i),
            ));
        }

        Ok(Self { parts })
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (idx, &part) in self.parts.iter().enumerate() {
            if part >= 0 {
                if idx > 0 {
                    out.push('.');
                }
                out.push_str(&part.to_string());
            } else {
                out.push_str(tag_name(part));
            }
        }
        f.write_str(&out)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for idx in 0..len {
            let a = self.parts.get(idx).copied().unwrap_or(0);
            let b = other.parts.get(idx).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}
