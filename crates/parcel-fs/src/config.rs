//! Settings files in TOML or JSON, chosen by extension.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, NormalizedPath, Result, io};

/// Serialization format of a settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// Format for `path`'s extension, case-insensitively.
    pub fn from_path(path: &NormalizedPath) -> Result<Self> {
        let extension = path.extension().unwrap_or("");
        match extension.to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(Error::UnsupportedFormat {
                extension: extension.to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }

    fn parse<T: DeserializeOwned>(self, text: &str) -> std::result::Result<T, String> {
        match self {
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        }
    }

    fn render<T: Serialize>(self, value: &T) -> std::result::Result<String, String> {
        match self {
            Self::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        }
    }
}

/// Loads and saves serde types, writing atomically under a lock.
#[derive(Debug, Default)]
pub struct ConfigStore {
    robustness: io::RobustnessConfig,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_robustness(robustness: io::RobustnessConfig) -> Self {
        Self { robustness }
    }

    pub fn load<T: DeserializeOwned>(&self, path: &NormalizedPath) -> Result<T> {
        let format = Format::from_path(path)?;
        let text = io::read_text(path)?;
        format.parse(&text).map_err(|message| Error::ConfigParse {
            path: path.to_native(),
            format: format.name().into(),
            message,
        })
    }

    pub fn save<T: Serialize>(&self, path: &NormalizedPath, value: &T) -> Result<()> {
        let format = Format::from_path(path)?;
        let text = format.render(value).map_err(|message| Error::ConfigSerialize {
            path: path.to_native(),
            format: format.name().into(),
            message,
        })?;
        io::write_atomic(path, text.as_bytes(), self.robustness)?;
        tracing::debug!(path = %path, format = format.name(), "saved settings file");
        Ok(())
    }
}
