use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{MediaFile, UploadError, UploadResult};

/// Configuration for the media upload feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Accepted file extensions, matched as `video/<type>` MIME types
    pub types: Vec<String>,

    /// Show the transient "complete" indicator after a successful upload.
    /// Disable on platforms that cannot animate it.
    pub complete_indicator: bool,

    /// How long the complete indicator stays visible
    pub complete_indicator_delay_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            types: vec!["mp4".to_string(), "m4v".to_string()],
            complete_indicator: true,
            complete_indicator_delay_ms: 3000,
        }
    }
}

impl UploadConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the accepted extensions
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Skip the complete indicator entirely
    pub fn without_complete_indicator(mut self) -> Self {
        self.complete_indicator = false;
        self
    }

    /// Set how long the complete indicator stays visible
    pub fn with_complete_indicator_delay(mut self, delay: Duration) -> Self {
        self.complete_indicator_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn complete_indicator_delay(&self) -> Duration {
        Duration::from_millis(self.complete_indicator_delay_ms)
    }

    /// Value for the file picker's `accept` attribute, e.g. `video/mp4,video/m4v`
    pub fn accepted_types(&self) -> String {
        self.types
            .iter()
            .map(|t| format!("video/{}", t))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether a file's MIME type is on the allow-list
    pub fn accepts(&self, file: &MediaFile) -> bool {
        file.mime_type
            .strip_prefix("video/")
            .map(|subtype| self.types.iter().any(|t| t == subtype))
            .unwrap_or(false)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> UploadResult<Self> {
        serde_json::from_str(json).map_err(|e| UploadError::invalid(format!("upload config: {}", e)))
    }

    /// Load overrides from the process environment.
    ///
    /// `MYAPP__UPLOAD__TYPES=mp4,webm` → `types = ["mp4", "webm"]` for prefix `MYAPP__`.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`UploadConfig::from_env`] over an explicit variable list
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(stripped) = key.as_ref().strip_prefix(prefix) else {
                continue;
            };
            let normalized = stripped.to_lowercase().replace("__", ".");
            let value = value.as_ref().trim();

            match normalized.as_str() {
                "upload.types" => {
                    config.types = value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "upload.complete_indicator" => {
                    if let Ok(enabled) = value.parse::<bool>() {
                        config.complete_indicator = enabled;
                    }
                }
                "upload.complete_indicator_delay_ms" => {
                    if let Ok(ms) = value.parse::<u64>() {
                        config.complete_indicator_delay_ms = ms;
                    }
                }
                _ => {}
            }
        }

        config
    }
}
