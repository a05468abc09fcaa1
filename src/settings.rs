use crate::error::{DrawError, DrawResult};
use serde::Deserialize;
use std::{fs, path::Path};

pub const DEFAULT_BASE_URL: &str = "https://backend.wplace.live";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Account credentials and endpoint, read from `settings.json`.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// session cookie
    pub s: String,
    #[serde(default)]
    pub cf_clearance: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Settings {
    pub fn load(path: &Path) -> DrawResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> DrawResult<Self> {
        let settings: Self = serde_json::from_str(content)?;
        if settings.s.trim().is_empty() {
            return Err(DrawError::Settings("session cookie `s` is empty".into()));
        }

        Ok(settings)
    }

    pub fn cookie_header(&self) -> String {
        match self.cf_clearance.as_deref().filter(|value| !value.is_empty()) {
            Some(clearance) => format!("s={}; cf_clearance={clearance}", self.s),
            None => format!("s={}", self.s),
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
