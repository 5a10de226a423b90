use std::collections::HashMap;
use std::fs;

use serde::Deserialize;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const SETTINGS_FILE: &str = "quizforge.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub backend_url: String,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            // Generation can take minutes on cold topic sets.
            request_timeout_secs: 300,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("backend_url") {
                settings.backend_url = v.clone();
            }
            if let Some(v) = file_cfg.get("request_timeout_secs") {
                if let Ok(parsed) = v.parse::<u64>() {
                    settings.request_timeout_secs = parsed;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("QUIZFORGE_BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Ok(v) = std::env::var("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Ok(v) = std::env::var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_local_backend() {
        let settings = Settings::default();
        assert_eq!(settings.backend_url, "http://localhost:8000");
        assert!(settings.request_timeout_secs > 0);
    }
}
