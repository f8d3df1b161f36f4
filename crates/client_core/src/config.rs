use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "catalog.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub page_size: u32,
    pub bulk_size: u32,
    pub search_debounce_ms: u64,
    pub request_timeout_secs: u64,
    pub identity_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".into(),
            page_size: 12,
            bulk_size: 100,
            search_debounce_ms: 500,
            request_timeout_secs: 15,
            identity_path: "/auth/redis/me".into(),
        }
    }
}

impl Settings {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    page_size: Option<u32>,
    bulk_size: Option<u32>,
    search_debounce_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    identity_path: Option<String>,
}

/// Defaults, then the settings file, then the environment.
///
/// An explicitly requested file must exist; the default `catalog.toml` is
/// optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (file, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_SETTINGS_FILE), false),
    };
    match fs::read_to_string(&file) {
        Ok(raw) => apply_file_settings(&mut settings, &raw)
            .with_context(|| format!("failed to parse settings file '{}'", file.display()))?,
        Err(err) if required => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", file.display()))
        }
        Err(_) => {}
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn apply_file_settings(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.api_url {
        settings.api_url = v;
    }
    if let Some(v) = file_cfg.page_size.filter(|v| *v > 0) {
        settings.page_size = v;
    }
    if let Some(v) = file_cfg.bulk_size.filter(|v| *v > 0) {
        settings.bulk_size = v;
    }
    if let Some(v) = file_cfg.search_debounce_ms {
        settings.search_debounce_ms = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs.filter(|v| *v > 0) {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.identity_path {
        settings.identity_path = v;
    }
    Ok(())
}

pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CATALOG_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = lookup("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = parse_positive(lookup("APP__PAGE_SIZE")) {
        settings.page_size = v;
    }
    if let Some(v) = parse_positive(lookup("APP__BULK_SIZE")) {
        settings.bulk_size = v;
    }

    if let Some(v) = lookup("APP__SEARCH_DEBOUNCE_MS") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.search_debounce_ms = parsed;
        }
    }
    if let Some(v) = parse_positive(lookup("APP__REQUEST_TIMEOUT_SECS")) {
        settings.request_timeout_secs = u64::from(v);
    }

    if let Some(v) = lookup("APP__IDENTITY_PATH") {
        settings.identity_path = v;
    }
}

fn parse_positive(raw: Option<String>) -> Option<u32> {
    raw?.trim().parse::<u32>().ok().filter(|v| *v > 0)
}
