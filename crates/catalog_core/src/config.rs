use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "catalog.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub base_url: String,
    pub page_size: u32,
    /// Upper bound on the id universe; also the size of the name index request.
    pub catalog_limit: u32,
    pub debounce_ms: u64,
    pub max_visible_pages: u32,
    pub batch_concurrency: usize,
    pub request_timeout_secs: Option<u64>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: "https://pokeapi.co/api/v2".into(),
            page_size: 50,
            catalog_limit: 1025,
            debounce_ms: 300,
            max_visible_pages: 5,
            batch_concurrency: 64,
            request_timeout_secs: Some(15),
        }
    }
}

impl CatalogSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn validate(&self) -> anyhow::Result<Url> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid catalog base url '{}'", self.base_url))?;
        if url.cannot_be_a_base() {
            bail!("catalog base url '{}' cannot carry a path", self.base_url);
        }
        if self.page_size == 0 {
            bail!("page_size must be greater than zero");
        }
        if self.catalog_limit == 0 {
            bail!("catalog_limit must be greater than zero");
        }
        if self.batch_concurrency == 0 {
            bail!("batch_concurrency must be greater than zero");
        }
        Ok(url)
    }
}

/// Defaults, then `catalog.toml` in the working directory, then environment.
pub fn load_settings() -> CatalogSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> CatalogSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match toml::from_str::<CatalogSettings>(&raw) {
            Ok(file_cfg) => file_cfg,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring malformed settings file");
                CatalogSettings::default()
            }
        },
        Err(_) => CatalogSettings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn apply_env_overrides<F>(settings: &mut CatalogSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("CATALOG_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = lookup("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = parsed(&lookup, "APP__PAGE_SIZE") {
        settings.page_size = v;
    }
    if let Some(v) = parsed(&lookup, "APP__CATALOG_LIMIT") {
        settings.catalog_limit = v;
    }
    if let Some(v) = parsed(&lookup, "APP__DEBOUNCE_MS") {
        settings.debounce_ms = v;
    }
    if let Some(v) = parsed(&lookup, "APP__MAX_VISIBLE_PAGES") {
        settings.max_visible_pages = v;
    }
    if let Some(v) = parsed(&lookup, "APP__BATCH_CONCURRENCY") {
        settings.batch_concurrency = v;
    }
    if let Some(v) = parsed::<u64, _>(&lookup, "APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = Some(v);
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
