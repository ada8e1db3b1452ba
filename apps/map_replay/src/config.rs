use std::{collections::HashMap, fs, path::Path, time::Duration};

use map_sync::{RetryPolicy, SupersedePolicy};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub render_target: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub supersede: SupersedePolicy,
    pub target_appears_after: u32,
    pub pace_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            render_target: "map".into(),
            retry_attempts: 20,
            retry_delay_ms: 50,
            supersede: SupersedePolicy::Cancel,
            target_appears_after: 0,
            pace_ms: 0,
        }
    }
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

pub fn load_settings(config_path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!("config: ignoring unreadable config file: {err}");
            return;
        }
    };

    for (key, value) in &file_cfg {
        apply_value(settings, key, value);
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("MAP_SYNC_TARGET") {
        settings.render_target = v;
    }

    for (var, key) in [
        ("APP__TARGET", "target"),
        ("APP__RETRY_ATTEMPTS", "retry_attempts"),
        ("APP__RETRY_DELAY_MS", "retry_delay_ms"),
        ("APP__SUPERSEDE", "supersede"),
        ("APP__TARGET_APPEARS_AFTER", "target_appears_after"),
        ("APP__PACE_MS", "pace_ms"),
    ] {
        if let Some(v) = lookup(var) {
            apply_value(settings, key, &v);
        }
    }
}

fn apply_value(settings: &mut Settings, key: &str, value: &str) {
    match key {
        "target" => settings.render_target = value.to_string(),
        "retry_attempts" => parse_into(key, value, &mut settings.retry_attempts),
        "retry_delay_ms" => parse_into(key, value, &mut settings.retry_delay_ms),
        "target_appears_after" => parse_into(key, value, &mut settings.target_appears_after),
        "pace_ms" => parse_into(key, value, &mut settings.pace_ms),
        "supersede" => parse_into(key, value, &mut settings.supersede),
        other => warn!("config: unknown key '{other}'"),
    }
}

fn parse_into<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!("config: invalid value '{value}' for '{key}'; keeping previous"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
