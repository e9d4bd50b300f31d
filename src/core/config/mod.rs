pub mod data;
pub mod io;
pub mod printing;


use std::time::Duration;

use data::{Config, ReplyMode};

use crate::utils::url::normalize_base_url;

pub const BASE_URL_ENV: &str = "KBCHAT_BASE_URL";
pub const KB_ENV: &str = "KBCHAT_KB";

/// Values given on the command line, which win over everything else.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub base_url: Option<String>,
    pub kb_uuid: Option<String>,
}

/// Effective settings for one run: command line, then environment, then the
/// config file, then built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub kb_uuid: Option<String>,
    pub list_page_size: u32,
    pub request_timeout: Duration,
    pub reply_mode: ReplyMode,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Settings {
    pub fn resolve(config: &Config, overrides: &SettingsOverrides) -> Self {
        Self::resolve_with(config, overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(config: &Config, overrides: &SettingsOverrides, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = non_blank(overrides.base_url.clone())
            .or_else(|| non_blank(env(BASE_URL_ENV)))
            .unwrap_or_else(|| config.base_url().to_string());
        let kb_uuid = non_blank(overrides.kb_uuid.clone())
            .or_else(|| non_blank(env(KB_ENV)))
            .or_else(|| non_blank(config.default_kb.clone()));

        Self {
            base_url: normalize_base_url(&base_url),
            kb_uuid,
            list_page_size: config.list_page_size(),
            request_timeout: Duration::from_secs(config.request_timeout_secs()),
            reply_mode: config.reply_mode(),
        }
    }
}
