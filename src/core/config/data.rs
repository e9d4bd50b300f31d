use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_LIST_PAGE_SIZE: u32 = 50;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How assistant replies are requested.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Chunked body, shown as it arrives.
    #[default]
    Stream,
    /// One JSON reply with the answer and its cited context.
    Complete,
}

impl ReplyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplyMode::Stream => "stream",
            ReplyMode::Complete => "complete",
        }
    }
}

impl fmt::Display for ReplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stream" => Ok(ReplyMode::Stream),
            "complete" => Ok(ReplyMode::Complete),
            other => Err(format!(
                "Unknown reply mode '{other}'. Expected 'stream' or 'complete'."
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend root, without the `/api/v1` prefix
    pub base_url: Option<String>,
    /// Knowledge base bound to newly created conversations
    pub default_kb: Option<String>,
    pub list_page_size: Option<u32>,
    /// Bounds connection setup and plain requests, never a reply stream
    pub request_timeout_secs: Option<u64>,
    pub reply_mode: Option<ReplyMode>,
}

/// Keys accepted by `kbchat set` and `kbchat unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    BaseUrl,
    DefaultKb,
    ListPageSize,
    RequestTimeout,
    ReplyMode,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::BaseUrl,
        ConfigKey::DefaultKb,
        ConfigKey::ListPageSize,
        ConfigKey::RequestTimeout,
        ConfigKey::ReplyMode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::BaseUrl => "base-url",
            ConfigKey::DefaultKb => "default-kb",
            ConfigKey::ListPageSize => "list-page-size",
            ConfigKey::RequestTimeout => "request-timeout",
            ConfigKey::ReplyMode => "reply-mode",
        }
    }

    pub fn parse(name: &str) -> Result<Self, String> {
        let normalized = name.trim().replace('_', "-").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.name() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|key| key.name()).collect();
                format!("Unknown config key '{name}'. Available keys: {}", known.join(", "))
            })
    }
}

fn parse_positive<T>(key: ConfigKey, value: &str) -> Result<T, String>
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(format!("{} must be a positive number", key.name())),
    }
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn list_page_size(&self) -> u32 {
        self.list_page_size.unwrap_or(DEFAULT_LIST_PAGE_SIZE)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    pub fn reply_mode(&self) -> ReplyMode {
        self.reply_mode.unwrap_or_default()
    }

    pub fn set_value(&mut self, key: ConfigKey, value: &str) -> Result<(), String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(format!("{} cannot be empty", key.name()));
        }
        match key {
            ConfigKey::BaseUrl => {
                if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                    return Err("base-url must start with http:// or https://".to_string());
                }
                self.base_url = Some(trimmed.to_string());
            }
            ConfigKey::DefaultKb => self.default_kb = Some(trimmed.to_string()),
            ConfigKey::ListPageSize => self.list_page_size = Some(parse_positive(key, trimmed)?),
            ConfigKey::RequestTimeout => {
                self.request_timeout_secs = Some(parse_positive(key, trimmed)?)
            }
            ConfigKey::ReplyMode => self.reply_mode = Some(trimmed.parse()?),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::BaseUrl => self.base_url = None,
            ConfigKey::DefaultKb => self.default_kb = None,
            ConfigKey::ListPageSize => self.list_page_size = None,
            ConfigKey::RequestTimeout => self.request_timeout_secs = None,
            ConfigKey::ReplyMode => self.reply_mode = None,
        }
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/kbchat/config.toml` → `~/.config/kbchat/config.toml`
/// - macOS: `/Users/user/Library/Application Support/...` → `~/Library/Application Support/...`
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
