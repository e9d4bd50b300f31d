//! Remembers which conversation was active across restarts.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::core::config::data::path_display;

/// Key-value capability holding the last active conversation id.
pub trait ConversationStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, chat_uuid: &str) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: std::io::Error },
    Serialize(toml::ser::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => {
                write!(f, "Failed to write session state at {}: {}", path_display(path), source)
            }
            StoreError::Serialize(err) => write!(f, "Failed to encode session state: {err}"),
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Serialize(err) => Some(err),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionStateFile {
    active_chat: Option<String>,
}

/// Stores the active id in a small TOML file, written atomically.
pub struct FileConversationStore {
    path: PathBuf,
}

impl FileConversationStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> SessionStateFile {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return SessionStateFile::default();
        };
        toml::from_str(&contents).unwrap_or_else(|err| {
            warn!(path = %path_display(&self.path), error = %err, "ignoring unreadable session state");
            SessionStateFile::default()
        })
    }

    fn write(&self, state: &SessionStateFile) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let contents = toml::to_string_pretty(state).map_err(StoreError::Serialize)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(io_err)?;
        temp_file.write_all(contents.as_bytes()).map_err(io_err)?;
        temp_file.as_file_mut().sync_all().map_err(io_err)?;
        temp_file
            .persist(&self.path)
            .map_err(|err| io_err(err.error))?;
        Ok(())
    }
}

impl ConversationStore for FileConversationStore {
    fn get(&self) -> Option<String> {
        self.read()
            .active_chat
            .filter(|uuid| !uuid.trim().is_empty())
    }

    fn set(&self, chat_uuid: &str) -> Result<(), StoreError> {
        self.write(&SessionStateFile {
            active_chat: Some(chat_uuid.to_string()),
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.write(&SessionStateFile::default())
    }
}

/// Process-local store, for one-off runs and tests.
#[derive(Default)]
pub struct MemoryConversationStore {
    active: Mutex<Option<String>>,
}

impl MemoryConversationStore {
    pub fn new(active: Option<String>) -> Self {
        Self {
            active: Mutex::new(active),
        }
    }
}

impl ConversationStore for MemoryConversationStore {
    fn get(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, chat_uuid: &str) -> Result<(), StoreError> {
        *self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(chat_uuid.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}
