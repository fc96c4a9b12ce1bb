use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::{Config, ConfigError};
use crate::store::models::Attachment;
use crate::store::{reduce, Action, ChatState};

/// Session state shared by the command handlers.
///
/// Every lock is released before a handler awaits.
pub struct AppState {
    chats: Mutex<ChatState>,
    staged: Mutex<Option<Attachment>>,
    config: Mutex<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            chats: Mutex::new(ChatState::default()),
            staged: Mutex::new(None),
            config: Mutex::new(config),
        }
    }

    /// Build from a config file (defaults if absent) plus environment overrides.
    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::load(path)?.apply_env();
        log::info!("Chart endpoint: {}", config.chart_endpoint);
        Ok(Self::new(config))
    }

    /// Snapshot of the conversation store.
    pub fn chats(&self) -> ChatState {
        lock(&self.chats).clone()
    }

    /// Run `action` through the reducer and swap in the result.
    pub fn dispatch(&self, action: Action) -> ChatState {
        let mut chats = lock(&self.chats);
        let next = reduce(&chats, action);
        *chats = next.clone();
        next
    }

    pub fn config(&self) -> Config {
        lock(&self.config).clone()
    }

    pub(crate) fn config_mut(&self) -> MutexGuard<'_, Config> {
        lock(&self.config)
    }

    pub(crate) fn staged(&self) -> MutexGuard<'_, Option<Attachment>> {
        lock(&self.staged)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

// A poisoned lock still holds a consistent value: state is only ever swapped whole.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
