//! UI preferences kept in key-value storage.

use std::sync::Arc;

use crate::db::KeyValueStorage;
use crate::errors::AppError;

pub const DARK_MODE_KEY: &str = "codvix_darkMode";

#[derive(Clone)]
pub struct Preferences {
    storage: Arc<dyn KeyValueStorage>,
}

impl Preferences {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Saved dark-mode flag. `None` means never set, so the client falls back to the system theme.
    pub fn dark_mode(&self) -> Result<Option<bool>, AppError> {
        Ok(self
            .storage
            .get(DARK_MODE_KEY)?
            .map(|value| value.trim() == "true"))
    }

    pub fn set_dark_mode(&self, enabled: bool) -> Result<(), AppError> {
        self.storage
            .set(DARK_MODE_KEY, if enabled { "true" } else { "false" })
    }
}
