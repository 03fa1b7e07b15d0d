//! Preference persistence abstraction.
//!
//! The playback core owns no persisted state. The host persists the user's
//! requested streaming quality (and any other preference) through this trait:
//! - Desktop: JSON/TOML file in the config directory
//! - Web: localStorage
//! - Mobile: UserDefaults / SharedPreferences

use crate::error::Result;
use crate::platform::PlatformSendSync;
use std::collections::HashMap;
use std::sync::RwLock;

/// Key-value settings storage.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_quality(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("playback.quality", "LOSSLESS").await
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait SettingsStore: PlatformSendSync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }
}

/// Process-local settings store.
///
/// Useful for hosts that persist preferences elsewhere and for tests.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with initial values.
    pub fn with_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
        self
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| crate::BridgeError::OperationFailed("settings lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| crate::BridgeError::OperationFailed("settings lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| crate::BridgeError::OperationFailed("settings lock poisoned".into()))?;
        values.remove(key);
        Ok(())
    }
}
