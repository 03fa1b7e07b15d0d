//! Requested-quality persistence through the host [`SettingsStore`].

use crate::error::Result;
use crate::model::Quality;
use bridge_traits::storage::SettingsStore;
use std::sync::Arc;
use tracing::warn;

/// Settings key holding the requested quality wire name.
pub const QUALITY_KEY: &str = "playback.quality";

#[derive(Clone)]
pub struct QualityPreferences {
    store: Arc<dyn SettingsStore>,
}

impl QualityPreferences {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Stored quality, or `None` if nothing (or garbage) is stored.
    ///
    /// # Errors
    ///
    /// Store failures are returned. An unparseable value is logged and
    /// treated as absent.
    pub async fn load(&self) -> Result<Option<Quality>> {
        let Some(raw) = self.store.get_string(QUALITY_KEY).await? else {
            return Ok(None);
        };
        match raw.parse::<Quality>() {
            Ok(quality) => Ok(Some(quality)),
            Err(_) => {
                warn!(value = %raw, "Ignoring unknown stored quality");
                Ok(None)
            }
        }
    }

    /// Stored quality, or `fallback` when absent or unreadable.
    pub async fn load_or(&self, fallback: Quality) -> Quality {
        match self.load().await {
            Ok(quality) => quality.unwrap_or(fallback),
            Err(error) => {
                warn!(error = %error, "Could not read quality preference");
                fallback
            }
        }
    }

    pub async fn save(&self, quality: Quality) -> Result<()> {
        self.store.set_string(QUALITY_KEY, quality.as_str()).await?;
        Ok(())
    }
}

impl std::fmt::Debug for QualityPreferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityPreferences")
            .field("key", &QUALITY_KEY)
            .finish()
    }
}
