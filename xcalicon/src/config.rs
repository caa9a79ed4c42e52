// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::time::Duration;

use cosmic_config::{self, CosmicConfigEntry, cosmic_config_derive::CosmicConfigEntry};
use serde::{Deserialize, Serialize};

use crate::clock::DEFAULT_TITLE_FORMAT;

pub const APP_ID: &str = "org.xcalicon.XCalicon";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, CosmicConfigEntry, PartialEq, Eq, Deserialize, Serialize)]
#[version = 1]
pub struct CalendarIconConfig {
    pub title_format: String,
    pub poll_interval_ms: u64,
    pub window_width: u16,
    pub window_height: u16,
    pub start_iconic: bool,
    pub calendar_png: Option<PathBuf>,
    pub digits_png: Option<PathBuf>,
}

impl Default for CalendarIconConfig {
    fn default() -> Self {
        Self {
            title_format: DEFAULT_TITLE_FORMAT.to_owned(),
            poll_interval_ms: 900,
            window_width: 200,
            window_height: 100,
            start_iconic: true,
            calendar_png: None,
            digits_png: None,
        }
    }
}

impl CalendarIconConfig {
    /// Reads the stored configuration, keeping defaults for anything missing or broken.
    pub fn load() -> Self {
        let config = match cosmic_config::Config::new(APP_ID, Self::VERSION) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(?err, "failed to open config, using defaults");
                return Self::default();
            }
        };

        match Self::get_entry(&config) {
            Ok(entry) => entry,
            Err((errors, entry)) => {
                for err in errors.iter().filter(|err| err.is_err()) {
                    tracing::warn!(?err, "failed to read config entry");
                }
                entry
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL)
    }
}
