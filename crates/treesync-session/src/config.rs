//! Session configuration.

use serde::{Deserialize, Serialize};

/// How a [`Publisher`](crate::Publisher) decides what each subscriber gets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Don't emit deltas that carry nothing but the tag.
    pub skip_empty_deltas: bool,
    /// Every N flushes, send every subscriber a complete state instead of
    /// a delta.
    pub resync_interval: Option<u64>,
    /// Label used in log output.
    pub name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            skip_empty_deltas: true,
            resync_interval: None,
            name: "treesync".to_string(),
        }
    }
}

/// Builder for session configuration.
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
        }
    }

    pub fn skip_empty_deltas(mut self, skip: bool) -> Self {
        self.config.skip_empty_deltas = skip;
        self
    }

    /// `0` disables periodic resyncs.
    pub fn resync_interval(mut self, flushes: u64) -> Self {
        self.config.resync_interval = (flushes > 0).then_some(flushes);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
