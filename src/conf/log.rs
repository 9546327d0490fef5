//! Logging settings.

use std::{borrow::Cow, str::FromStr as _};

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Logging settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Log {
    /// Maximum allowed level of log entries.
    /// Defaults to `INFO`.
    #[default("INFO")]
    pub level: Cow<'static, str>,
}

impl Log {
    /// Returns configured logging level. `None` if it cannot be recognized.
    #[must_use]
    pub fn level(&self) -> Option<log::LevelFilter> {
        log::LevelFilter::from_str(&self.level).ok()
    }

    /// Applies configured logging level to the [`log`] facade.
    ///
    /// Doesn't install any logger, this is up to the application.
    pub fn apply(&self) {
        match self.level() {
            Some(level) => log::set_max_level(level),
            None => log::warn!("Unknown log level: {}", self.level),
        }
    }
}
