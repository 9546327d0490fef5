//! Signalling connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Signalling connection settings.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Rpc {
    /// Signalling server endpoint used unless another one is selected at
    /// runtime. Defaults to `wss://127.0.0.1:4443`.
    #[default("wss://127.0.0.1:4443".to_owned())]
    pub endpoint: String,

    /// Duration to wait for a signalling channel to be opened before giving
    /// up. Defaults to `10s`.
    #[default(Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}
