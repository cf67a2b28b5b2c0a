pub mod config_store;
pub mod error;
pub mod logbus;
pub mod paths;
pub mod secrets;

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_ms() -> u128 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis()
}
