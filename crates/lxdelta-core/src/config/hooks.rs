use serde::{Deserialize, Serialize};

use super::deserialize::deserialize_string_or_vec;

/// Shell commands run around each entity's backup.
///
/// `before` runs first and aborts the entity on failure; `after` runs on
/// success, `failed` on error, and `finally` always.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HooksConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub before: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub after: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub failed: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub finally: Vec<String>,
}

impl HooksConfig {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty()
            && self.after.is_empty()
            && self.failed.is_empty()
            && self.finally.is_empty()
    }
}
