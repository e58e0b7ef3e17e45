//! App-level notification events

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named application event, such as "transaction-completed" or "logout".
///
/// Stores can be configured to mark their cache stale when one of these is
/// posted. Names are compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationEvent(String);

impl NotificationEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationEvent {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for NotificationEvent {
    fn from(name: String) -> Self {
        Self(name)
    }
}
