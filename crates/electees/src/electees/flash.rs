//! One-shot outcome messages carried from a handler to the next page render.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }
}

/// A single message slot per session. Setting replaces, taking clears.
/// Messages for an empty session key are dropped.
#[derive(Debug, Default)]
pub struct FlashChannel {
    slots: Mutex<HashMap<String, Flash>>,
}

impl FlashChannel {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Flash>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, session: &str, flash: Flash) {
        if session.is_empty() {
            return;
        }
        self.slots().insert(session.to_string(), flash);
    }

    pub fn success(&self, session: &str, message: impl Into<String>) {
        self.set(session, Flash::success(message));
    }

    pub fn error(&self, session: &str, message: impl Into<String>) {
        self.set(session, Flash::error(message));
    }

    pub fn take(&self, session: &str) -> Option<Flash> {
        self.slots().remove(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_read_once() {
        let channel = FlashChannel::default();
        channel.success("s1", "saved");

        assert_eq!(channel.take("s1"), Some(Flash::success("saved")));
        assert_eq!(channel.take("s1"), None);
    }

    #[test]
    fn later_message_replaces_earlier_and_sessions_are_isolated() {
        let channel = FlashChannel::default();
        channel.success("s1", "saved");
        channel.error("s1", "denied");
        channel.success("s2", "other");

        assert_eq!(channel.take("s1"), Some(Flash::error("denied")));
        assert_eq!(channel.take("s2"), Some(Flash::success("other")));
    }

    #[test]
    fn sessionless_callers_get_no_slot() {
        let channel = FlashChannel::default();
        channel.error("", "denied");

        assert_eq!(channel.take(""), None);
        assert!(channel.slots().is_empty());
    }
}
