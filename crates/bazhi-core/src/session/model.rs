//! Session listing metadata.

use serde::{Deserialize, Serialize};

/// What the session list needs to know about one stored chat session.
///
/// Derived from the per-user document; `has_messages` is computed from the
/// stored exchange count, so it flips to `true` exactly once (on the first
/// successful append) and never back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session identifier, `chat<N>`.
    pub chat_id: String,
    /// Whether at least one exchange has been persisted.
    pub has_messages: bool,
    /// Timestamp when the session was created (ISO 8601 format).
    pub created_at: String,
}
