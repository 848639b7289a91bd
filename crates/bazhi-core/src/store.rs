//! Session store adapter trait.
//!
//! Defines the typed contract over the document-per-user store. One
//! document per user holds the birth profile, the chat sessions and the
//! elemental profile; every operation here maps provider failures into
//! `GuruError::Store` and none may leave a partially written document.

use crate::elements::{ElementalProfile, ElementalUpdate};
use crate::error::Result;
use crate::profile::BirthProfile;
use crate::session::{MessageExchange, SessionSummary};
use async_trait::async_trait;

/// An abstract store adapter for the per-user document.
///
/// Absence is data, not failure: a missing document, profile or session
/// reads back as `None` or an empty vector. Errors are reserved for the
/// store itself misbehaving.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Initializes the user document on first registration.
    ///
    /// Merge-writes `{email, createdAt, hasBirthInfo: false}`; calling it
    /// for an existing user changes nothing but the email field.
    async fn ensure_user(&self, user_id: &str, email: &str) -> Result<()>;

    /// Loads the stored birth profile.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(BirthProfile))`: Profile present and complete
    /// - `Ok(None)`: No document, or no birth info yet
    /// - `Err(_)`: Store failure
    async fn get_profile(&self, user_id: &str) -> Result<Option<BirthProfile>>;

    /// Merge-writes the birth profile plus its completion flag.
    ///
    /// Chat sessions and the elemental profile in the same document are
    /// left untouched.
    async fn save_profile(&self, user_id: &str, profile: &BirthProfile) -> Result<()>;

    /// Atomically appends one completed exchange to a session.
    ///
    /// Creates the session on first append. The append either lands in
    /// full or not at all.
    async fn append_chat_message(
        &self,
        user_id: &str,
        chat_id: &str,
        exchange: &MessageExchange,
    ) -> Result<()>;

    /// Loads the persisted history of one session.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<MessageExchange>)`: History in append order; empty when
    ///   the session or document does not exist
    /// - `Err(_)`: Store failure
    async fn load_chat_history(&self, user_id: &str, chat_id: &str)
    -> Result<Vec<MessageExchange>>;

    /// Materializes an empty session with a creation timestamp.
    /// Idempotent when the session already exists.
    async fn create_chat_session(&self, user_id: &str, chat_id: &str) -> Result<()>;

    /// Lists the user's sessions as summaries, unordered.
    async fn list_chat_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>>;

    /// Merge-writes the elemental profile.
    ///
    /// Absent fields in the update leave stored fields untouched. A
    /// partial update with no stored profile fails with `NotFound` so the
    /// late translation merge cannot create a half-empty record.
    async fn save_elemental_profile(&self, user_id: &str, update: ElementalUpdate)
    -> Result<()>;

    /// Loads the stored elemental profile, if generation has completed.
    async fn load_elemental_profile(&self, user_id: &str) -> Result<Option<ElementalProfile>>;
}
