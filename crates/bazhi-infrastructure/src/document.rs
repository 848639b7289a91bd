//! The per-user document.
//!
//! One document holds everything the store keeps about a user: account
//! metadata, the birth profile, every chat session and the elemental
//! profile. Field names mirror the deployed document schema. The merge
//! semantics live here as plain methods so the file-backed and in-memory
//! stores behave identically.

use bazhi_core::elements::{ElementalProfile, ElementalUpdate};
use bazhi_core::error::Result;
use bazhi_core::profile::BirthProfile;
use bazhi_core::session::{MessageExchange, SessionSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored chat session: creation time plus exchanges in append order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub created_at: String,
    #[serde(default)]
    pub messages: Vec<MessageExchange>,
}

/// The whole per-user document.
///
/// Every field is optional or defaulted so documents written by earlier
/// clients (or partially initialized ones) still load; absence reads back
/// as `None`/empty rather than failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub has_birth_info: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_info: Option<BirthProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_info_updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub chat_sessions: BTreeMap<String, StoredSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elemental_profile: Option<ElementalProfile>,
}

impl UserDocument {
    /// First-registration merge: records the email and stamps creation
    /// once. Re-running for an existing document only refreshes the email.
    pub fn ensure_registered(&mut self, email: &str) {
        self.email = Some(email.to_string());
        if self.created_at.is_none() {
            self.created_at = Some(chrono::Utc::now().to_rfc3339());
        }
    }

    /// Merge-writes the birth profile and its completion flag, leaving
    /// sessions and the elemental profile untouched.
    pub fn apply_birth_profile(&mut self, profile: &BirthProfile) {
        self.birth_info = Some(profile.clone());
        self.has_birth_info = true;
        self.birth_info_updated_at = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Materializes a session if absent. Returns whether it was created.
    pub fn ensure_session(&mut self, chat_id: &str) -> bool {
        if self.chat_sessions.contains_key(chat_id) {
            return false;
        }
        self.chat_sessions.insert(
            chat_id.to_string(),
            StoredSession {
                created_at: chrono::Utc::now().to_rfc3339(),
                messages: Vec::new(),
            },
        );
        true
    }

    /// Appends one exchange, creating the session on first append.
    pub fn append_exchange(&mut self, chat_id: &str, exchange: &MessageExchange) {
        self.ensure_session(chat_id);
        if let Some(session) = self.chat_sessions.get_mut(chat_id) {
            session.messages.push(exchange.clone());
        }
    }

    /// The persisted history of one session; empty when absent.
    pub fn history(&self, chat_id: &str) -> Vec<MessageExchange> {
        self.chat_sessions
            .get(chat_id)
            .map(|session| session.messages.clone())
            .unwrap_or_default()
    }

    /// Session summaries in storage order (callers sort).
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.chat_sessions
            .iter()
            .map(|(chat_id, session)| SessionSummary {
                chat_id: chat_id.clone(),
                has_messages: !session.messages.is_empty(),
                created_at: session.created_at.clone(),
            })
            .collect()
    }

    /// Applies an elemental merge update; partial updates require an
    /// existing profile. A failed merge leaves the document untouched.
    pub fn apply_elemental(&mut self, update: ElementalUpdate) -> Result<()> {
        let merged = update.apply_to(self.elemental_profile.clone())?;
        self.elemental_profile = Some(merged);
        Ok(())
    }
}
