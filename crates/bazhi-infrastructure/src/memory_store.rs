//! In-memory user store.
//!
//! Backs tests and ephemeral runs with the exact merge semantics of the
//! file-backed store; both delegate to [`UserDocument`] so behavior can
//! not drift between them.

use crate::document::UserDocument;
use async_trait::async_trait;
use bazhi_core::elements::{ElementalProfile, ElementalUpdate};
use bazhi_core::error::Result;
use bazhi_core::profile::BirthProfile;
use bazhi_core::session::{MessageExchange, SessionSummary};
use bazhi_core::store::UserStore;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// HashMap-backed store, one document per user id.
#[derive(Default)]
pub struct MemoryUserStore {
    docs: RwLock<HashMap<String, UserDocument>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one document, for assertions.
    pub async fn document(&self, user_id: &str) -> Option<UserDocument> {
        self.docs.read().await.get(user_id).cloned()
    }

    async fn update<T>(
        &self,
        user_id: &str,
        mutate: impl FnOnce(&mut UserDocument) -> Result<T>,
    ) -> Result<T> {
        let mut docs = self.docs.write().await;
        let doc = docs.entry(user_id.to_string()).or_default();
        // Mutate a copy so a failed merge leaves the stored document intact.
        let mut staged = doc.clone();
        let out = mutate(&mut staged)?;
        *doc = staged;
        Ok(out)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ensure_user(&self, user_id: &str, email: &str) -> Result<()> {
        self.update(user_id, |doc| {
            doc.ensure_registered(email);
            Ok(())
        })
        .await
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<BirthProfile>> {
        Ok(self
            .docs
            .read()
            .await
            .get(user_id)
            .and_then(|doc| doc.birth_info.clone()))
    }

    async fn save_profile(&self, user_id: &str, profile: &BirthProfile) -> Result<()> {
        self.update(user_id, |doc| {
            doc.apply_birth_profile(profile);
            Ok(())
        })
        .await
    }

    async fn append_chat_message(
        &self,
        user_id: &str,
        chat_id: &str,
        exchange: &MessageExchange,
    ) -> Result<()> {
        exchange.validate()?;
        self.update(user_id, |doc| {
            doc.append_exchange(chat_id, exchange);
            Ok(())
        })
        .await
    }

    async fn load_chat_history(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Vec<MessageExchange>> {
        Ok(self
            .docs
            .read()
            .await
            .get(user_id)
            .map(|doc| doc.history(chat_id))
            .unwrap_or_default())
    }

    async fn create_chat_session(&self, user_id: &str, chat_id: &str) -> Result<()> {
        self.update(user_id, |doc| {
            doc.ensure_session(chat_id);
            Ok(())
        })
        .await
    }

    async fn list_chat_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        Ok(self
            .docs
            .read()
            .await
            .get(user_id)
            .map(|doc| doc.summaries())
            .unwrap_or_default())
    }

    async fn save_elemental_profile(
        &self,
        user_id: &str,
        update: ElementalUpdate,
    ) -> Result<()> {
        self.update(user_id, |doc| doc.apply_elemental(update)).await
    }

    async fn load_elemental_profile(&self, user_id: &str) -> Result<Option<ElementalProfile>> {
        Ok(self
            .docs
            .read()
            .await
            .get(user_id)
            .and_then(|doc| doc.elemental_profile.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn behaves_like_a_store() {
        let store = MemoryUserStore::new();
        store.ensure_user("u1", "a@example.com").await.unwrap();

        let exchange = MessageExchange::new("q", "问", "答", "a");
        store
            .append_chat_message("u1", "chat1", &exchange)
            .await
            .unwrap();

        let history = store.load_chat_history("u1", "chat1").await.unwrap();
        assert_eq!(history.len(), 1);

        let summaries = store.list_chat_sessions("u1").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].has_messages);
    }

    #[tokio::test]
    async fn failed_merge_keeps_document() {
        let store = MemoryUserStore::new();
        store.ensure_user("u1", "a@example.com").await.unwrap();

        let err = store
            .save_elemental_profile("u1", ElementalUpdate::analysis_en("late"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let doc = store.document("u1").await.unwrap();
        assert!(doc.elemental_profile.is_none());
        assert_eq!(doc.email.as_deref(), Some("a@example.com"));
    }
}
