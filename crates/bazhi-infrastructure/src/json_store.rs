//! File-backed user store.
//!
//! One JSON document per user under the data directory. All writes go
//! through [`AtomicJsonFile`], so a crashed or racing process can never
//! leave a torn document behind. Blocking file work runs on the blocking
//! pool to keep the controller's runtime responsive.

use crate::document::UserDocument;
use crate::paths::GuruPaths;
use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use bazhi_core::elements::{ElementalProfile, ElementalUpdate};
use bazhi_core::error::{GuruError, Result};
use bazhi_core::profile::BirthProfile;
use bazhi_core::session::{MessageExchange, SessionSummary};
use bazhi_core::store::UserStore;
use std::path::PathBuf;

/// Runs one blocking store task to completion.
async fn run_blocking<T>(task: impl FnOnce() -> Result<T> + Send + 'static) -> Result<T>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| GuruError::internal(format!("blocking store task failed: {e}")))?
}

/// Wraps infrastructure failures into the store taxonomy, letting
/// deliberate NotFound results through untouched.
fn store_err(operation: &'static str) -> impl FnOnce(GuruError) -> GuruError {
    move |err| match err {
        GuruError::NotFound { .. } => err,
        other => GuruError::store(operation, other.to_string()),
    }
}

/// Per-user JSON document store.
pub struct JsonFileUserStore {
    users_dir: PathBuf,
}

impl JsonFileUserStore {
    /// Creates a store rooted at the given directory.
    pub fn new(users_dir: impl Into<PathBuf>) -> Self {
        Self {
            users_dir: users_dir.into(),
        }
    }

    /// Creates a store at the default location (`~/.local/share/bazhi-guru/users`).
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(GuruPaths::users_dir()?))
    }

    /// Resolves the document file for one user.
    ///
    /// User ids come from the auth provider; anything that could escape
    /// the users directory is rejected outright.
    fn doc_file(&self, user_id: &str) -> Result<AtomicJsonFile<UserDocument>> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(GuruError::store(
                "resolve_document",
                format!("invalid user id '{user_id}'"),
            ));
        }
        Ok(AtomicJsonFile::new(
            self.users_dir.join(format!("{user_id}.json")),
        ))
    }

    async fn load_document(
        &self,
        user_id: &str,
        operation: &'static str,
    ) -> Result<Option<UserDocument>> {
        let file = self.doc_file(user_id)?;
        run_blocking(move || file.load())
            .await
            .map_err(store_err(operation))
    }

    async fn update_document(
        &self,
        user_id: &str,
        operation: &'static str,
        mutate: impl FnOnce(&mut UserDocument) -> Result<()> + Send + 'static,
    ) -> Result<()> {
        let file = self.doc_file(user_id)?;
        run_blocking(move || file.update(UserDocument::default(), mutate))
            .await
            .map_err(store_err(operation))
    }
}

#[async_trait]
impl UserStore for JsonFileUserStore {
    async fn ensure_user(&self, user_id: &str, email: &str) -> Result<()> {
        let email = email.to_string();
        self.update_document(user_id, "ensure_user", move |doc| {
            doc.ensure_registered(&email);
            Ok(())
        })
        .await
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<BirthProfile>> {
        let doc = self.load_document(user_id, "get_profile").await?;
        Ok(doc.and_then(|d| d.birth_info))
    }

    async fn save_profile(&self, user_id: &str, profile: &BirthProfile) -> Result<()> {
        let profile = profile.clone();
        self.update_document(user_id, "save_profile", move |doc| {
            doc.apply_birth_profile(&profile);
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
        let chat_id = chat_id.to_string();
        let exchange = exchange.clone();
        self.update_document(user_id, "append_chat_message", move |doc| {
            doc.append_exchange(&chat_id, &exchange);
            Ok(())
        })
        .await
    }

    async fn load_chat_history(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Vec<MessageExchange>> {
        let doc = self.load_document(user_id, "load_chat_history").await?;
        Ok(doc.map(|d| d.history(chat_id)).unwrap_or_default())
    }

    async fn create_chat_session(&self, user_id: &str, chat_id: &str) -> Result<()> {
        let chat_id = chat_id.to_string();
        self.update_document(user_id, "create_chat_session", move |doc| {
            doc.ensure_session(&chat_id);
            Ok(())
        })
        .await
    }

    async fn list_chat_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let doc = self.load_document(user_id, "list_chat_sessions").await?;
        Ok(doc.map(|d| d.summaries()).unwrap_or_default())
    }

    async fn save_elemental_profile(
        &self,
        user_id: &str,
        update: ElementalUpdate,
    ) -> Result<()> {
        self.update_document(user_id, "save_elemental_profile", move |doc| {
            doc.apply_elemental(update)
        })
        .await
    }

    async fn load_elemental_profile(&self, user_id: &str) -> Result<Option<ElementalProfile>> {
        let doc = self.load_document(user_id, "load_elemental_profile").await?;
        Ok(doc.and_then(|d| d.elemental_profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazhi_core::elements::ElementCounts;
    use bazhi_core::profile::Gender;
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonFileUserStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonFileUserStore::new(dir.path().join("users"));
        (dir, store)
    }

    fn profile() -> BirthProfile {
        BirthProfile {
            year: 1975,
            month: 11,
            day: 2,
            hour: 23,
            gender: Gender::Female,
            birthplace: "Chengdu".to_string(),
        }
    }

    fn elemental() -> ElementalProfile {
        ElementalProfile {
            elements: ElementCounts {
                wood: 1,
                fire: 2,
                earth: 2,
                metal: 2,
                water: 1,
            },
            description_zh: "火土偏旺".into(),
            description_en: "Fire and Earth lean strong".into(),
            summary_zh: "稳中有进".into(),
            summary_en: "Steady progress".into(),
            full_analysis_zh: "完整命盘分析。".into(),
            full_analysis_en: None,
            generated_at: "2024-06-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn profile_round_trip() {
        let (_dir, store) = store();
        assert!(store.get_profile("u1").await.unwrap().is_none());

        store.save_profile("u1", &profile()).await.unwrap();
        let loaded = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded, profile());
    }

    #[tokio::test]
    async fn missing_history_is_empty_not_error() {
        let (_dir, store) = store();
        let history = store.load_chat_history("u1", "chat1").await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn append_creates_session_and_keeps_order() {
        let (_dir, store) = store();
        let first = MessageExchange::new("q1", "问1", "答1", "a1");
        let second = MessageExchange::new("q2", "问2", "答2", "a2");

        store.append_chat_message("u1", "chat1", &first).await.unwrap();
        store
            .append_chat_message("u1", "chat1", &second)
            .await
            .unwrap();

        let history = store.load_chat_history("u1", "chat1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user_text_en, "q1");
        assert_eq!(history[1].user_text_en, "q2");
    }

    #[tokio::test]
    async fn empty_exchange_is_never_persisted() {
        let (_dir, store) = store();
        let bad = MessageExchange::new("q", "", "答", "a");
        assert!(
            store
                .append_chat_message("u1", "chat1", &bad)
                .await
                .is_err()
        );
        assert!(
            store
                .load_chat_history("u1", "chat1")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn save_profile_keeps_sessions_and_elemental() {
        let (_dir, store) = store();
        let exchange = MessageExchange::new("q", "问", "答", "a");
        store
            .append_chat_message("u1", "chat1", &exchange)
            .await
            .unwrap();
        store
            .save_elemental_profile("u1", elemental().into())
            .await
            .unwrap();

        store.save_profile("u1", &profile()).await.unwrap();

        assert_eq!(store.load_chat_history("u1", "chat1").await.unwrap().len(), 1);
        assert!(
            store
                .load_elemental_profile("u1")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn elemental_partial_merge_lands_late_translation() {
        let (_dir, store) = store();
        store
            .save_elemental_profile("u1", elemental().into())
            .await
            .unwrap();

        store
            .save_elemental_profile("u1", ElementalUpdate::analysis_en("Full analysis in English"))
            .await
            .unwrap();

        let stored = store.load_elemental_profile("u1").await.unwrap().unwrap();
        assert_eq!(
            stored.full_analysis_en.as_deref(),
            Some("Full analysis in English")
        );
        assert_eq!(stored.summary_en, "Steady progress");
    }

    #[tokio::test]
    async fn elemental_partial_without_base_is_not_found() {
        let (_dir, store) = store();
        let err = store
            .save_elemental_profile("u1", ElementalUpdate::analysis_en("late"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.load_elemental_profile("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_list_with_creation_flags() {
        let (_dir, store) = store();
        store.create_chat_session("u1", "chat1").await.unwrap();
        store
            .append_chat_message("u1", "chat2", &MessageExchange::new("q", "问", "答", "a"))
            .await
            .unwrap();

        let mut summaries = store.list_chat_sessions("u1").await.unwrap();
        summaries.sort_by(|a, b| a.chat_id.cmp(&b.chat_id));
        assert_eq!(summaries.len(), 2);
        assert!(!summaries[0].has_messages);
        assert!(summaries[1].has_messages);
    }

    #[tokio::test]
    async fn hostile_user_id_is_rejected() {
        let (_dir, store) = store();
        let err = store.get_profile("../etc/passwd").await.unwrap_err();
        assert!(err.is_store());
    }
}
