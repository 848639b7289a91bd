//! Bilingual message cache.
//!
//! The cache is the in-memory conversation for the open session. Every
//! user/reply entry keeps both language renditions, so switching the
//! display language is a pure re-projection: no remote call, no store
//! read. The cache is rebuilt wholesale when a session is opened and
//! appended to only when a consultation completes in full.

use super::exchange::MessageExchange;
use serde::{Deserialize, Serialize};

/// Display language selected by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Chinese,
}

impl Language {
    /// The other language; the toggle flips between exactly two.
    pub fn toggled(&self) -> Language {
        match self {
            Language::English => Language::Chinese,
            Language::Chinese => Language::English,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::English => "EN",
            Language::Chinese => "中文",
        }
    }
}

/// Who a rendered bubble belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Reply,
    System,
}

/// One cached conversation entry.
///
/// User and reply entries retain both renditions; system entries are
/// single-language hints that belong to the transcript (for example the
/// empty-session greeting). Transient bubbles such as optimistic user
/// echoes and error notices are render events, not cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CachedMessage {
    User { text_zh: String, text_en: String },
    Reply { text_zh: String, text_en: String },
    System { text: String },
}

impl CachedMessage {
    /// Projects the entry into the selected language.
    pub fn render(&self, language: Language) -> RenderedMessage {
        match self {
            CachedMessage::User { text_zh, text_en } => RenderedMessage {
                kind: MessageKind::User,
                text: match language {
                    Language::English => text_en.clone(),
                    Language::Chinese => text_zh.clone(),
                },
            },
            CachedMessage::Reply { text_zh, text_en } => RenderedMessage {
                kind: MessageKind::Reply,
                text: match language {
                    Language::English => text_en.clone(),
                    Language::Chinese => text_zh.clone(),
                },
            },
            CachedMessage::System { text } => RenderedMessage {
                kind: MessageKind::System,
                text: text.clone(),
            },
        }
    }
}

/// A language-projected bubble ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub kind: MessageKind,
    pub text: String,
}

/// Ordered bilingual conversation for the currently open session.
#[derive(Debug, Clone, Default)]
pub struct MessageCache {
    session_id: Option<String>,
    entries: Vec<CachedMessage>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session the cache currently mirrors, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the whole cache with the persisted history of one session.
    ///
    /// Opening session B after session A must leave nothing of A behind,
    /// so this drops every prior entry before loading the new ones.
    pub fn rebuild(&mut self, session_id: impl Into<String>, history: &[MessageExchange]) {
        self.session_id = Some(session_id.into());
        self.entries.clear();
        for exchange in history {
            self.push_exchange(exchange);
        }
    }

    /// Appends one completed exchange (user entry then reply entry).
    pub fn push_exchange(&mut self, exchange: &MessageExchange) {
        self.entries.push(CachedMessage::User {
            text_zh: exchange.user_text_zh.clone(),
            text_en: exchange.user_text_en.clone(),
        });
        self.entries.push(CachedMessage::Reply {
            text_zh: exchange.reply_text_zh.clone(),
            text_en: exchange.reply_text_en.clone(),
        });
    }

    /// Appends a transcript-level system hint.
    pub fn push_system(&mut self, text: impl Into<String>) {
        self.entries.push(CachedMessage::System { text: text.into() });
    }

    /// Drops everything, including the session binding.
    pub fn clear(&mut self) {
        self.session_id = None;
        self.entries.clear();
    }

    /// Projects the full transcript into one language.
    pub fn project(&self, language: Language) -> Vec<RenderedMessage> {
        self.entries
            .iter()
            .map(|entry| entry.render(language))
            .collect()
    }
}
