//! View states and their hash tokens.
//!
//! The client shows exactly one of four views, each synchronized 1:1 with
//! a URL-hash style token so history navigation works. The state machine
//! in the application layer owns transitions; this module holds the pure
//! model: the states, the token mapping and the sign-in resolution rules.

use serde::{Deserialize, Serialize};

/// The four mutually exclusive views.
///
/// `Unauthenticated` is the initial state and stays reachable from every
/// other state (sign-out forces it unconditionally).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewState {
    /// Auth forms (sign-in / registration / reset).
    Unauthenticated,
    /// Birth data entry; forced whenever the stored profile is incomplete.
    ProfileSetup,
    /// Landing page: elemental profile and the session list.
    Home,
    /// An open consultation session.
    ActiveSession { chat_id: String },
}

impl ViewState {
    /// The hash token this state writes to the navigation surface.
    pub fn hash_token(&self) -> HashToken {
        match self {
            ViewState::Unauthenticated => HashToken::Login,
            ViewState::ProfileSetup => HashToken::Setup,
            ViewState::Home => HashToken::Home,
            ViewState::ActiveSession { .. } => HashToken::Chat,
        }
    }

    /// Whether entering this state tears down session-scoped memory
    /// (message cache, native history, current session id).
    pub fn tears_down_session(&self) -> bool {
        matches!(self, ViewState::Unauthenticated | ViewState::ProfileSetup)
    }

    /// The session id, when a session is open.
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            ViewState::ActiveSession { chat_id } => Some(chat_id),
            _ => None,
        }
    }
}

/// Hash tokens understood by the navigation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashToken {
    Login,
    Setup,
    Home,
    Chat,
}

impl HashToken {
    /// Parses a raw hash fragment, with or without the leading `#`.
    /// Unrecognized tokens yield `None`; callers fall back to `#login`.
    pub fn parse(raw: &str) -> Option<HashToken> {
        match raw.trim().trim_start_matches('#') {
            "login" => Some(HashToken::Login),
            "setup" => Some(HashToken::Setup),
            "home" => Some(HashToken::Home),
            "chat" => Some(HashToken::Chat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashToken::Login => "#login",
            HashToken::Setup => "#setup",
            HashToken::Home => "#home",
            HashToken::Chat => "#chat",
        }
    }
}

impl std::fmt::Display for HashToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves the view to enter after a signed-in auth event.
///
/// An incomplete profile always wins. Otherwise the current hash is
/// honored when it names `Home` or an open session; `#chat` can only be
/// honored when a session id is remembered from earlier in the page's
/// life. Everything else (auth tokens, unknown fragments, a bare hash)
/// lands on `Home`.
pub fn resolve_after_sign_in(
    profile_complete: bool,
    hash: Option<HashToken>,
    remembered_chat: Option<&str>,
) -> ViewState {
    if !profile_complete {
        return ViewState::ProfileSetup;
    }
    match hash {
        Some(HashToken::Home) => ViewState::Home,
        Some(HashToken::Chat) => match remembered_chat {
            Some(chat_id) => ViewState::ActiveSession {
                chat_id: chat_id.to_string(),
            },
            None => ViewState::Home,
        },
        _ => ViewState::Home,
    }
}
