//! View transitions and hash reconciliation.
//!
//! Two channels feed the machine: programmatic transitions (auth events,
//! command handlers) and hash-change notifications from the navigation
//! surface. Every programmatic transition writes its token back to the
//! surface, and the surface echoes that write as a change notification,
//! so the machine arms a pending-token guard before each write and
//! consumes the matching echo instead of treating it as user navigation.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bazhi_core::view::{HashToken, ViewState};

/// Where the current hash token lives, from the machine's point of view.
///
/// The surface must not call back into the machine from `replace`; the
/// machine invokes it while holding its state lock.
pub trait HashSurface: Send + Sync {
    /// The raw fragment currently displayed, if any.
    fn read(&self) -> Option<String>;
    /// Overwrites the displayed fragment with a recognized token.
    fn replace(&self, token: HashToken);
}

/// In-memory hash surface backing the terminal frontend and the tests.
pub struct MemoryHash {
    value: Mutex<Option<String>>,
}

impl MemoryHash {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(None),
        })
    }

    /// Simulates user navigation: stores a raw fragment without telling
    /// the machine. The caller forwards the same fragment to the
    /// hash-changed handler, the way a browser fires the event.
    pub fn navigate(&self, raw: &str) {
        *self.value.lock().unwrap() = Some(raw.to_string());
    }
}

impl HashSurface for MemoryHash {
    fn read(&self) -> Option<String> {
        self.value.lock().unwrap().clone()
    }

    fn replace(&self, token: HashToken) {
        *self.value.lock().unwrap() = Some(token.as_str().to_string());
    }
}

/// Callback invoked after every committed transition.
pub type TransitionHook = Arc<dyn Fn(&ViewState) + Send + Sync>;

/// A programmatic hash write whose echo has not come back yet.
struct PendingHash {
    token: HashToken,
    written_at: Instant,
}

struct MachineState {
    view: ViewState,
    pending_hash: Option<PendingHash>,
}

/// The view state machine.
///
/// Starts in [`ViewState::Unauthenticated`]. Transitions commit under a
/// single lock; hooks run after the lock is released, in registration
/// order, and may read `current()`.
pub struct ViewMachine {
    state: Mutex<MachineState>,
    hooks: Mutex<Vec<TransitionHook>>,
    hash: Arc<dyn HashSurface>,
    guard_ttl: Duration,
}

impl ViewMachine {
    /// `guard_ttl` bounds how long a pending hash write suppresses
    /// change notifications before the machine assumes the echo was lost.
    pub fn new(hash: Arc<dyn HashSurface>, guard_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MachineState {
                view: ViewState::Unauthenticated,
                pending_hash: None,
            }),
            hooks: Mutex::new(Vec::new()),
            hash,
            guard_ttl,
        })
    }

    pub fn current(&self) -> ViewState {
        self.state.lock().unwrap().view.clone()
    }

    /// The token currently on the surface, when it parses.
    pub fn hash_token(&self) -> Option<HashToken> {
        self.hash.read().and_then(|raw| HashToken::parse(&raw))
    }

    pub fn register_hook(&self, hook: TransitionHook) {
        self.hooks.lock().unwrap().push(hook);
    }

    /// Writes the current view's token to the surface, arming the echo
    /// guard. Used once at startup so the surface shows `#login`.
    pub fn sync_hash(&self) {
        let mut state = self.state.lock().unwrap();
        let token = state.view.hash_token();
        state.pending_hash = Some(PendingHash {
            token,
            written_at: Instant::now(),
        });
        self.hash.replace(token);
    }

    /// Commits a transition to `target` and returns whether anything
    /// changed. A same-state request is a no-op: no hash write, no hooks.
    pub fn apply(&self, target: ViewState) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.view == target {
                return false;
            }
            let token = target.hash_token();
            state.pending_hash = Some(PendingHash {
                token,
                written_at: Instant::now(),
            });
            self.hash.replace(token);
            state.view = target.clone();
        }

        let hooks: Vec<TransitionHook> = self.hooks.lock().unwrap().clone();
        for hook in hooks {
            hook(&target);
        }
        true
    }

    /// Handles a hash-change notification from the surface.
    ///
    /// Returns the token the caller should act on, or `None` when the
    /// notification is absorbed: it echoes a pending programmatic write,
    /// arrives while such a write is still in flight, or names the state
    /// the machine is already in. Unrecognized fragments resolve to
    /// [`HashToken::Login`].
    pub fn on_hash_change(&self, raw: &str) -> Option<HashToken> {
        let mut state = self.state.lock().unwrap();

        if let Some(pending) = &state.pending_hash {
            if pending.written_at.elapsed() <= self.guard_ttl {
                if HashToken::parse(raw) == Some(pending.token) {
                    state.pending_hash = None;
                }
                return None;
            }
            // Echo never arrived within the bound; stop suppressing.
            tracing::warn!(token = %pending.token, "[ViewMachine] hash write echo expired");
            state.pending_hash = None;
        }

        let token = HashToken::parse(raw).unwrap_or(HashToken::Login);
        if token == state.view.hash_token() {
            return None;
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> (Arc<ViewMachine>, Arc<MemoryHash>) {
        let hash = MemoryHash::new();
        let machine = ViewMachine::new(hash.clone(), Duration::from_millis(1500));
        (machine, hash)
    }

    #[test]
    fn starts_unauthenticated_and_syncs_login_token() {
        let (machine, hash) = machine();
        assert_eq!(machine.current(), ViewState::Unauthenticated);
        assert_eq!(hash.read(), None);

        machine.sync_hash();
        assert_eq!(hash.read().as_deref(), Some("#login"));
        // The surface echoes the write; the guard absorbs it.
        assert_eq!(machine.on_hash_change("#login"), None);
    }

    #[test]
    fn apply_commits_writes_hash_and_reports_change() {
        let (machine, hash) = machine();

        assert!(machine.apply(ViewState::Home));
        assert_eq!(machine.current(), ViewState::Home);
        assert_eq!(hash.read().as_deref(), Some("#home"));

        assert!(!machine.apply(ViewState::Home));
    }

    #[test]
    fn hooks_run_in_registration_order_with_the_new_view() {
        let (machine, _hash) = machine();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let first = log.clone();
        machine.register_hook(Arc::new(move |view| {
            first.lock().unwrap().push(format!("first:{view:?}"));
        }));
        let second = log.clone();
        machine.register_hook(Arc::new(move |view| {
            second.lock().unwrap().push(format!("second:{view:?}"));
        }));

        machine.apply(ViewState::Home);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:Home".to_string(), "second:Home".to_string()]
        );
    }

    #[test]
    fn programmatic_echo_is_swallowed_once() {
        let (machine, _hash) = machine();
        machine.apply(ViewState::Home);

        // The echo consumes the guard; a repeat names the current state.
        assert_eq!(machine.on_hash_change("#home"), None);
        assert_eq!(machine.on_hash_change("#home"), None);
        assert_eq!(machine.on_hash_change("#login"), Some(HashToken::Login));
    }

    #[test]
    fn foreign_change_during_pending_write_is_ignored() {
        let (machine, _hash) = machine();
        machine.apply(ViewState::Home);

        assert_eq!(machine.on_hash_change("#setup"), None);
        assert_eq!(machine.on_hash_change("#home"), None);
        // Guard consumed; the same navigation now goes through.
        assert_eq!(machine.on_hash_change("#setup"), Some(HashToken::Setup));
    }

    #[test]
    fn expired_guard_stops_suppressing() {
        let hash = MemoryHash::new();
        let machine = ViewMachine::new(hash, Duration::ZERO);
        machine.apply(ViewState::Home);

        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(machine.on_hash_change("#setup"), Some(HashToken::Setup));
    }

    #[test]
    fn unknown_fragment_falls_back_to_login() {
        let (machine, _hash) = machine();
        machine.apply(ViewState::Home);
        assert_eq!(machine.on_hash_change("#home"), None);

        assert_eq!(machine.on_hash_change("#bogus"), Some(HashToken::Login));
    }

    #[test]
    fn change_naming_current_state_is_dropped() {
        let (machine, _hash) = machine();
        machine.apply(ViewState::ActiveSession {
            chat_id: "chat1".into(),
        });
        assert_eq!(machine.on_hash_change("#chat"), None);

        // Token granularity: #chat still names the open-session state.
        assert_eq!(machine.on_hash_change("chat"), None);
    }
}
