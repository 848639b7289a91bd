//! Application controller.
//!
//! Owns the session-scoped state (message cache, native history, current
//! session id), the cached birth profile and the display language, and
//! coordinates the auth gateway, the store adapter, the consultation
//! pipeline and the view machine. Surfaces call the public methods and
//! render the [`UiEvent`] stream; they never touch the collaborators
//! directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bazhi_core::auth::{AuthEvent, AuthGateway, AuthUser};
use bazhi_core::completion::ChatCompletion;
use bazhi_core::elements::{ElementalProfile, ElementalUpdate};
use bazhi_core::error::PipelineStage;
use bazhi_core::profile::BirthProfile;
use bazhi_core::session::{
    CachedMessage, ChatTurn, Language, MessageCache, MessageExchange, MessageKind,
    RenderedMessage,
};
use bazhi_core::store::UserStore;
use bazhi_core::view::{HashToken, ViewState, resolve_after_sign_in};
use bazhi_core::{GuruError, Result};
use bazhi_infrastructure::AppConfig;
use bazhi_interaction::ConsultPipeline;
use tokio::sync::broadcast;

use crate::events::{EventSender, SessionCard, UiEvent, loading_text};
use crate::session_list::{derive_cards, next_chat_id};
use crate::view_machine::ViewMachine;

const NEW_SESSION_HINT: &str = "Starting a new consultation...";
const EMPTY_SESSION_HINT: &str = "Start a new conversation! Ask the BaZhi Guru anything.";
const PIPELINE_FAILURE_BUBBLE: &str = "Sorry, an error occurred. Please try again.";
const NO_SESSION_SELECTED: &str = "Please select a chat session from the home page first.";
const NO_PROFILE_YET: &str = "Please complete your birth information first.";
const BUSY_NOTICE: &str = "Please wait for the current consultation to finish.";
const SAVE_FAILED: &str = "Failed to save your data. Please try again.";
const LOAD_FAILED: &str = "Failed to load your data. Please try again.";
const PROFILE_GEN_FAILED: &str =
    "Sorry, your elemental profile could not be generated. Please try again later.";
const PENDING_TRANSLATION: &str =
    "Your full analysis is still being translated. Check back in a moment.";

/// Everything that belongs to the currently open session and nothing else.
#[derive(Default)]
struct SessionScope {
    current_chat_id: Option<String>,
    /// Native (Chinese) turns sent to the guru as conversation context.
    history: Vec<ChatTurn>,
    cache: MessageCache,
}

/// The single orchestrator behind every surface.
pub struct GuruController {
    auth: Arc<dyn AuthGateway>,
    store: Arc<dyn UserStore>,
    pipeline: ConsultPipeline,
    machine: Arc<ViewMachine>,
    events: EventSender,
    session: Arc<Mutex<SessionScope>>,
    profile: Arc<Mutex<Option<BirthProfile>>>,
    language: Mutex<Language>,
    /// At most one consultation pipeline runs at a time.
    in_flight: AtomicBool,
    profile_gen_running: Arc<AtomicBool>,
    listener_started: AtomicBool,
}

impl GuruController {
    /// Wires the collaborators together and registers the transition
    /// hooks: session teardown first, the view-changed emit second.
    pub fn new(
        auth: Arc<dyn AuthGateway>,
        store: Arc<dyn UserStore>,
        completion: Arc<dyn ChatCompletion>,
        config: AppConfig,
        machine: Arc<ViewMachine>,
        events: EventSender,
    ) -> Arc<Self> {
        let session: Arc<Mutex<SessionScope>> = Arc::new(Mutex::new(SessionScope::default()));
        let profile: Arc<Mutex<Option<BirthProfile>>> = Arc::new(Mutex::new(None));

        let teardown_session = session.clone();
        let teardown_profile = profile.clone();
        machine.register_hook(Arc::new(move |view| {
            if view.tears_down_session() {
                let mut scope = teardown_session.lock().unwrap();
                scope.current_chat_id = None;
                scope.history.clear();
                scope.cache.clear();
            }
            // Only sign-out drops the cached profile; profile setup keeps
            // it so the form can pre-fill.
            if matches!(view, ViewState::Unauthenticated) {
                *teardown_profile.lock().unwrap() = None;
            }
        }));
        let view_events = events.clone();
        machine.register_hook(Arc::new(move |view| {
            let _ = view_events.send(UiEvent::ViewChanged(view.clone()));
        }));

        Arc::new(Self {
            auth,
            store,
            pipeline: ConsultPipeline::new(completion, config),
            machine,
            events,
            session,
            profile,
            language: Mutex::new(Language::default()),
            in_flight: AtomicBool::new(false),
            profile_gen_running: Arc::new(AtomicBool::new(false)),
            listener_started: AtomicBool::new(false),
        })
    }

    /// Starts the auth event loop. Call once after construction.
    pub fn spawn_auth_listener(self: &Arc<Self>) {
        if self.listener_started.swap(true, Ordering::SeqCst) {
            tracing::warn!("[GuruController] auth listener already running");
            return;
        }

        let controller = Arc::clone(self);
        let mut events = self.auth.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedIn(user)) => controller.handle_signed_in(user).await,
                    Ok(AuthEvent::SignedOut) => controller.handle_signed_out(),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "[GuruController] auth events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ========================================================================
    // Auth surface
    // ========================================================================

    /// Registers an account. The gateway broadcasts the implicit sign-in;
    /// the event loop routes the view from there.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<()> {
        self.auth.sign_up(email, password).await?;
        Ok(())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        self.auth.sign_in(email, password).await?;
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        self.auth.send_password_reset(email).await
    }

    pub async fn current_user(&self) -> Option<AuthUser> {
        self.auth.current_user().await
    }

    async fn require_user(&self) -> Result<AuthUser> {
        self.auth
            .current_user()
            .await
            .ok_or_else(|| GuruError::auth("Please sign in first."))
    }

    /// Reacts to a signed-in broadcast.
    ///
    /// 1. Initialize the user document (merge, idempotent).
    /// 2. Load and cache the birth profile.
    /// 3. Resolve the landing view from profile completeness, the current
    ///    hash and any remembered session.
    /// 4. On home: refresh the session list and kick off profile
    ///    generation if the elemental profile is missing.
    async fn handle_signed_in(&self, user: AuthUser) {
        tracing::info!(email = %user.email, "[GuruController] signed in");

        if let Err(err) = self.store.ensure_user(&user.user_id, &user.email).await {
            tracing::error!(error = %err, "[GuruController] user document init failed");
            self.emit(UiEvent::Notice(SAVE_FAILED.to_string()));
        }

        let profile = match self.store.get_profile(&user.user_id).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::error!(error = %err, "[GuruController] birth profile load failed");
                self.emit(UiEvent::Notice(LOAD_FAILED.to_string()));
                None
            }
        };
        *self.profile.lock().unwrap() = profile.clone();

        let hash = self.machine.hash_token();
        let remembered = self.session.lock().unwrap().current_chat_id.clone();
        let target = resolve_after_sign_in(profile.is_some(), hash, remembered.as_deref());

        match target {
            ViewState::ActiveSession { chat_id } => {
                if let Err(err) = self.open_session(&chat_id).await {
                    tracing::error!(error = %err, chat_id, "[GuruController] session restore failed");
                    self.transition(ViewState::Home);
                }
            }
            other => self.transition(other),
        }

        if self.machine.current() == ViewState::Home {
            if let Err(err) = self.refresh_session_list(&user.user_id).await {
                tracing::warn!(error = %err, "[GuruController] session list refresh failed");
            }
            if let Some(profile) = profile {
                self.spawn_profile_generation(user.user_id, profile);
            }
        }
    }

    fn handle_signed_out(&self) {
        tracing::info!("[GuruController] signed out");
        // The teardown hook clears the session scope and the cached profile.
        self.transition(ViewState::Unauthenticated);
    }

    // ========================================================================
    // Birth profile
    // ========================================================================

    /// Persists the birth profile, lands on home and kicks off elemental
    /// profile generation. A store failure leaves the cached profile and
    /// the view untouched so the form can be resubmitted.
    pub async fn save_birth_profile(&self, profile: BirthProfile) -> Result<()> {
        profile.validate()?;
        let user = self.require_user().await?;
        self.store.save_profile(&user.user_id, &profile).await?;
        *self.profile.lock().unwrap() = Some(profile.clone());

        self.transition(ViewState::Home);
        if let Err(err) = self.refresh_session_list(&user.user_id).await {
            tracing::warn!(error = %err, "[GuruController] session list refresh failed");
        }
        self.spawn_profile_generation(user.user_id, profile);
        Ok(())
    }

    pub fn birth_profile(&self) -> Option<BirthProfile> {
        self.profile.lock().unwrap().clone()
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Opens a stored session: loads its history, rebuilds the cache and
    /// native history, and commits the view transition.
    ///
    /// A history-load failure aborts the open with no state change; the
    /// previous view and cache stay as they were.
    pub async fn open_session(&self, chat_id: &str) -> Result<()> {
        if self.in_flight.load(Ordering::SeqCst) {
            tracing::warn!(chat_id, "[GuruController] session open rejected while busy");
            return Ok(());
        }
        let user = self.require_user().await?;

        let history = match self.store.load_chat_history(&user.user_id, chat_id).await {
            Ok(history) => history,
            Err(err) => {
                tracing::error!(error = %err, chat_id, "[GuruController] history load failed");
                return Err(err);
            }
        };

        let rendered = {
            let mut scope = self.session.lock().unwrap();
            scope.current_chat_id = Some(chat_id.to_string());
            scope.cache.rebuild(chat_id, &history);
            scope.history.clear();
            for exchange in &history {
                scope.history.push(ChatTurn::user(exchange.user_text_zh.clone()));
                scope
                    .history
                    .push(ChatTurn::assistant(exchange.reply_text_zh.clone()));
            }
            if scope.cache.is_empty() {
                scope.cache.push_system(EMPTY_SESSION_HINT);
            }
            scope.cache.project(*self.language.lock().unwrap())
        };

        self.transition(ViewState::ActiveSession {
            chat_id: chat_id.to_string(),
        });
        self.emit(UiEvent::TranscriptReset(rendered));
        Ok(())
    }

    /// Creates the next `chat<N>` session and opens it immediately.
    pub async fn create_session(&self) -> Result<()> {
        if self.in_flight.load(Ordering::SeqCst) {
            tracing::warn!("[GuruController] session creation rejected while busy");
            return Ok(());
        }
        let user = self.require_user().await?;

        let summaries = self.store.list_chat_sessions(&user.user_id).await?;
        let chat_id = next_chat_id(&summaries);
        self.store.create_chat_session(&user.user_id, &chat_id).await?;
        tracing::info!(chat_id, "[GuruController] session created");

        let rendered = {
            let mut scope = self.session.lock().unwrap();
            scope.current_chat_id = Some(chat_id.clone());
            scope.cache.rebuild(chat_id.clone(), &[]);
            scope.cache.push_system(NEW_SESSION_HINT);
            scope.history.clear();
            scope.cache.project(*self.language.lock().unwrap())
        };

        self.transition(ViewState::ActiveSession {
            chat_id: chat_id.clone(),
        });
        self.emit(UiEvent::TranscriptReset(rendered));

        if let Err(err) = self.refresh_session_list(&user.user_id).await {
            tracing::warn!(error = %err, "[GuruController] session list refresh failed");
        }
        Ok(())
    }

    /// The current card list, sorted with the new-session card last.
    pub async fn session_cards(&self) -> Result<Vec<SessionCard>> {
        let user = self.require_user().await?;
        let summaries = self.store.list_chat_sessions(&user.user_id).await?;
        Ok(derive_cards(&summaries))
    }

    async fn refresh_session_list(&self, user_id: &str) -> Result<()> {
        let summaries = self.store.list_chat_sessions(user_id).await?;
        self.emit(UiEvent::SessionListChanged(derive_cards(&summaries)));
        Ok(())
    }

    // ========================================================================
    // Consultation
    // ========================================================================

    /// Runs one consultation exchange end to end.
    ///
    /// The three remote calls are all-or-nothing: on any failure the cache,
    /// the native history and the store are untouched, an error bubble is
    /// rendered and input is re-enabled. The optimistic user bubble stays
    /// visible either way. A persist failure after the calls keeps the
    /// rendered exchange and surfaces a store notice.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let question = text.trim();
        if question.is_empty() {
            return Ok(());
        }

        let user = self.require_user().await?;
        if self.profile.lock().unwrap().is_none() {
            self.emit(UiEvent::Notice(NO_PROFILE_YET.to_string()));
            return Ok(());
        }
        let Some(chat_id) = self.session.lock().unwrap().current_chat_id.clone() else {
            self.emit(UiEvent::Notice(NO_SESSION_SELECTED.to_string()));
            return Ok(());
        };

        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("[GuruController] send rejected while a consultation is in flight");
            self.emit(UiEvent::Notice(BUSY_NOTICE.to_string()));
            return Ok(());
        }

        self.emit(UiEvent::InputEnabled(false));
        // Optimistic echo of the question as typed; a render event, not a
        // cache entry, so a failed exchange leaves the cache untouched.
        self.emit(UiEvent::MessageRendered(RenderedMessage {
            kind: MessageKind::User,
            text: question.to_string(),
        }));

        let (profile, history) = {
            let profile = self.profile.lock().unwrap().clone();
            let history = self.session.lock().unwrap().history.clone();
            (profile, history)
        };
        // Checked non-empty above; the profile cannot go away mid-send
        // because teardown only runs on transitions we reject while busy.
        let outcome = match profile {
            Some(profile) => {
                self.pipeline
                    .run_exchange(question, &profile, &history, |stage| {
                        self.emit(UiEvent::LoadingChanged(Some(
                            loading_text(stage).to_string(),
                        )));
                    })
                    .await
            }
            None => Err(GuruError::internal("birth profile disappeared mid-send")),
        };

        match outcome {
            Ok(exchange) => self.commit_exchange(&user, &chat_id, exchange).await,
            Err(err) => {
                tracing::error!(error = %err, chat_id, "[GuruController] consultation failed");
                self.emit(UiEvent::LoadingChanged(None));
                self.emit(UiEvent::MessageRendered(RenderedMessage {
                    kind: MessageKind::System,
                    text: PIPELINE_FAILURE_BUBBLE.to_string(),
                }));
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
        self.emit(UiEvent::InputEnabled(true));
        Ok(())
    }

    /// Commits a completed exchange: cache, native history, render, persist.
    async fn commit_exchange(&self, user: &AuthUser, chat_id: &str, exchange: MessageExchange) {
        let rendered = {
            let mut scope = self.session.lock().unwrap();
            // Sign-out mid-flight tears the scope down; the late reply
            // must not leak into a dead or different session.
            if scope.current_chat_id.as_deref() != Some(chat_id) {
                tracing::warn!(chat_id, "[GuruController] session closed before the reply");
                return;
            }
            scope.cache.push_exchange(&exchange);
            scope.history.push(ChatTurn::user(exchange.user_text_zh.clone()));
            scope
                .history
                .push(ChatTurn::assistant(exchange.reply_text_zh.clone()));

            CachedMessage::Reply {
                text_zh: exchange.reply_text_zh.clone(),
                text_en: exchange.reply_text_en.clone(),
            }
            .render(*self.language.lock().unwrap())
        };

        self.emit(UiEvent::LoadingChanged(None));
        self.emit(UiEvent::MessageRendered(rendered));

        if let Err(err) = self
            .store
            .append_chat_message(&user.user_id, chat_id, &exchange)
            .await
        {
            // The exchange already rendered; losing it silently is worse
            // than a stale session list, so say so and keep it on screen.
            tracing::error!(error = %err, chat_id, "[GuruController] exchange persist failed");
            self.emit(UiEvent::Notice(SAVE_FAILED.to_string()));
        } else if let Err(err) = self.refresh_session_list(&user.user_id).await {
            tracing::warn!(error = %err, "[GuruController] session list refresh failed");
        }
    }

    // ========================================================================
    // Language
    // ========================================================================

    /// Flips the display language and re-projects the transcript from the
    /// cache. No remote call, no store read.
    pub fn toggle_language(&self) -> Language {
        let language = {
            let mut guard = self.language.lock().unwrap();
            *guard = guard.toggled();
            *guard
        };
        let rendered = self.session.lock().unwrap().cache.project(language);

        self.emit(UiEvent::LanguageChanged(language));
        self.emit(UiEvent::TranscriptReset(rendered));
        language
    }

    pub fn language(&self) -> Language {
        *self.language.lock().unwrap()
    }

    // ========================================================================
    // Elemental profile
    // ========================================================================

    pub async fn elemental_profile(&self) -> Result<Option<ElementalProfile>> {
        let user = self.require_user().await?;
        self.store.load_elemental_profile(&user.user_id).await
    }

    /// The full analysis in the display language. English shows a pending
    /// placeholder until the background translation has merged; never an
    /// error and never an empty string.
    pub async fn full_analysis(&self) -> Result<Option<String>> {
        let Some(profile) = self.elemental_profile().await? else {
            return Ok(None);
        };
        let text = match self.language() {
            Language::Chinese => profile.full_analysis_zh,
            Language::English => profile
                .full_analysis_en
                .unwrap_or_else(|| PENDING_TRANSLATION.to_string()),
        };
        Ok(Some(text))
    }

    /// Starts elemental profile generation unless one is already running.
    ///
    /// The flow: full native analysis, then structured extraction at low
    /// temperature, persisted together with the analysis; the English
    /// translation of the analysis runs concurrently and merge-writes
    /// whenever it resolves. Extraction never waits on the translation.
    fn spawn_profile_generation(&self, user_id: String, profile: BirthProfile) {
        if self.profile_gen_running.swap(true, Ordering::SeqCst) {
            tracing::debug!("[GuruController] profile generation already running");
            return;
        }

        let store = self.store.clone();
        let pipeline = self.pipeline.clone();
        let events = self.events.clone();
        let running = self.profile_gen_running.clone();
        tokio::spawn(async move {
            if let Err(err) =
                generate_elemental_profile(store, pipeline, events.clone(), &user_id, &profile)
                    .await
            {
                tracing::error!(error = %err, "[GuruController] profile generation failed");
                let _ = events.send(UiEvent::LoadingChanged(None));
                let _ = events.send(UiEvent::Notice(PROFILE_GEN_FAILED.to_string()));
            }
            running.store(false, Ordering::SeqCst);
        });
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Handles a hash-change notification from the navigation surface.
    ///
    /// Echoes of the machine's own writes are absorbed by the machine.
    /// Without a signed-in user every token resolves to the auth view; a
    /// signed-in user is gated by profile completeness, and `#chat` needs
    /// a remembered session id.
    pub async fn on_hash_changed(&self, raw: &str) -> Result<()> {
        let Some(token) = self.machine.on_hash_change(raw) else {
            return Ok(());
        };
        tracing::info!(token = %token, "[GuruController] hash navigation");

        let Some(user) = self.auth.current_user().await else {
            self.transition(ViewState::Unauthenticated);
            return Ok(());
        };

        let profile_complete = self.profile.lock().unwrap().is_some();
        let remembered = self.session.lock().unwrap().current_chat_id.clone();

        let target = match token {
            _ if !profile_complete => ViewState::ProfileSetup,
            // Signed-in users have no business at the auth forms; the
            // sign-in resolution sends auth tokens home too.
            HashToken::Login | HashToken::Home => ViewState::Home,
            HashToken::Setup => ViewState::ProfileSetup,
            HashToken::Chat => match remembered {
                Some(chat_id) => ViewState::ActiveSession { chat_id },
                None => ViewState::Home,
            },
        };

        match target {
            ViewState::ActiveSession { chat_id } => {
                if let Err(err) = self.open_session(&chat_id).await {
                    tracing::error!(error = %err, chat_id, "[GuruController] session restore failed");
                    self.emit(UiEvent::Notice(LOAD_FAILED.to_string()));
                    self.transition(ViewState::Home);
                }
            }
            other => self.transition(other),
        }

        if self.machine.current() == ViewState::Home {
            if let Err(err) = self.refresh_session_list(&user.user_id).await {
                tracing::warn!(error = %err, "[GuruController] session list refresh failed");
            }
        }
        Ok(())
    }

    pub fn current_view(&self) -> ViewState {
        self.machine.current()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn transition(&self, target: ViewState) {
        if self.machine.apply(target.clone()) {
            tracing::info!(view = ?target, "[GuruController] view changed");
        }
    }

    fn emit(&self, event: UiEvent) {
        // The surface may be gone during shutdown; nothing to do then.
        let _ = self.events.send(event);
    }
}

/// The profile-generation flow, off the controller so the spawned task
/// owns its collaborators outright.
async fn generate_elemental_profile(
    store: Arc<dyn UserStore>,
    pipeline: ConsultPipeline,
    events: EventSender,
    user_id: &str,
    profile: &BirthProfile,
) -> Result<()> {
    if store.load_elemental_profile(user_id).await?.is_some() {
        tracing::debug!("[GuruController] elemental profile already stored");
        return Ok(());
    }

    let _ = events.send(UiEvent::LoadingChanged(Some(
        loading_text(PipelineStage::Analysis).to_string(),
    )));
    let analysis_zh = pipeline.analyze_profile(profile).await?;

    // The translation starts now but nothing below waits for it.
    let translation = tokio::spawn({
        let pipeline = pipeline.clone();
        let analysis_zh = analysis_zh.clone();
        async move { pipeline.translate_analysis(&analysis_zh).await }
    });

    let _ = events.send(UiEvent::LoadingChanged(Some(
        loading_text(PipelineStage::Extraction).to_string(),
    )));
    let extraction = pipeline.extract_elements(&analysis_zh).await?;
    let elemental = extraction.into_profile(analysis_zh);
    store
        .save_elemental_profile(user_id, ElementalUpdate::from(elemental))
        .await?;
    tracing::info!("[GuruController] elemental profile persisted");

    let _ = events.send(UiEvent::LoadingChanged(None));
    let _ = events.send(UiEvent::ElementalProfileReady);

    // Merge the translated analysis whenever it resolves; a failure here
    // leaves the pending placeholder in place indefinitely.
    let user_id = user_id.to_string();
    tokio::spawn(async move {
        match translation.await {
            Ok(Ok(analysis_en)) => {
                match store
                    .save_elemental_profile(&user_id, ElementalUpdate::analysis_en(analysis_en))
                    .await
                {
                    Ok(()) => {
                        tracing::info!("[GuruController] analysis translation merged");
                        let _ = events.send(UiEvent::ElementalProfileReady);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "[GuruController] translation merge failed");
                    }
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "[GuruController] analysis translation failed");
            }
            Err(err) => {
                tracing::warn!(error = %err, "[GuruController] translation task aborted");
            }
        }
    });

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
