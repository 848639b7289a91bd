//! One-way notifications from the controller to the rendering surface.
//!
//! The surface (terminal, web shell, tests) drains these from an unbounded
//! channel; senders never block, which keeps emission safe from the
//! synchronous post-transition hooks.

use bazhi_core::error::PipelineStage;
use bazhi_core::session::{Language, RenderedMessage, SessionSummary};
use bazhi_core::view::ViewState;
use tokio::sync::mpsc;

/// Card in the session picker.
///
/// The picker always shows every stored session in creation order followed
/// by exactly one synthetic "start new" affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCard {
    Existing(SessionSummary),
    NewSession,
}

/// Everything the surface needs to know, pushed as it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// The current view changed; render the new screen.
    ViewChanged(ViewState),
    /// The whole transcript was replaced (session opened or language toggled).
    TranscriptReset(Vec<RenderedMessage>),
    /// A single bubble to append: optimistic user echoes, completed replies,
    /// transient error notices.
    MessageRendered(RenderedMessage),
    /// `Some(text)` shows a progress line, `None` clears it.
    LoadingChanged(Option<String>),
    /// Whether the send control accepts input.
    InputEnabled(bool),
    /// The session picker contents changed.
    SessionListChanged(Vec<SessionCard>),
    /// The display language changed; a `TranscriptReset` follows.
    LanguageChanged(Language),
    /// The elemental profile (or its delayed translation) was persisted.
    ElementalProfileReady,
    /// Out-of-band warning, typically a store failure.
    Notice(String),
}

pub type EventSender = mpsc::UnboundedSender<UiEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<UiEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Progress line for an in-flight pipeline stage.
pub fn loading_text(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::TranslateQuestion => "Translating your question...",
        PipelineStage::Consult => "Consulting the BaZhi Guru...",
        PipelineStage::TranslateReply => "Translating the response...",
        PipelineStage::Analysis => "Analyzing your birth chart...",
        PipelineStage::Extraction => "Summarizing the five elements...",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interactive_stages_use_the_deployed_texts() {
        assert_eq!(
            loading_text(PipelineStage::TranslateQuestion),
            "Translating your question..."
        );
        assert_eq!(
            loading_text(PipelineStage::Consult),
            "Consulting the BaZhi Guru..."
        );
        assert_eq!(
            loading_text(PipelineStage::TranslateReply),
            "Translating the response..."
        );
    }
}
