//! Chat session domain module.
//!
//! # Module Structure
//!
//! - `exchange`: One persisted question/answer round trip (`MessageExchange`)
//! - `model`: Session listing metadata (`SessionSummary`)
//! - `message`: Native conversation turns sent to the guru (`ChatTurn`)
//! - `cache`: The bilingual message cache and its language projection

mod cache;
mod exchange;
mod message;
mod model;

pub use cache::{CachedMessage, Language, MessageCache, MessageKind, RenderedMessage};
pub use exchange::MessageExchange;
pub use message::{ChatTurn, TurnRole};
pub use model::SessionSummary;
