//! Application layer for the BaZhi Guru client.
//!
//! This crate provides the controller that coordinates the auth gateway,
//! the store adapter, the consultation pipeline and the view machine, and
//! the UI event stream surfaces render from.

pub mod controller;
pub mod events;
pub mod session_list;
pub mod view_machine;

pub use controller::GuruController;
pub use events::{EventReceiver, EventSender, SessionCard, UiEvent, channel, loading_text};
pub use session_list::{derive_cards, next_chat_id};
pub use view_machine::{HashSurface, MemoryHash, TransitionHook, ViewMachine};
