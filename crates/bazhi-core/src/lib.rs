//! Domain layer of the BaZhi Guru client.
//!
//! Holds the models (birth profile, elements, exchanges, the bilingual
//! message cache, view states) and the capability traits (auth gateway,
//! user store, chat completion) that the outer crates implement and
//! orchestrate. Nothing in this crate performs I/O.

pub mod auth;
pub mod completion;
pub mod elements;
pub mod error;
pub mod profile;
pub mod session;
pub mod store;
pub mod view;

// Re-export common error type
pub use error::{GuruError, Result};
