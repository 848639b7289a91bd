//! Infrastructure layer: persistence, local auth, configuration, paths.

pub mod config;
pub mod document;
pub mod json_store;
pub mod memory_auth;
pub mod memory_store;
pub mod paths;
pub mod storage;

pub use crate::config::AppConfig;
pub use crate::document::{StoredSession, UserDocument};
pub use crate::json_store::JsonFileUserStore;
pub use crate::memory_auth::MemoryAuthGateway;
pub use crate::memory_store::MemoryUserStore;
pub use crate::paths::GuruPaths;
