//! Authentication gateway trait.
//!
//! The hosted identity provider stays outside this crate; everything the
//! client needs from it is behind [`AuthGateway`]. Auth state changes are
//! pushed over a broadcast channel so the controller reacts to sign-in
//! and sign-out no matter which surface triggered them.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Provider-issued stable user id; keys the per-user document.
    pub user_id: String,
    pub email: String,
}

/// Auth state change, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthUser),
    SignedOut,
}

/// An abstract gateway to the authentication provider.
///
/// Implementations surface provider failures as `GuruError::Auth` so the
/// caller can show them inline at the auth forms; auth failures never
/// drive view transitions by themselves.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Registers a new account and signs it in.
    ///
    /// # Returns
    ///
    /// - `Ok(AuthUser)`: Account created, user signed in
    /// - `Err(GuruError::Auth)`: Rejected (duplicate email, weak password, ...)
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser>;

    /// Signs an existing account in.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser>;

    /// Signs the current user out. Succeeds even when nobody is signed in.
    async fn sign_out(&self) -> Result<()>;

    /// Requests a password-reset message for the address.
    async fn send_password_reset(&self, email: &str) -> Result<()>;

    /// The currently signed-in user, if any.
    async fn current_user(&self) -> Option<AuthUser>;

    /// Subscribes to auth state changes.
    ///
    /// Events are broadcast on every successful sign-in and sign-out,
    /// including the implicit sign-in after registration.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
