//! Local auth gateway.
//!
//! Stands in for the hosted identity provider during tests and terminal
//! runs: accounts live in memory, user ids are freshly minted UUIDs, and
//! every successful sign-in/sign-out is broadcast to subscribers exactly
//! as the provider's auth listener would deliver it.

use async_trait::async_trait;
use bazhi_core::auth::{AuthEvent, AuthGateway, AuthUser};
use bazhi_core::error::{GuruError, Result};
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast};

const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    user_id: String,
    password: String,
}

/// In-memory accounts with provider-style validation rules.
pub struct MemoryAuthGateway {
    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<AuthUser>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for MemoryAuthGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuthGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            events,
        }
    }

    async fn set_current(&self, user: Option<AuthUser>) {
        let event = match &user {
            Some(user) => AuthEvent::SignedIn(user.clone()),
            None => AuthEvent::SignedOut,
        };
        *self.current.write().await = user;
        // Nobody listening yet is fine; the controller subscribes at startup.
        let _ = self.events.send(event);
    }

    fn normalize_email(email: &str) -> Result<String> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(GuruError::auth("Please enter a valid email address."));
        }
        Ok(email)
    }
}

#[async_trait]
impl AuthGateway for MemoryAuthGateway {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
        let email = Self::normalize_email(email)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(GuruError::auth("Password must be at least 6 characters!"));
        }

        let user = {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(&email) {
                return Err(GuruError::auth("An account with this email already exists."));
            }
            let user = AuthUser {
                user_id: uuid::Uuid::new_v4().to_string(),
                email: email.clone(),
            };
            accounts.insert(
                email,
                Account {
                    user_id: user.user_id.clone(),
                    password: password.to_string(),
                },
            );
            user
        };

        self.set_current(Some(user.clone())).await;
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let email = Self::normalize_email(email)?;
        let user = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .get(&email)
                .filter(|account| account.password == password)
                .ok_or_else(|| GuruError::auth("Incorrect email or password."))?;
            AuthUser {
                user_id: account.user_id.clone(),
                email,
            }
        };

        self.set_current(Some(user.clone())).await;
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        self.set_current(None).await;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        let email = Self::normalize_email(email)?;
        let accounts = self.accounts.read().await;
        if !accounts.contains_key(&email) {
            return Err(GuruError::auth("No account found for this email."));
        }
        // No mail here; the hosted provider owns delivery.
        Ok(())
    }

    async fn current_user(&self) -> Option<AuthUser> {
        self.current.read().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_up_signs_in_and_broadcasts() {
        let auth = MemoryAuthGateway::new();
        let mut events = auth.subscribe();

        let user = auth.sign_up("Guru@Example.com", "secret1").await.unwrap();
        assert_eq!(user.email, "guru@example.com");
        assert_eq!(auth.current_user().await, Some(user.clone()));
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedIn(user));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let auth = MemoryAuthGateway::new();
        let err = auth.sign_up("a@example.com", "12345").await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let auth = MemoryAuthGateway::new();
        auth.sign_up("a@example.com", "secret1").await.unwrap();
        auth.sign_out().await.unwrap();

        let err = auth.sign_in("a@example.com", "wrong!!").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(auth.current_user().await, None);
    }

    #[tokio::test]
    async fn sign_out_broadcasts() {
        let auth = MemoryAuthGateway::new();
        auth.sign_up("a@example.com", "secret1").await.unwrap();

        let mut events = auth.subscribe();
        auth.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
    }

    #[tokio::test]
    async fn reset_requires_known_account() {
        let auth = MemoryAuthGateway::new();
        assert!(auth.send_password_reset("ghost@example.com").await.is_err());

        auth.sign_up("a@example.com", "secret1").await.unwrap();
        assert!(auth.send_password_reset("a@example.com").await.is_ok());
    }
}
