//! # Auth Module
//!
//! Capability interface to the authentication provider. The ledger never
//! looks inside the provider; it only consumes the identity it reports.

pub mod memory;

use async_trait::async_trait;
use shared::Identity;
use thiserror::Error;
use tokio::sync::watch;

pub use memory::MemoryAuthService;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("'{0}' is not a valid login identifier")]
    InvalidIdentifier(String),
    #[error("Secret must be at least {0} characters")]
    WeakSecret(usize),
    #[error("An account already exists for '{0}'")]
    IdentifierTaken(String),
    #[error("Invalid identifier or secret")]
    InvalidCredentials,
}

#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    /// Create an account and sign it in
    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<Identity, AuthError>;

    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    fn current_identity(&self) -> Option<Identity>;

    /// Stream of identity changes; holds the current identity on subscribe
    fn on_identity_change(&self) -> watch::Receiver<Option<Identity>>;
}
