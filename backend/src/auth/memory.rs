//! In-process auth provider keeping accounts in memory.
//!
//! Secrets are stored as salted SHA-256 digests. Accounts vanish with the
//! process, which is all tests and single-session embedding need.

use async_trait::async_trait;
use log::{info, warn};
use sha2::{Digest, Sha256};
use shared::Identity;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

use super::{AuthError, AuthService};
use crate::config::AuthConfig;

struct Account {
    uid: String,
    salt: String,
    secret_digest: String,
}

pub struct MemoryAuthService {
    config: AuthConfig,
    accounts: Mutex<HashMap<String, Account>>,
    identity: watch::Sender<Option<Identity>>,
}

impl MemoryAuthService {
    pub fn new(config: AuthConfig) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            config,
            accounts: Mutex::new(HashMap::new()),
            identity,
        }
    }

    fn digest(salt: &str, secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b":");
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Normalized identifier and the username part before `@`
    fn parse_identifier(identifier: &str) -> Result<(String, String), AuthError> {
        let normalized = identifier.trim().to_lowercase();
        match normalized.split_once('@') {
            Some((user, domain))
                if !user.is_empty()
                    && !domain.is_empty()
                    && !normalized.chars().any(char::is_whitespace) =>
            {
                let username = user.to_string();
                Ok((normalized, username))
            }
            _ => Err(AuthError::InvalidIdentifier(identifier.to_string())),
        }
    }

    fn publish(&self, identity: Option<Identity>) {
        self.identity.send_replace(identity);
    }
}

#[async_trait]
impl AuthService for MemoryAuthService {
    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<Identity, AuthError> {
        let (identifier, username) = Self::parse_identifier(identifier)?;
        if secret.chars().count() < self.config.min_secret_length {
            return Err(AuthError::WeakSecret(self.config.min_secret_length));
        }

        let identity = {
            let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            if accounts.contains_key(&identifier) {
                return Err(AuthError::IdentifierTaken(identifier));
            }
            let salt = Uuid::new_v4().simple().to_string();
            let account = Account {
                uid: Uuid::new_v4().simple().to_string(),
                secret_digest: Self::digest(&salt, secret),
                salt,
            };
            let identity = Identity {
                uid: account.uid.clone(),
                identifier: identifier.clone(),
                username,
            };
            accounts.insert(identifier, account);
            identity
        };

        info!("Registered account {} ({})", identity.identifier, identity.uid);
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Identity, AuthError> {
        let (identifier, username) = Self::parse_identifier(identifier)?;
        let identity = {
            let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            let account = accounts.get(&identifier).ok_or(AuthError::InvalidCredentials)?;
            if Self::digest(&account.salt, secret) != account.secret_digest {
                warn!("Rejected sign-in for {}", identifier);
                return Err(AuthError::InvalidCredentials);
            }
            Identity {
                uid: account.uid.clone(),
                identifier,
                username,
            }
        };

        info!("Signed in {}", identity.identifier);
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(identity) = self.current_identity() {
            info!("Signed out {}", identity.identifier);
        }
        self.publish(None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    fn on_identity_change(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}
