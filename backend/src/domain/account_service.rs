//! Registration and sign-in on top of the auth provider.
//!
//! Usernames are turned into provider identifiers by appending the
//! configured domain. Registration also writes the user's profile document.

use chrono::Utc;
use log::{error, info};
use shared::{Identity, NewUserProfile, UserProfile};
use std::sync::Arc;

use super::error::{LedgerError, LedgerResult};
use super::ledger::Session;
use super::validation::{validate_phone, validate_username};
use crate::auth::AuthService;
use crate::config::LedgerConfig;
use crate::storage::{Connection, ProfileStorage};

pub struct AccountService<A: AuthService, C: Connection> {
    auth: Arc<A>,
    profiles: C::ProfileRepository,
    identifier_domain: String,
}

impl<A: AuthService, C: Connection> Clone for AccountService<A, C> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            profiles: self.profiles.clone(),
            identifier_domain: self.identifier_domain.clone(),
        }
    }
}

impl<A: AuthService, C: Connection> AccountService<A, C> {
    pub fn new(auth: Arc<A>, connection: &C, config: &LedgerConfig) -> Self {
        Self {
            auth,
            profiles: connection.create_profile_repository(),
            identifier_domain: config.identifier_domain.clone(),
        }
    }

    fn identifier_for(&self, username: &str) -> String {
        format!("{}@{}", username.trim(), self.identifier_domain)
    }

    /// Create the account, sign it in and store its profile
    pub async fn register(&self, username: &str, secret: &str, phone: &str) -> LedgerResult<Identity> {
        validate_username(username)?;
        validate_phone(phone)?;

        let identity = self
            .auth
            .sign_up(&self.identifier_for(username), secret)
            .await?;

        let profile = NewUserProfile {
            uid: identity.uid.clone(),
            username: username.trim().to_string(),
            name: None,
            phone_number: Some(phone.trim().to_string()),
            created_at: Utc::now(),
        };
        if let Err(e) = self.profiles.store_profile(&profile).await {
            error!("Failed to store profile for {}: {:#}", identity.uid, e);
            return Err(LedgerError::persistence(e));
        }

        info!("Registered {} ({})", profile.username, identity.uid);
        Ok(identity)
    }

    pub async fn sign_in(&self, username: &str, secret: &str) -> LedgerResult<Identity> {
        let identity = self
            .auth
            .sign_in(&self.identifier_for(username), secret)
            .await?;
        Ok(identity)
    }

    pub async fn sign_out(&self) -> LedgerResult<()> {
        self.auth.sign_out().await?;
        Ok(())
    }

    pub fn current_session(&self) -> Option<Session> {
        self.auth.current_identity().map(Session::new)
    }

    /// Profile written for the session's user at registration
    pub async fn profile(&self, session: &Session) -> LedgerResult<UserProfile> {
        self.profiles
            .find_profile_by_uid(session.uid())
            .await
            .map_err(LedgerError::persistence)?
            .ok_or_else(|| LedgerError::NotFound(session.uid().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, MemoryAuthService};
    use crate::config::AuthConfig;
    use crate::domain::validation::ValidationError;
    use crate::storage::MemoryConnection;

    fn service(connection: &MemoryConnection) -> AccountService<MemoryAuthService, MemoryConnection> {
        let auth = Arc::new(MemoryAuthService::new(AuthConfig::default()));
        AccountService::new(auth, connection, &LedgerConfig::default())
    }

    #[tokio::test]
    async fn test_register_writes_profile() {
        let connection = MemoryConnection::new();
        let accounts = service(&connection);

        let identity = accounts.register("kim", "hunter22", "5550100123").await.unwrap();
        assert_eq!(identity.identifier, "kim@knowapp.com");

        let session = accounts.current_session().unwrap();
        assert_eq!(session.uid(), identity.uid);
        let profile = accounts.profile(&session).await.unwrap();
        assert_eq!(profile.username, "kim");
        assert_eq!(profile.phone_number.as_deref(), Some("5550100123"));
    }

    #[tokio::test]
    async fn test_sign_out_then_back_in() {
        let connection = MemoryConnection::new();
        let accounts = service(&connection);
        let registered = accounts.register("kim", "hunter22", "5550100123").await.unwrap();

        accounts.sign_out().await.unwrap();
        assert!(accounts.current_session().is_none());

        let signed_in = accounts.sign_in("kim", "hunter22").await.unwrap();
        assert_eq!(signed_in.uid, registered.uid);
        assert!(matches!(
            accounts.sign_in("kim", "wrong-one").await,
            Err(LedgerError::Auth(AuthError::InvalidCredentials))
        ));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let connection = MemoryConnection::new();
        let accounts = service(&connection);

        assert!(matches!(
            accounts.register("ki", "hunter22", "5550100123").await,
            Err(LedgerError::Validation(ValidationError::UsernameTooShort { .. }))
        ));
        assert!(matches!(
            accounts.register("kim", "hunter22", "12345").await,
            Err(LedgerError::Validation(ValidationError::InvalidPhone { .. }))
        ));
        assert!(matches!(
            accounts.register("kim", "123", "5550100123").await,
            Err(LedgerError::Auth(AuthError::WeakSecret(6)))
        ));
        assert!(accounts.current_session().is_none());
    }

    #[tokio::test]
    async fn test_profile_write_failure_is_reported() {
        let connection = MemoryConnection::new();
        let accounts = service(&connection);
        connection.set_fail_writes(true);

        assert!(matches!(
            accounts.register("kim", "hunter22", "5550100123").await,
            Err(LedgerError::Persistence(_))
        ));
    }
}
