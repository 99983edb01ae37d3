//! Session state for the signed-in admin.

pub mod token_manager;

pub use token_manager::TokenManager;

use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::error::{ApiError, ErrorCode};
use crate::backend::{AuthReply, INVALID_CREDENTIALS, NOT_ADMIN};
use crate::models::AdminUser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    /// A persisted session is being checked
    Verifying,
    Authenticated(AdminUser),
}

impl AuthState {
    pub fn user(&self) -> Option<&AdminUser> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Drives login, logout and session restore, and publishes the resulting
/// [`AuthState`] to subscribers.
pub struct SessionStore {
    tokens: TokenManager,
    state: watch::Sender<AuthState>,
}

impl SessionStore {
    pub fn new(tokens: TokenManager) -> Self {
        let (state, _) = watch::channel(AuthState::Anonymous);
        Self { tokens, state }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<AdminUser> {
        self.state.borrow().user().cloned()
    }

    pub fn is_loading(&self) -> bool {
        matches!(*self.state.borrow(), AuthState::Verifying)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.borrow(), AuthState::Authenticated(_))
    }

    /// Resume a persisted session.
    ///
    /// On any failure the stored credentials are cleared and the state ends
    /// up [`AuthState::Anonymous`].
    pub async fn restore(&self) -> Result<AdminUser, ApiError> {
        self.state.send_replace(AuthState::Verifying);

        match self.verify_stored_session().await {
            Ok(user) => {
                info!(user = %user.email, "Restored admin session");
                self.state.send_replace(AuthState::Authenticated(user.clone()));
                Ok(user)
            }
            Err(e) => {
                info!(reason = %e.message(), "No session to restore");
                self.tokens.clear_all();
                self.state.send_replace(AuthState::Anonymous);
                Err(e)
            }
        }
    }

    async fn verify_stored_session(&self) -> Result<AdminUser, ApiError> {
        let Some(stored) = self.tokens.stored_user() else {
            return Err(ApiError::new(ErrorCode::Unauthenticated, "Not logged in"));
        };
        if self.tokens.refresh_token().is_none() {
            return Err(ApiError::new(ErrorCode::Unauthenticated, "Not logged in"));
        }

        let Some(access_token) = self.tokens.ensure_valid_token().await else {
            return Err(ApiError::new(ErrorCode::Unauthenticated, "Session expired"));
        };

        let reply = self
            .tokens
            .backend()
            .verify(&access_token)
            .await
            .map_err(|e| {
                warn!(error = %e, "Session verification failed");
                ApiError::new(ErrorCode::Network, "Verification failed")
            })?;

        if !reply.success {
            return Err(ApiError::new(
                ErrorCode::Unauthenticated,
                reply.error.unwrap_or_else(|| "Session expired".to_string()),
            ));
        }

        let user = reply.user.unwrap_or(stored);
        self.tokens.set_stored_user(Some(&user))?;
        Ok(user)
    }

    /// Sign in with email and password.
    ///
    /// Nothing is persisted unless the backend accepts the credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<AdminUser, ApiError> {
        let email = email.trim();
        let mut errors = HashMap::new();
        if email.is_empty() {
            errors.insert("email".to_string(), vec!["Email is required".to_string()]);
        }
        if password.is_empty() {
            errors.insert("password".to_string(), vec!["Password is required".to_string()]);
        }
        if !errors.is_empty() {
            return Err(ApiError::validation(errors));
        }

        let reply = self
            .tokens
            .backend()
            .login(email, password)
            .await
            .map_err(|e| {
                warn!(error = %e, "Login request failed");
                ApiError::network()
            })?;

        if !reply.success {
            let err = login_error(reply);
            info!(email, reason = %err.message(), "Login rejected");
            return Err(err);
        }

        let (Some(access_token), Some(refresh_token), Some(user)) =
            (reply.access_token, reply.refresh_token, reply.user)
        else {
            warn!("Login reply is missing tokens or user");
            return Err(ApiError::backend("Login failed"));
        };

        let persisted = self
            .tokens
            .set_refresh_token(Some(&refresh_token))
            .and_then(|_| self.tokens.set_stored_user(Some(&user)));
        if let Err(e) = persisted {
            self.tokens.clear_all();
            return Err(e.into());
        }
        self.tokens.set_access_token(Some(access_token));

        info!(user = %user.email, "Admin signed in");
        self.state.send_replace(AuthState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Sign out. Local credentials are cleared even if the backend call fails.
    pub async fn logout(&self) {
        let refresh_token = self.tokens.refresh_token();
        if let Err(e) = self.tokens.backend().logout(refresh_token.as_deref()).await {
            warn!(error = %e, "Remote logout failed, clearing local session anyway");
        }

        self.tokens.clear_all();
        self.state.send_replace(AuthState::Anonymous);
        info!("Admin signed out");
    }
}

fn login_error(reply: AuthReply) -> ApiError {
    match reply.error_type.as_deref() {
        Some(INVALID_CREDENTIALS) => ApiError::invalid_credentials(),
        Some(NOT_ADMIN) => ApiError::forbidden(
            reply
                .error
                .unwrap_or_else(|| "Not authorized as admin".to_string()),
        ),
        _ => ApiError::backend(reply.error.unwrap_or_else(|| "Login failed".to_string())),
    }
}
