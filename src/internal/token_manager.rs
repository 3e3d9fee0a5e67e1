use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::lock::Mutex;
use snafu::OptionExt;
use url::Url;

use crate::AuthorizationCode;
use crate::code_verifier::CodeVerifier;
use crate::error::{AuthError, NotAuthenticatedSnafu};
use crate::internal::token_store::TokenStore;
use crate::request::TokenExchanger;
use crate::token::TokenRecord;

/// Session version identifier.
///
/// Not orderable on purpose: we only ever compare two versions for equality, which keeps
/// working when the counter overflows.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct SessionVersion(u64);

/// Owns the token lifecycle: code exchange, expiry checks and refreshing.
///
/// Refreshes are single-flight. Callers that find the token expired while a refresh is in flight
/// wait for it and reuse its result instead of issuing their own request.
pub(crate) struct TokenManager {
    store: TokenStore,
    exchanger: Arc<dyn TokenExchanger>,
    client_id: String,

    refresh_lock: Mutex<()>,

    /// Which authentication session we are currently in.
    ///
    /// Incremented on login and logout. A refresh response arriving for a previous session
    /// is discarded, so that a logout cannot be undone by a refresh that was still in flight.
    session_version: AtomicU64,
}

impl Debug for TokenManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("store", &self.store)
            .field("exchanger", &self.exchanger)
            .field("client_id", &self.client_id)
            .field("session_version", &self.session_version())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub(crate) fn new(
        store: TokenStore,
        exchanger: Arc<dyn TokenExchanger>,
        client_id: String,
    ) -> Self {
        Self {
            store,
            exchanger,
            client_id,
            refresh_lock: Mutex::new(()),
            session_version: AtomicU64::new(0),
        }
    }

    pub(crate) fn store(&self) -> &TokenStore {
        &self.store
    }

    fn session_version(&self) -> SessionVersion {
        SessionVersion(self.session_version.load(Ordering::SeqCst))
    }

    fn next_session(&self) {
        self.session_version.fetch_add(1, Ordering::SeqCst);
    }

    /// Trade `code` for tokens and persist them. Starts a new session.
    pub(crate) async fn exchange_code(
        &self,
        code: &AuthorizationCode,
        code_verifier: &CodeVerifier,
        redirect_uri: &Url,
    ) -> Result<TokenRecord, AuthError> {
        let response = self
            .exchanger
            .exchange_code(code, code_verifier, &self.client_id, redirect_uri)
            .await?;
        self.next_session();
        self.store.save(TokenRecord::from(response))
    }

    /// A token that is not expired, refreshing the stored one if necessary.
    pub(crate) async fn fresh_token(&self) -> Result<TokenRecord, AuthError> {
        let token = self.store.load().context(NotAuthenticatedSnafu {})?;
        if !self.store.is_expired(&token) {
            return Ok(token);
        }
        tracing::trace!("Access token expired. Refreshing...");
        self.refresh(&token).await
    }

    /// Replace `stale` with a refreshed token.
    ///
    /// If the stored token no longer equals `stale`, another caller already refreshed and the
    /// stored token is returned as is.
    pub(crate) async fn refresh(&self, stale: &TokenRecord) -> Result<TokenRecord, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.store.load().context(NotAuthenticatedSnafu {})?;
        if current != *stale {
            tracing::trace!("Token was refreshed concurrently. Reusing it.");
            return Ok(current);
        }

        let Some(refresh_token) = current.refresh_token.as_deref() else {
            tracing::debug!("Token expired and no refresh_token is known.");
            return NotAuthenticatedSnafu {}.fail();
        };

        let version = self.session_version();
        match self.exchanger.refresh(refresh_token, &self.client_id).await {
            Ok(response) => {
                if self.session_version() != version {
                    tracing::debug!("Session ended while refreshing. Discarding refreshed token.");
                    return NotAuthenticatedSnafu {}.fail();
                }
                let refreshed = TokenRecord::from(response).keeping_refresh_token_of(&current);
                self.store.save(refreshed)
            }
            Err(err) => {
                if err.is_invalid_grant() {
                    tracing::warn!(
                        "The known refresh_token is not valid. Dropping token data. A new login is required."
                    );
                    if self.session_version() == version {
                        self.store.clear();
                    }
                } else {
                    tracing::warn!(?err, "Token refresh failed.");
                }
                Err(err)
            }
        }
    }

    /// Drop all token data and end the session.
    pub(crate) fn forget(&self) {
        self.next_session();
        self.store.clear();
    }
}
