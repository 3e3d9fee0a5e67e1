use http::StatusCode;
use snafu::Snafu;

use crate::request::RequestError;
use crate::response::ErrorResponse;
use crate::storage::StorageError;

/// An enumeration representing various authentication-related errors.
///
/// Configuration and crypto errors are returned before any side effect happens. Token endpoint
/// errors are recorded in the [`crate::AuthState`] as well as returned. `Api` errors are left for
/// the calling feature to interpret.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("AuthError: Invalid configuration: {reason}"))]
    Configuration { reason: String },

    #[snafu(display("AuthError: Authorization server responded with '{error}'"))]
    OAuth {
        error: String,
        description: Option<String>,
    },

    #[snafu(display("AuthError: Returned state does not match the stored state"))]
    StateMismatch,

    #[snafu(display("AuthError: No code verifier stored for this login attempt"))]
    MissingVerifier,

    #[snafu(display("AuthError: Token exchange failed with status {status}"))]
    TokenExchangeFailed {
        status: StatusCode,
        body: String,
        error_response: Option<ErrorResponse>,
    },

    #[snafu(display("AuthError: Token refresh failed with status {status}"))]
    TokenRefreshFailed {
        status: StatusCode,
        body: String,
        error_response: Option<ErrorResponse>,
    },

    #[snafu(display("AuthError: Not authenticated"))]
    NotAuthenticated,

    #[snafu(display("AuthError: API request failed with status {status}"))]
    Api { status: StatusCode, body: String },

    #[snafu(display("AuthError: No secure random source available: {reason}"))]
    CryptoUnavailable { reason: String },

    #[snafu(display("AuthError: Request error"))]
    Request { source: RequestError },

    #[snafu(display("AuthError: Storage error"))]
    Storage { source: StorageError },
}

impl AuthError {
    /// Whether the token endpoint rejected a grant as `invalid_grant`.
    ///
    /// Spotify answers this way for revoked, expired or already rotated refresh tokens. The known
    /// token is then useless and a new login is required.
    pub fn is_invalid_grant(&self) -> bool {
        match self {
            AuthError::TokenExchangeFailed { error_response, .. }
            | AuthError::TokenRefreshFailed { error_response, .. } => error_response
                .as_ref()
                .is_some_and(ErrorResponse::is_invalid_grant),
            _ => false,
        }
    }
}
