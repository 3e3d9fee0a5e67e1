use crate::error::AuthError;

/// Where the login flow currently stands.
///
/// Transitions:
///
/// ```text
/// Anonymous --login()--> LoginPending --(redirect back)--> CallbackPending
/// CallbackPending --handle_callback() ok--> Authenticated
/// CallbackPending --handle_callback() err--> Error
/// any --logout()--> Anonymous
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No token is known.
    Anonymous,

    /// The user was sent to the authorization server. The app usually unloads right after.
    LoginPending,

    /// The current URL carries callback parameters which were not yet processed.
    CallbackPending,

    /// A token record is stored. The access token may be stale but refreshable.
    Authenticated,

    /// The last login attempt failed. A new `login()` starts over.
    Error(AuthFailure),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

/// A cloneable summary of the [`AuthError`] which ended a login attempt, for UIs to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    Configuration {
        reason: String,
    },

    /// The authorization server redirected back with an `error`, e.g. `access_denied`.
    OAuth {
        error: String,
        description: Option<String>,
    },

    StateMismatch,

    MissingVerifier,

    /// The code could not be traded for tokens.
    TokenExchange {
        message: String,
    },

    Other {
        message: String,
    },
}

impl From<&AuthError> for AuthFailure {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Configuration { reason } => AuthFailure::Configuration {
                reason: reason.clone(),
            },
            AuthError::OAuth { error, description } => AuthFailure::OAuth {
                error: error.clone(),
                description: description.clone(),
            },
            AuthError::StateMismatch => AuthFailure::StateMismatch,
            AuthError::MissingVerifier => AuthFailure::MissingVerifier,
            AuthError::TokenExchangeFailed { .. } | AuthError::Request { .. } => {
                AuthFailure::TokenExchange {
                    message: err.to_string(),
                }
            }
            other => AuthFailure::Other {
                message: other.to_string(),
            },
        }
    }
}
