use std::sync::Arc;

use snafu::ResultExt;

use crate::csrf_token::CsrfToken;
use crate::error::{AuthError, StorageSnafu};
use crate::storage::{KeyValueStore, read_json, remove_logged, write_json};

/// Manages the `state` parameter of the login attempt in flight, used to detect CSRF attacks.
///
/// Stored in session storage next to the code verifier, for the same reason: the login flow
/// reloads the app and the value must be compared after coming back.
#[derive(Debug, Clone)]
pub(crate) struct CsrfTokenManager {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    allow_insecure_rng: bool,
}

impl CsrfTokenManager {
    pub(crate) fn new(
        storage: Arc<dyn KeyValueStore>,
        namespace: &str,
        allow_insecure_rng: bool,
    ) -> Self {
        Self {
            storage,
            key: format!("{namespace}__state"),
            allow_insecure_rng,
        }
    }

    pub(crate) fn regenerate(&self) -> Result<CsrfToken, AuthError> {
        let token = CsrfToken::generate(self.allow_insecure_rng)?;
        write_json(self.storage.as_ref(), &self.key, &token).context(StorageSnafu {})?;
        Ok(token)
    }

    /// Validates that the `state` seen in a callback is the one we stored before navigating away.
    ///
    /// # Returns
    /// - `true` if the token matches the expected value.
    /// - `false` if nothing was stored, nothing was received, or the tokens differ.
    pub(crate) fn validate_state(&self, received: Option<&str>) -> bool {
        let Some(expected) = read_json::<CsrfToken>(self.storage.as_ref(), &self.key) else {
            tracing::warn!(
                "State validation failed. No state was stored, this callback was not initiated by us. Potential CSRF attack."
            );
            return false;
        };

        let Some(received) = received else {
            tracing::warn!(
                "State validation failed. No state was present in the callback. Potential CSRF attack."
            );
            return false;
        };

        // Although we compare secret tokens, this does not need to be timing-attack safe.
        // Attackers have no way to repeatedly trigger this validation without `expected` changing.
        let is_valid = expected.as_str() == received;
        if is_valid {
            tracing::trace!("Validation of the state parameter succeeded.");
        } else {
            tracing::warn!(
                "State validation failed. Tokens are not equal. Potential CSRF attack."
            );
        }
        is_valid
    }

    pub(crate) fn forget(&self) {
        remove_logged(self.storage.as_ref(), &self.key);
    }
}
