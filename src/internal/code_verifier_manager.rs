use std::sync::Arc;

use snafu::ResultExt;

use crate::code_verifier::{CodeVerifier, Entropy};
use crate::error::{AuthError, StorageSnafu};
use crate::storage::{KeyValueStore, read_json, remove_logged, write_json};

/// Keeps the code verifier of the login attempt in flight.
///
/// The verifier has to survive the full page reload caused by the round trip to the
/// authorization server, so it lives in session storage. It never outlives the tab and is
/// consumed by the first callback that reads it.
#[derive(Debug, Clone)]
pub(crate) struct CodeVerifierManager {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    length: usize,
    allow_insecure_rng: bool,
}

impl CodeVerifierManager {
    pub(crate) fn new(
        storage: Arc<dyn KeyValueStore>,
        namespace: &str,
        length: usize,
        allow_insecure_rng: bool,
    ) -> Self {
        Self {
            storage,
            key: format!("{namespace}__code_verifier"),
            length,
            allow_insecure_rng,
        }
    }

    /// Generate and store a fresh verifier, replacing any previous one.
    pub(crate) fn regenerate(&self) -> Result<CodeVerifier, AuthError> {
        let code_verifier = CodeVerifier::generate_with(self.length, self.allow_insecure_rng)?;
        if code_verifier.entropy() == Entropy::Degraded {
            tracing::warn!("Code verifier was generated from a degraded random source.");
        }
        write_json(self.storage.as_ref(), &self.key, &code_verifier).context(StorageSnafu {})?;
        Ok(code_verifier)
    }

    /// Remove and return the stored verifier. A verifier can only be taken once.
    pub(crate) fn take(&self) -> Option<CodeVerifier> {
        let code_verifier = read_json::<CodeVerifier>(self.storage.as_ref(), &self.key);
        if code_verifier.is_some() {
            remove_logged(self.storage.as_ref(), &self.key);
        }
        code_verifier
    }

    pub(crate) fn forget(&self) {
        remove_logged(self.storage.as_ref(), &self.key);
    }
}
