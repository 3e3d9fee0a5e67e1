use crate::code_verifier::{Entropy, fill_random};
use crate::error::AuthError;

/// Cryptographically secure token used as the OAuth `state` parameter to detect CSRF attacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CsrfToken {
    csrf_token: String,
}

impl CsrfToken {
    /// Generate a new CSRF token, using 32 bytes of random data, base64 url encoded as a
    /// 43 character string.
    pub fn generate(allow_insecure_rng: bool) -> Result<Self, AuthError> {
        use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

        let mut bytes = [0u8; 32];
        if fill_random(&mut bytes, allow_insecure_rng)? == Entropy::Degraded {
            tracing::warn!("Generated a CSRF token from a degraded random source.");
        }
        let csrf_token = URL_SAFE_NO_PAD.encode(bytes);

        Ok(Self { csrf_token })
    }

    pub fn as_str(&self) -> &str {
        &self.csrf_token
    }
}
