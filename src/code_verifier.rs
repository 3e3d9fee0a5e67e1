use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ConfigurationSnafu, CryptoUnavailableSnafu};

/// Unreserved URI characters allowed in a code verifier. See RFC 7636 section 4.1.
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Largest multiple of `CHARSET.len()` fitting into a byte. Bytes at or above are rejected to
/// keep the character distribution uniform.
const ACCEPT_BELOW: usize = (256 / CHARSET.len()) * CHARSET.len();

pub const MIN_CODE_VERIFIER_LENGTH: usize = 43;
pub const MAX_CODE_VERIFIER_LENGTH: usize = 128;
pub const DEFAULT_CODE_VERIFIER_LENGTH: usize = 64;

/// Quality of the random source a value was generated from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entropy {
    /// Drawn from the operating system's CSPRNG.
    #[default]
    Secure,

    /// Drawn from a time-seeded, non-cryptographic generator because no secure source was
    /// available. Never produced unless `allow_insecure_rng` was explicitly enabled.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeVerifier {
    code_verifier: String,
    #[serde(default)]
    entropy: Entropy,
}

impl CodeVerifier {
    /// Generate a new verifier of `length` characters from the OS random source.
    ///
    /// see: https://datatracker.ietf.org/doc/html/rfc7636
    pub fn generate(length: usize) -> Result<Self, AuthError> {
        Self::generate_with(length, false)
    }

    pub(crate) fn generate_with(length: usize, allow_insecure_rng: bool) -> Result<Self, AuthError> {
        if !(MIN_CODE_VERIFIER_LENGTH..=MAX_CODE_VERIFIER_LENGTH).contains(&length) {
            return ConfigurationSnafu {
                reason: format!(
                    "code verifier length must be within {MIN_CODE_VERIFIER_LENGTH}..={MAX_CODE_VERIFIER_LENGTH}, got {length}"
                ),
            }
            .fail();
        }

        let mut code_verifier = String::with_capacity(length);
        let mut entropy = Entropy::Secure;
        let mut bytes = vec![0u8; length];

        while code_verifier.len() < length {
            if fill_random(&mut bytes, allow_insecure_rng)? == Entropy::Degraded {
                entropy = Entropy::Degraded;
            }
            let accepted = bytes
                .iter()
                .map(|byte| usize::from(*byte))
                .filter(|byte| *byte < ACCEPT_BELOW)
                .map(|byte| CHARSET[byte % CHARSET.len()] as char)
                .take(length - code_verifier.len());
            code_verifier.extend(accepted);
        }

        Ok(Self {
            code_verifier,
            entropy,
        })
    }

    /// Wrap an existing verifier, e.g. one generated elsewhere. The value is checked for the
    /// length and character set RFC 7636 requires.
    pub fn from_existing(code_verifier: impl Into<String>) -> Result<Self, AuthError> {
        let code_verifier = code_verifier.into();
        let valid_length =
            (MIN_CODE_VERIFIER_LENGTH..=MAX_CODE_VERIFIER_LENGTH).contains(&code_verifier.len());
        let valid_chars = code_verifier.bytes().all(|b| CHARSET.contains(&b));
        if !valid_length || !valid_chars {
            return ConfigurationSnafu {
                reason: "code verifier must be 43 to 128 unreserved characters",
            }
            .fail();
        }
        Ok(Self {
            code_verifier,
            entropy: Entropy::Secure,
        })
    }

    pub fn to_code_challenge(&self) -> CodeChallenge {
        use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
        use sha2::Digest;

        let mut hasher = sha2::Sha256::new();
        hasher.update(self.code_verifier.as_bytes());
        let digest = hasher.finalize();

        let code_challenge = URL_SAFE_NO_PAD.encode(digest);

        CodeChallenge {
            code_challenge,
            code_challenge_method: CodeChallengeMethod::S256,
        }
    }

    pub fn code_verifier(&self) -> &str {
        self.code_verifier.as_str()
    }

    pub fn entropy(&self) -> Entropy {
        self.entropy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeChallengeMethod {
    S256,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::S256 => "S256",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChallenge {
    code_challenge: String,
    code_challenge_method: CodeChallengeMethod,
}

impl CodeChallenge {
    pub fn code_challenge(&self) -> &str {
        self.code_challenge.as_str()
    }

    pub fn code_challenge_method(&self) -> CodeChallengeMethod {
        self.code_challenge_method
    }
}

/// Fill `buf` from the OS random source.
///
/// Falls back to a time-seeded generator only when `allow_insecure_rng` is set, reporting
/// [`Entropy::Degraded`]. Otherwise a missing OS source is a `CryptoUnavailable` error.
pub(crate) fn fill_random(buf: &mut [u8], allow_insecure_rng: bool) -> Result<Entropy, AuthError> {
    fill_random_from(&mut rand::rngs::OsRng, buf, allow_insecure_rng)
}

fn fill_random_from<R: rand::TryRngCore>(
    rng: &mut R,
    buf: &mut [u8],
    allow_insecure_rng: bool,
) -> Result<Entropy, AuthError> {
    use rand::{RngCore, SeedableRng};

    match rng.try_fill_bytes(buf) {
        Ok(()) => Ok(Entropy::Secure),
        Err(err) if allow_insecure_rng => {
            tracing::warn!(
                %err,
                "No secure random source available. Falling back to a NON-CRYPTOGRAPHIC generator. Generated values must not be used in production."
            );
            let seed = time::OffsetDateTime::now_utc().unix_timestamp_nanos() as u64;
            rand::rngs::StdRng::seed_from_u64(seed).fill_bytes(buf);
            Ok(Entropy::Degraded)
        }
        Err(err) => CryptoUnavailableSnafu {
            reason: err.to_string(),
        }
        .fail(),
    }
}
