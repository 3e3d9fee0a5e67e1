use std::time::Duration;

use snafu::{OptionExt, ResultExt, Snafu};
use url::Url;

use crate::code_verifier::{
    DEFAULT_CODE_VERIFIER_LENGTH, MAX_CODE_VERIFIER_LENGTH, MIN_CODE_VERIFIER_LENGTH,
};
use crate::error::{AuthError, ConfigurationSnafu};
use crate::{AuthorizationEndpoint, TokenEndpoint};

pub const DEFAULT_AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_STORAGE_NAMESPACE: &str = "spotify_pkce_auth";

/// Scopes requested when none are configured explicitly.
///
/// Covers the dashboard's needs: profile, Web Playback SDK streaming, playback control, library
/// and playlist access and the recently played list.
pub const DEFAULT_SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "streaming",
    "user-read-playback-state",
    "user-modify-playback-state",
    "playlist-read-private",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-library-read",
    "user-read-currently-playing",
    "user-read-recently-played",
];

#[derive(Debug, Snafu)]
pub enum EnvConfigError {
    #[snafu(display("EnvConfigError: Environment variable '{name}' is not set"))]
    Missing { name: &'static str },

    #[snafu(display("EnvConfigError: Environment variable '{name}' is not a valid URL"))]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
}

/// The single configuration point of the auth flow.
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// The client id of your app, as shown in the Spotify developer dashboard.
    pub client_id: String,

    /// Url Spotify redirects back to after the user granted (or denied) access.
    /// Must exactly match one of the redirect URIs registered for the app.
    pub redirect_uri: Url,

    /// Scopes requested on login. Defaults to [`DEFAULT_SCOPES`].
    pub scopes: Vec<String>,

    /// Prefix of all storage keys written by this crate.
    pub storage_namespace: String,

    pub advanced: AdvancedOptions,
}

impl AuthOptions {
    pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri,
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_owned()).collect(),
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_owned(),
            advanced: AdvancedOptions::default(),
        }
    }

    /// Read options from the environment.
    ///
    /// `SPOTIFY_CLIENT_ID` and `SPOTIFY_REDIRECT_URI` are required. `SPOTIFY_SCOPES` (space
    /// separated) and `SPOTIFY_STORAGE_NAMESPACE` override their defaults when set and non-empty.
    pub fn from_env() -> Result<Self, EnvConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EnvConfigError> {
        let client_id = lookup("SPOTIFY_CLIENT_ID").context(MissingSnafu {
            name: "SPOTIFY_CLIENT_ID",
        })?;
        let redirect_uri = lookup("SPOTIFY_REDIRECT_URI").context(MissingSnafu {
            name: "SPOTIFY_REDIRECT_URI",
        })?;
        let redirect_uri = Url::parse(&redirect_uri).context(InvalidUrlSnafu {
            name: "SPOTIFY_REDIRECT_URI",
        })?;

        let mut options = Self::new(client_id, redirect_uri);
        if let Some(scopes) = lookup("SPOTIFY_SCOPES").filter(|s| !s.trim().is_empty()) {
            options.scopes = scopes.split_whitespace().map(ToOwned::to_owned).collect();
        }
        if let Some(namespace) = lookup("SPOTIFY_STORAGE_NAMESPACE").filter(|s| !s.is_empty()) {
            options.storage_namespace = namespace;
        }
        Ok(options)
    }

    pub fn with_scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }

    pub fn with_advanced(mut self, advanced: AdvancedOptions) -> Self {
        self.advanced = advanced;
        self
    }

    /// Derive a redirect URI from the page the app is served on: `<origin><path>/callback`.
    ///
    /// Query and fragment of `page` are dropped. The result still has to be registered in the
    /// Spotify developer dashboard.
    pub fn redirect_uri_for(page: &Url) -> Url {
        let mut url = page.clone();
        url.set_query(None);
        url.set_fragment(None);
        let path = format!("{}/callback", page.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    /// Check the preconditions of a login attempt.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return ConfigurationSnafu {
                reason: "client_id must not be empty",
            }
            .fail();
        }
        if !matches!(self.redirect_uri.scheme(), "http" | "https") {
            return ConfigurationSnafu {
                reason: format!(
                    "redirect_uri must be an http(s) URL, got '{}'",
                    self.redirect_uri
                ),
            }
            .fail();
        }
        let length = self.advanced.code_verifier_length;
        if !(MIN_CODE_VERIFIER_LENGTH..=MAX_CODE_VERIFIER_LENGTH).contains(&length) {
            return ConfigurationSnafu {
                reason: format!(
                    "code_verifier_length must be within {MIN_CODE_VERIFIER_LENGTH}..={MAX_CODE_VERIFIER_LENGTH}, got {length}"
                ),
            }
            .fail();
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AdvancedOptions {
    /// Where the user is sent to log in.
    /// Defaults to `https://accounts.spotify.com/authorize`.
    pub authorize_endpoint: AuthorizationEndpoint,

    /// Where codes and refresh tokens are exchanged.
    /// Defaults to `https://accounts.spotify.com/api/token`.
    pub token_endpoint: TokenEndpoint,

    /// How long before its hard expiry an access token already counts as expired.
    /// Defaults to `Duration::from_secs(60)`.
    pub expiry_margin: Duration,

    /// Length of generated code verifiers. Must be within 43..=128.
    /// Defaults to 64.
    pub code_verifier_length: usize,

    /// Permit a time-seeded, non-cryptographic fallback when no secure random source exists.
    /// Only meant for development on exotic targets. Defaults to `false`.
    pub allow_insecure_rng: bool,

    /// Force one token refresh and retry when a resource server answers 401 Unauthorized
    /// although the local token looked fresh (e.g. it was revoked). Defaults to `false`.
    pub refresh_on_unauthorized: bool,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            authorize_endpoint: parse_static(DEFAULT_AUTHORIZE_ENDPOINT),
            token_endpoint: parse_static(DEFAULT_TOKEN_ENDPOINT),
            expiry_margin: Duration::from_secs(60),
            code_verifier_length: DEFAULT_CODE_VERIFIER_LENGTH,
            allow_insecure_rng: false,
            refresh_on_unauthorized: false,
        }
    }
}

fn parse_static(url: &'static str) -> Url {
    Url::parse(url).expect("static endpoint URL to be valid")
}
