use serde::{Deserialize, Serialize};
use url::Url;

/// The authorization server's answer, as found in the query of the redirect back to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallbackResponse {
    Authorized(AuthorizedResponse),
    Denied(DeniedResponse),
}

/// `?code=...&state=...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthorizedResponse {
    pub code: String,

    /// Should contain the csrf token that we sent as part of the authorize request.
    pub state: Option<String>,
}

/// `?error=...`. See RFC 6749 section 4.1.2.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeniedResponse {
    pub error: String,
    pub error_description: Option<String>,
}

impl CallbackResponse {
    /// Whether `url` looks like a redirect back from the authorization server.
    pub(crate) fn is_callback(url: &Url) -> bool {
        url.query_pairs()
            .any(|(key, _)| key == "code" || key == "error")
    }

    /// Parse the callback parameters out of `url`.
    ///
    /// An `error` parameter takes precedence over a `code` parameter. Returns `None` when neither
    /// is present, which is the expected case for every regular page load.
    pub(crate) fn from_url(url: &Url) -> Option<Self> {
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        if let Some(error) = param("error") {
            return Some(CallbackResponse::Denied(DeniedResponse {
                error,
                error_description: param("error_description"),
            }));
        }

        param("code").map(|code| {
            CallbackResponse::Authorized(AuthorizedResponse {
                code,
                state: param("state"),
            })
        })
    }
}

/// A successful token endpoint response. See RFC 6749 section 5.1.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SuccessTokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: i64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// See [RFC 6749 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6749#section-5.2) for details.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum KnownOAuthErrorCode {
    /// The request is missing a required parameter, includes an unsupported parameter value
    /// (other than grant type), repeats a parameter, includes multiple credentials,
    /// utilizes more than one mechanism for authenticating the client, or is otherwise malformed.
    #[serde(rename = "invalid_request")]
    InvalidRequest,

    /// Client authentication failed (e.g., unknown client, no client authentication included,
    /// or unsupported authentication method).
    #[serde(rename = "invalid_client")]
    InvalidClient,

    /// The provided authorization grant (e.g., authorization code, resource owner credentials) or
    /// refresh token is invalid, expired, revoked, does not match the redirection URI used in the
    /// authorization request, or was issued to another client.
    #[serde(rename = "invalid_grant")]
    InvalidGrant,

    /// The authenticated client is not authorized to use this authorization grant type.
    #[serde(rename = "unauthorized_client")]
    UnauthorizedClient,

    /// The authorization grant type is not supported by the authorization server.
    #[serde(rename = "unsupported_grant_type")]
    UnsupportedGrantType,

    /// The requested scope is invalid, unknown, malformed, or exceeds the scope granted by the
    /// resource owner.
    #[serde(rename = "invalid_scope")]
    InvalidScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OAuthErrorCode {
    Known(KnownOAuthErrorCode),
    Unknown(String),
}

/// OAuth error response received from the token endpoint.
///
/// See [RFC 6749 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6749#section-5.2) for details.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    /// The error code (e.g., `invalid_client` or `invalid_grant`).
    pub error: OAuthErrorCode,

    /// OPTIONAL. Human-readable ASCII text providing additional information.
    pub error_description: Option<String>,

    /// OPTIONAL. A URI identifying a human-readable web page with information about the error.
    pub error_uri: Option<String>,
}

impl ErrorResponse {
    pub fn is_invalid_grant(&self) -> bool {
        self.error == OAuthErrorCode::Known(KnownOAuthErrorCode::InvalidGrant)
    }
}
