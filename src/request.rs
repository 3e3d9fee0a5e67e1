use std::fmt::Debug;

use async_trait::async_trait;
use http::StatusCode;
use snafu::{ResultExt, Snafu};

use crate::code_verifier::CodeVerifier;
use crate::error::{
    AuthError, RequestSnafu, TokenExchangeFailedSnafu, TokenRefreshFailedSnafu,
};
use crate::response::{ErrorResponse, SuccessTokenResponse};
use crate::{AuthorizationCode, TokenEndpoint};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RequestError {
    #[snafu(display("RequestError: Could not send request"))]
    Send { source: reqwest::Error },

    #[snafu(display("RequestError: Could not decode payload"))]
    Decode { source: serde_json::Error },

    #[snafu(display("RequestError: Could not build header value"))]
    InvalidHeader {
        source: http::header::InvalidHeaderValue,
    },
}

/// Talks to the token endpoint.
///
/// [`HttpTokenExchanger`] is the real implementation. Hosts may provide their own, e.g. to route
/// token requests through a proxy or to stub the authorization server in tests.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait TokenExchanger: Debug + Send + Sync {
    /// Trade an authorization code for tokens (`grant_type=authorization_code`).
    ///
    /// `redirect_uri` must be the exact value sent in the authorize request.
    async fn exchange_code(
        &self,
        code: &AuthorizationCode,
        code_verifier: &CodeVerifier,
        client_id: &str,
        redirect_uri: &url::Url,
    ) -> Result<SuccessTokenResponse, AuthError>;

    /// Obtain a new access token (`grant_type=refresh_token`).
    async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<SuccessTokenResponse, AuthError>;
}

#[derive(Debug, Clone, Copy)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

/// [`TokenExchanger`] posting `application/x-www-form-urlencoded` requests with `reqwest`.
///
/// Public client: no client secret is ever sent, PKCE proves possession instead.
#[derive(Debug, Clone)]
pub struct HttpTokenExchanger {
    client: reqwest::Client,
    token_endpoint: TokenEndpoint,
}

impl HttpTokenExchanger {
    pub fn new(token_endpoint: TokenEndpoint) -> Self {
        Self::with_client(reqwest::Client::new(), token_endpoint)
    }

    /// Use a preconfigured client, e.g. one with custom timeouts.
    pub fn with_client(client: reqwest::Client, token_endpoint: TokenEndpoint) -> Self {
        Self {
            client,
            token_endpoint,
        }
    }

    pub fn token_endpoint(&self) -> &TokenEndpoint {
        &self.token_endpoint
    }

    async fn post_form(
        &self,
        grant: Grant,
        params: &[(&str, &str)],
    ) -> Result<SuccessTokenResponse, AuthError> {
        let response = self
            .client
            .post(self.token_endpoint.clone())
            .form(params)
            .send()
            .await
            .context(SendSnafu {})
            .context(RequestSnafu {})?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context(SendSnafu {})
            .context(RequestSnafu {})?;

        if !status.is_success() {
            return Err(token_endpoint_failure(grant, status, body));
        }

        serde_json::from_str::<SuccessTokenResponse>(&body)
            .context(DecodeSnafu {})
            .context(RequestSnafu {})
    }
}

fn token_endpoint_failure(grant: Grant, status: StatusCode, body: String) -> AuthError {
    // Spotify answers with an RFC 6749 error document for most failures. Anything else (e.g. an
    // HTML error page from a proxy) is only kept verbatim.
    let error_response = serde_json::from_str::<ErrorResponse>(&body).ok();
    match grant {
        Grant::AuthorizationCode => TokenExchangeFailedSnafu {
            status,
            body,
            error_response,
        }
        .build(),
        Grant::RefreshToken => TokenRefreshFailedSnafu {
            status,
            body,
            error_response,
        }
        .build(),
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange_code(
        &self,
        code: &AuthorizationCode,
        code_verifier: &CodeVerifier,
        client_id: &str,
        redirect_uri: &url::Url,
    ) -> Result<SuccessTokenResponse, AuthError> {
        tracing::trace!(token_endpoint = %self.token_endpoint, "Exchanging authorization code.");
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", client_id),
            ("code_verifier", code_verifier.code_verifier()),
        ];
        self.post_form(Grant::AuthorizationCode, &params).await
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<SuccessTokenResponse, AuthError> {
        tracing::trace!(token_endpoint = %self.token_endpoint, "Refreshing access token.");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];
        self.post_form(Grant::RefreshToken, &params).await
    }
}
