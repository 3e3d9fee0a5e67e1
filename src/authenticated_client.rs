use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use http::StatusCode;
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use crate::AccessToken;
use crate::error::{ApiSnafu, AuthError, RequestSnafu};
use crate::flow::SpotifyAuth;
use crate::request::{DecodeSnafu, InvalidHeaderSnafu, SendSnafu};
use crate::token::TokenRecord;

/// HTTP client with automatic access token injection and transparent token refresh.
///
/// This is the single gateway for requests against Spotify's Web API. It wraps a
/// `reqwest::Client` and provides GET, POST, PUT, PATCH and DELETE with these additions:
///
/// 1. **Fresh tokens**: Before sending, the stored token is checked. An expired access token is
///    refreshed first. Concurrent requests share a single refresh.
///
/// 2. **Token injection**: Requests carry `Authorization: Bearer <access_token>` and
///    `Content-Type: application/json`, unless the request builder already set them.
///
/// 3. **Uniform results**: Non-2xx answers become [`AuthError::Api`]. Successful answers are
///    decoded into an [`ApiResponse`], whose body is `None` for 204, empty or non-JSON payloads.
///
/// With [`crate::AdvancedOptions::refresh_on_unauthorized`] set, a 401 Unauthorized answer
/// triggers one forced refresh and one retry. This covers tokens revoked on Spotify's side
/// before their local expiry.
///
/// Create an instance using [`SpotifyAuth::client()`] or [`SpotifyAuth::client_from()`].
///
/// # Example
/// ```no_run
/// # use spotify_pkce_auth::SpotifyAuth;
/// # async fn example(auth: SpotifyAuth) -> Result<(), Box<dyn std::error::Error>> {
/// let client = auth.client();
/// let response = client
///     .put_with("https://api.spotify.com/v1/me/player/volume", |builder| {
///         builder.query(&[("volume_percent", "40")])
///     })
///     .await?;
/// assert!(response.body().is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    client: reqwest::Client,
    auth: SpotifyAuth,
}

/// A successful (2xx) resource server answer.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    text: String,
    body: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The decoded JSON body. `None` for 204 No Content, empty and non-JSON bodies.
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<serde_json::Value> {
        self.body
    }

    /// The raw body as received.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decode the JSON body into `T`. `Ok(None)` when there is no JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<Option<T>, AuthError> {
        self.body
            .clone()
            .map(serde_json::from_value::<T>)
            .transpose()
            .context(DecodeSnafu {})
            .context(RequestSnafu {})
    }
}

impl AuthenticatedClient {
    pub(crate) fn new(client: reqwest::Client, auth: SpotifyAuth) -> Self {
        Self { client, auth }
    }

    /// A non-expired access token, refreshing the stored one if necessary.
    ///
    /// For collaborators that need the raw token, e.g. the Web Playback SDK's `getOAuthToken`
    /// callback. Prefer the request methods for anything else.
    pub async fn access_token(&self) -> Result<AccessToken, AuthError> {
        Ok(self.auth.token_manager().fresh_token().await?.access_token)
    }

    fn create_request(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
        with: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
        token: &TokenRecord,
    ) -> Result<reqwest::Request, AuthError> {
        let mut req_builder = self.client.request(method, url);

        // Let the user build the request.
        req_builder = with(req_builder);

        let mut request = req_builder
            .build()
            .context(SendSnafu {})
            .context(RequestSnafu {})?;

        let headers = request.headers_mut();
        if !headers.contains_key(AUTHORIZATION) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
                .context(InvalidHeaderSnafu {})
                .context(RequestSnafu {})?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(request)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, AuthError> {
        self.client
            .execute(request)
            .await
            .context(SendSnafu {})
            .context(RequestSnafu {})
    }

    /// Perform a request with automatic token handling.
    ///
    /// # Parameters
    /// - `method`: The HTTP method.
    /// - `url`: The URL to send the request to.
    /// - `with`: Customizes the request, e.g. by adding a JSON body, query parameters or headers.
    ///
    /// # Errors
    /// - [`AuthError::NotAuthenticated`] if no token is stored, or it expired without a refresh
    ///   token.
    /// - [`AuthError::TokenRefreshFailed`] if a required refresh was rejected.
    /// - [`AuthError::Api`] for non-2xx answers.
    /// - [`AuthError::Request`] for transport failures.
    pub async fn fetch(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl + Clone,
        with: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Clone,
    ) -> Result<ApiResponse, AuthError> {
        let token_manager = self.auth.token_manager();
        let token = token_manager.fresh_token().await?;

        let req = self.create_request(method.clone(), url.clone(), with.clone(), &token)?;
        let resp = self.execute(req).await?;

        if resp.status() == StatusCode::UNAUTHORIZED
            && self.auth.options().advanced.refresh_on_unauthorized
        {
            // A 401 despite a non-expired token: revoked on Spotify's side or the user removed
            // the app's access. We refresh and retry once.
            tracing::debug!("Received 401 with a fresh looking token. Refreshing and retrying.");
            let refreshed = token_manager.refresh(&token).await?;
            let req2 = self.create_request(method, url, with, &refreshed)?;
            let resp2 = self.execute(req2).await?;
            return into_api_response(resp2).await;
        }

        into_api_response(resp).await
    }

    pub async fn get(&self, url: impl reqwest::IntoUrl + Clone) -> Result<ApiResponse, AuthError> {
        self.get_with(url, |builder| builder).await
    }

    pub async fn get_with(
        &self,
        url: impl reqwest::IntoUrl + Clone,
        with: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Clone,
    ) -> Result<ApiResponse, AuthError> {
        self.fetch(reqwest::Method::GET, url, with).await
    }

    pub async fn post(&self, url: impl reqwest::IntoUrl + Clone) -> Result<ApiResponse, AuthError> {
        self.post_with(url, |builder| builder).await
    }

    pub async fn post_with(
        &self,
        url: impl reqwest::IntoUrl + Clone,
        with: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Clone,
    ) -> Result<ApiResponse, AuthError> {
        self.fetch(reqwest::Method::POST, url, with).await
    }

    pub async fn put(&self, url: impl reqwest::IntoUrl + Clone) -> Result<ApiResponse, AuthError> {
        self.put_with(url, |builder| builder).await
    }

    pub async fn put_with(
        &self,
        url: impl reqwest::IntoUrl + Clone,
        with: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Clone,
    ) -> Result<ApiResponse, AuthError> {
        self.fetch(reqwest::Method::PUT, url, with).await
    }

    pub async fn patch(
        &self,
        url: impl reqwest::IntoUrl + Clone,
    ) -> Result<ApiResponse, AuthError> {
        self.patch_with(url, |builder| builder).await
    }

    pub async fn patch_with(
        &self,
        url: impl reqwest::IntoUrl + Clone,
        with: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Clone,
    ) -> Result<ApiResponse, AuthError> {
        self.fetch(reqwest::Method::PATCH, url, with).await
    }

    pub async fn delete(
        &self,
        url: impl reqwest::IntoUrl + Clone,
    ) -> Result<ApiResponse, AuthError> {
        self.delete_with(url, |builder| builder).await
    }

    pub async fn delete_with(
        &self,
        url: impl reqwest::IntoUrl + Clone,
        with: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Clone,
    ) -> Result<ApiResponse, AuthError> {
        self.fetch(reqwest::Method::DELETE, url, with).await
    }
}

async fn into_api_response(response: reqwest::Response) -> Result<ApiResponse, AuthError> {
    let status = response.status();
    let headers = response.headers().clone();
    let text = response
        .text()
        .await
        .context(SendSnafu {})
        .context(RequestSnafu {})?;

    if !status.is_success() {
        return ApiSnafu { status, body: text }.fail();
    }

    let body = if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
        None
    } else {
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(?err, "Response body is not JSON.");
                None
            }
        }
    };

    Ok(ApiResponse {
        status,
        headers,
        text,
        body,
    })
}
