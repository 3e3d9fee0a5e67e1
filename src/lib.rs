//! OAuth 2.0 Authorization Code + PKCE flow and token lifecycle management for
//! Spotify-backed dashboards.
//!
//! The crate owns everything between "the user clicked *Sign in*" and "this request carries a
//! valid bearer token":
//!
//! - [`SpotifyAuth`] drives login, the redirect callback and logout.
//! - [`AuthenticatedClient`] is the single gateway for resource requests. It refreshes expired
//!   tokens transparently and attaches the `Authorization` header.
//! - [`await_player_ready`] turns the Web Playback SDK's listener soup into one awaitable result.
//!
//! Browser facilities are injected through the [`KeyValueStore`] and [`Navigator`] traits, so the
//! same code runs in a wasm frontend, a desktop shell or a test.
//!
//! ```no_run
//! use std::sync::Arc;
//! use spotify_pkce_auth::{AuthOptions, MemoryNavigator, SpotifyAuth, url::Url};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let redirect_uri = Url::parse("http://127.0.0.1:3000/callback")?;
//! let options = AuthOptions::new("my-client-id", redirect_uri.clone());
//! let navigator = Arc::new(MemoryNavigator::new(redirect_uri));
//!
//! let auth = SpotifyAuth::builder(options, navigator).build();
//!
//! if auth.is_redirect_callback() {
//!     auth.handle_callback().await?;
//! }
//!
//! if auth.is_authenticated() {
//!     let me = auth.client().get("https://api.spotify.com/v1/me").await?;
//!     println!("{:?}", me.body());
//! } else {
//!     auth.login()?;
//! }
//! # Ok(())
//! # }
//! ```

mod authenticated_client;
mod code_verifier;
mod config;
mod csrf_token;
mod error;
mod flow;
mod internal;
mod login;
mod navigator;
mod player;
mod request;
mod response;
mod state;
mod storage;
mod time_ext;
mod token;

// Library exports.
pub use authenticated_client::*;
pub use code_verifier::{CodeChallenge, CodeChallengeMethod, CodeVerifier, Entropy};
pub use config::*;
pub use csrf_token::CsrfToken;
pub use error::AuthError;
pub use flow::*;
pub use internal::token_store::TokenStore;
pub use navigator::*;
pub use player::*;
pub use request::{HttpTokenExchanger, RequestError, TokenExchanger};
pub use response::{ErrorResponse, KnownOAuthErrorCode, OAuthErrorCode, SuccessTokenResponse};
pub use state::*;
pub use storage::*;
pub use token::*;

pub mod url {
    pub use url::Url;
}
pub mod reqwest {
    pub use reqwest::*;
}

type AuthorizationEndpoint = url::Url;
type TokenEndpoint = url::Url;

type AuthorizationCode = String;
type AccessToken = String;
type RefreshToken = String;
