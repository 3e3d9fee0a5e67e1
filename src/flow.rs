use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::authenticated_client::AuthenticatedClient;
use crate::config::AuthOptions;
use crate::error::{AuthError, MissingVerifierSnafu, OAuthSnafu, StateMismatchSnafu};
use crate::internal::code_verifier_manager::CodeVerifierManager;
use crate::internal::csrf_token_manager::CsrfTokenManager;
use crate::internal::token_manager::TokenManager;
use crate::internal::token_store::TokenStore;
use crate::login::{create_login_url, join_scopes};
use crate::navigator::{Navigator, without_query};
use crate::request::{HttpTokenExchanger, TokenExchanger};
use crate::response::{AuthorizedResponse, CallbackResponse, DeniedResponse};
use crate::state::{AuthFailure, AuthState};
use crate::storage::{KeyValueStore, MemoryStorage};
use crate::token::TokenRecord;

/// The auth session of the app: login, redirect callback handling and logout.
///
/// Create one instance at application start and hand clones to whoever needs it. Cloning is
/// cheap, all clones share the same state.
#[derive(Clone)]
pub struct SpotifyAuth {
    inner: Arc<Inner>,
}

struct Inner {
    options: AuthOptions,
    navigator: Arc<dyn Navigator>,
    token_manager: TokenManager,
    code_verifier_manager: CodeVerifierManager,
    csrf_token_manager: CsrfTokenManager,
    state: Mutex<AuthState>,
}

impl Debug for SpotifyAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyAuth")
            .field("options", &self.inner.options)
            .field("navigator", &self.inner.navigator)
            .field("token_manager", &self.inner.token_manager)
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}

/// Collects the collaborators of a [`SpotifyAuth`].
///
/// Durable and session storage default to fresh [`MemoryStorage`] instances. The token exchanger
/// defaults to an [`HttpTokenExchanger`] for the configured token endpoint.
pub struct SpotifyAuthBuilder {
    options: AuthOptions,
    navigator: Arc<dyn Navigator>,
    durable_storage: Option<Arc<dyn KeyValueStore>>,
    session_storage: Option<Arc<dyn KeyValueStore>>,
    token_exchanger: Option<Arc<dyn TokenExchanger>>,
}

impl SpotifyAuthBuilder {
    /// Storage surviving app restarts, holding the token record (think `localStorage`).
    pub fn durable_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.durable_storage = Some(storage);
        self
    }

    /// Storage scoped to the browser tab, holding the in-flight verifier and state
    /// (think `sessionStorage`).
    pub fn session_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.session_storage = Some(storage);
        self
    }

    pub fn token_exchanger(mut self, exchanger: Arc<dyn TokenExchanger>) -> Self {
        self.token_exchanger = Some(exchanger);
        self
    }

    pub fn build(self) -> SpotifyAuth {
        let SpotifyAuthBuilder {
            options,
            navigator,
            durable_storage,
            session_storage,
            token_exchanger,
        } = self;

        let durable_storage =
            durable_storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let session_storage =
            session_storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let token_exchanger = token_exchanger.unwrap_or_else(|| {
            Arc::new(HttpTokenExchanger::new(
                options.advanced.token_endpoint.clone(),
            ))
        });

        let namespace = options.storage_namespace.as_str();
        let token_store = TokenStore::new(
            durable_storage,
            namespace,
            options.advanced.expiry_margin,
        );
        let token_manager =
            TokenManager::new(token_store, token_exchanger, options.client_id.clone());
        let code_verifier_manager = CodeVerifierManager::new(
            session_storage.clone(),
            namespace,
            options.advanced.code_verifier_length,
            options.advanced.allow_insecure_rng,
        );
        let csrf_token_manager = CsrfTokenManager::new(
            session_storage,
            namespace,
            options.advanced.allow_insecure_rng,
        );

        let auth = SpotifyAuth {
            inner: Arc::new(Inner {
                options,
                navigator,
                token_manager,
                code_verifier_manager,
                csrf_token_manager,
                state: Mutex::new(AuthState::Anonymous),
            }),
        };
        auth.restore();
        auth
    }
}

impl SpotifyAuth {
    pub fn builder(options: AuthOptions, navigator: Arc<dyn Navigator>) -> SpotifyAuthBuilder {
        SpotifyAuthBuilder {
            options,
            navigator,
            durable_storage: None,
            session_storage: None,
            token_exchanger: None,
        }
    }

    pub fn options(&self) -> &AuthOptions {
        &self.inner.options
    }

    /// Direct access to the persisted token record.
    pub fn token_store(&self) -> &TokenStore {
        self.inner.token_manager.store()
    }

    pub(crate) fn token_manager(&self) -> &TokenManager {
        &self.inner.token_manager
    }

    /// Re-derive the state from the current URL and storage, as done on startup.
    ///
    /// Pending callback parameters win over a stored token. Otherwise a stored token (even an
    /// expired but refreshable one) means the user stays signed in.
    pub fn restore(&self) -> AuthState {
        let state = if self.is_redirect_callback() {
            AuthState::CallbackPending
        } else if self.token_store().load().is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        };
        tracing::trace!(?state, "Restored auth state.");
        self.set_state(state.clone());
        state
    }

    pub fn state(&self) -> AuthState {
        let mut state = self.lock_state();
        // The token may have been dropped by the request gateway after a rejected refresh.
        if *state == AuthState::Authenticated && self.token_store().load().is_none() {
            *state = AuthState::Anonymous;
        }
        state.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// The stored token record, possibly expired.
    pub fn token(&self) -> Option<TokenRecord> {
        self.token_store().load()
    }

    /// Start a login with the configured scopes.
    ///
    /// Stores a fresh code verifier and state in session storage and navigates to the authorize
    /// URL, which is also returned. Fails with [`AuthError::Configuration`] or
    /// [`AuthError::CryptoUnavailable`] before anything is stored or navigated.
    pub fn login(&self) -> Result<Url, AuthError> {
        self.login_with_scopes(self.inner.options.scopes.as_slice())
    }

    pub fn login_with_scopes<S: AsRef<str>>(&self, scopes: &[S]) -> Result<Url, AuthError> {
        let login_url = self.prepare_login(scopes)?;
        self.set_state(AuthState::LoginPending);
        tracing::trace!("Navigating to the authorization server.");
        self.inner.navigator.assign(&login_url);
        Ok(login_url)
    }

    /// Like [`Self::login`] but without navigating, for hosts rendering a plain link.
    pub fn login_url(&self) -> Result<Url, AuthError> {
        self.prepare_login(self.inner.options.scopes.as_slice())
    }

    fn prepare_login<S: AsRef<str>>(&self, scopes: &[S]) -> Result<Url, AuthError> {
        let options = &self.inner.options;
        options.validate()?;

        let code_verifier = self.inner.code_verifier_manager.regenerate()?;
        let state = match self.inner.csrf_token_manager.regenerate() {
            Ok(state) => state,
            Err(err) => {
                self.inner.code_verifier_manager.forget();
                return Err(err);
            }
        };

        Ok(create_login_url(
            options.advanced.authorize_endpoint.clone(),
            &code_verifier.to_code_challenge(),
            &state,
            &options.client_id,
            &options.redirect_uri,
            &join_scopes(scopes),
        ))
    }

    /// Whether the current URL carries a `code` or `error` parameter.
    pub fn is_redirect_callback(&self) -> bool {
        CallbackResponse::is_callback(&self.inner.navigator.current_url())
    }

    /// Process the redirect back from the authorization server.
    ///
    /// Returns `Ok(None)` when the current URL carries no callback parameters, so calling this on
    /// every page load is fine. On success the token is stored, the callback parameters are
    /// removed from the URL and the state becomes [`AuthState::Authenticated`].
    ///
    /// Every error is recorded as [`AuthState::Error`] and returned.
    pub async fn handle_callback(&self) -> Result<Option<TokenRecord>, AuthError> {
        let current_url = self.inner.navigator.current_url();
        let Some(response) = CallbackResponse::from_url(&current_url) else {
            tracing::trace!("No callback parameters present. Nothing to handle.");
            return Ok(None);
        };
        self.set_state(AuthState::CallbackPending);

        match response {
            CallbackResponse::Denied(DeniedResponse {
                error,
                error_description,
            }) => {
                tracing::warn!(%error, ?error_description, "Login was denied.");
                self.forget_login_artifacts();
                self.strip_callback_params(&current_url);
                self.fail(
                    OAuthSnafu {
                        error,
                        description: error_description,
                    }
                    .build(),
                )
            }
            CallbackResponse::Authorized(AuthorizedResponse { code, state }) => {
                let csrf_token_manager = &self.inner.csrf_token_manager;
                if !csrf_token_manager.validate_state(state.as_deref()) {
                    self.forget_login_artifacts();
                    return self.fail(StateMismatchSnafu {}.build());
                }
                csrf_token_manager.forget();

                let Some(code_verifier) = self.inner.code_verifier_manager.take() else {
                    tracing::warn!("No code verifier stored. Cannot exchange the code.");
                    return self.fail(MissingVerifierSnafu {}.build());
                };

                match self
                    .inner
                    .token_manager
                    .exchange_code(&code, &code_verifier, &self.inner.options.redirect_uri)
                    .await
                {
                    Ok(token) => {
                        self.strip_callback_params(&current_url);
                        self.set_state(AuthState::Authenticated);
                        tracing::trace!("Login completed.");
                        Ok(Some(token))
                    }
                    Err(err) => {
                        tracing::error!(?err, "Could not exchange authorization code for a token.");
                        self.fail(err)
                    }
                }
            }
        }
    }

    /// Forget all token data and any login in flight.
    pub fn logout(&self) {
        tracing::trace!("Logging out.");
        self.inner.token_manager.forget();
        self.forget_login_artifacts();
        self.set_state(AuthState::Anonymous);
    }

    /// A gateway for resource requests using a default `reqwest::Client`.
    pub fn client(&self) -> AuthenticatedClient {
        self.client_from(reqwest::Client::new())
    }

    /// A gateway for resource requests using a preconfigured `reqwest::Client`.
    pub fn client_from(&self, client: reqwest::Client) -> AuthenticatedClient {
        AuthenticatedClient::new(client, self.clone())
    }

    fn forget_login_artifacts(&self) {
        self.inner.code_verifier_manager.forget();
        self.inner.csrf_token_manager.forget();
    }

    fn strip_callback_params(&self, current_url: &Url) {
        self.inner.navigator.replace(&without_query(current_url));
    }

    fn fail<T>(&self, err: AuthError) -> Result<T, AuthError> {
        self.set_state(AuthState::Error(AuthFailure::from(&err)));
        Err(err)
    }

    fn set_state(&self, state: AuthState) {
        *self.lock_state() = state;
    }

    fn lock_state(&self) -> MutexGuard<'_, AuthState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
