#![allow(dead_code)]

use std::sync::Arc;

use spotify_pkce_auth::url::Url;
use spotify_pkce_auth::{
    AdvancedOptions, AuthOptions, KeyValueStore, MemoryNavigator, MemoryStorage, SpotifyAuth,
    TokenRecord,
};

pub mod tracing {
    use tracing_subscriber::fmt;

    pub fn init_subscriber() {
        // Multiple tests in one binary race to install the global subscriber. Only the first wins.
        let _ = fmt()
            .with_max_level(::tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    }
}

pub const APP_URL: &str = "http://127.0.0.1:3000/";
pub const REDIRECT_URI: &str = "http://127.0.0.1:3000/callback";
pub const TOKEN_KEY: &str = "spotify_pkce_auth__token";
pub const CODE_VERIFIER_KEY: &str = "spotify_pkce_auth__code_verifier";
pub const STATE_KEY: &str = "spotify_pkce_auth__state";

/// Everything a test needs to drive and inspect one [`SpotifyAuth`] instance.
pub struct Harness {
    pub auth: SpotifyAuth,
    pub navigator: Arc<MemoryNavigator>,
    pub durable: MemoryStorage,
    pub session: MemoryStorage,
}

pub fn options(spotify: &Url) -> AuthOptions {
    AuthOptions::new("test-client", Url::parse(REDIRECT_URI).expect("valid url")).with_advanced(
        AdvancedOptions {
            authorize_endpoint: spotify.join("authorize").expect("valid url"),
            token_endpoint: spotify.join("api/token").expect("valid url"),
            ..AdvancedOptions::default()
        },
    )
}

pub fn harness(options: AuthOptions) -> Harness {
    harness_with_storage(options, MemoryStorage::new())
}

pub fn harness_with_storage(options: AuthOptions, durable: MemoryStorage) -> Harness {
    let navigator = Arc::new(MemoryNavigator::new(
        Url::parse(APP_URL).expect("valid url"),
    ));
    let session = MemoryStorage::new();
    let auth = SpotifyAuth::builder(options, navigator.clone())
        .durable_storage(Arc::new(durable.clone()))
        .session_storage(Arc::new(session.clone()))
        .build();
    Harness {
        auth,
        navigator,
        durable,
        session,
    }
}

/// Store a token record as a previous app run would have left it.
pub fn store_token(
    durable: &MemoryStorage,
    access_token: &str,
    refresh_token: Option<&str>,
    age: time::Duration,
) {
    store_record(
        durable,
        &TokenRecord {
            access_token: access_token.to_owned(),
            token_type: "Bearer".to_owned(),
            expires_in: 3600,
            refresh_token: refresh_token.map(ToOwned::to_owned),
            scope: Some("user-read-email".to_owned()),
            obtained_at: time::OffsetDateTime::now_utc() - age,
        },
    );
}

pub fn store_record(durable: &MemoryStorage, record: &TokenRecord) {
    durable
        .set(
            TOKEN_KEY,
            &serde_json::to_string(record).expect("serializable"),
        )
        .expect("memory storage");
}

pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
