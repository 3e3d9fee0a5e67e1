use futures::{Stream, StreamExt};

use crate::authenticated_client::AuthenticatedClient;

/// Events emitted by the Spotify Web Playback SDK, as forwarded by the host.
///
/// The host registers one listener per SDK event (`ready`, `not_ready`, `initialization_error`,
/// `authentication_error`, `account_error`) and pushes them into a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    InitializationError { message: String },
    AuthenticationError { message: String },
    AccountError { message: String },

    /// The SDK script could not be loaded at all.
    SdkUnavailable,
}

/// Outcome of connecting the Web Playback SDK player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerReadiness {
    Ready {
        device_id: String,
    },
    Failed {
        reason: String,

        /// In-browser playback needs a Spotify Premium account. When set, the UI should point
        /// the user towards upgrading instead of retrying.
        requires_upgrade: bool,
    },
}

impl PlayerReadiness {
    fn failed(reason: impl Into<String>, requires_upgrade: bool) -> Self {
        PlayerReadiness::Failed {
            reason: reason.into(),
            requires_upgrade,
        }
    }
}

fn message_or(message: String, fallback: &str) -> String {
    match message.trim().is_empty() {
        true => fallback.to_owned(),
        false => message,
    }
}

/// Wait for the first terminal player event.
///
/// Resolves exactly once: with `Ready` on the first `ready` event, or with `Failed` on the first
/// error event. `NotReady` events are logged and skipped. Events after the first terminal one are
/// never polled.
pub async fn await_player_ready(events: impl Stream<Item = PlayerEvent>) -> PlayerReadiness {
    let mut events = std::pin::pin!(events);

    while let Some(event) = events.next().await {
        match event {
            PlayerEvent::Ready { device_id } => {
                tracing::trace!(%device_id, "Player is ready.");
                return PlayerReadiness::Ready { device_id };
            }
            PlayerEvent::NotReady { device_id } => {
                tracing::warn!(%device_id, "Device has gone offline.");
            }
            PlayerEvent::InitializationError { message } => {
                tracing::error!(%message, "Player initialization failed.");
                let requires_upgrade = message.to_lowercase().contains("premium");
                return PlayerReadiness::failed(
                    message_or(message, "Initialization error"),
                    requires_upgrade,
                );
            }
            PlayerEvent::AuthenticationError { message } => {
                tracing::error!(%message, "Player authentication failed.");
                return PlayerReadiness::failed(message_or(message, "Authentication error"), false);
            }
            PlayerEvent::AccountError { message } => {
                tracing::error!(%message, "Player account check failed.");
                return PlayerReadiness::failed(message_or(message, "Account error"), true);
            }
            PlayerEvent::SdkUnavailable => {
                return PlayerReadiness::failed("Spotify Web Playback SDK failed to load", true);
            }
        }
    }

    PlayerReadiness::failed("player event stream ended", false)
}

/// Like [`await_player_ready`], but fails fast when no usable access token can be obtained.
///
/// Call this before connecting the player: the SDK asks for a token right away and would
/// otherwise only report a generic authentication error.
pub async fn await_authenticated_player_ready(
    client: &AuthenticatedClient,
    events: impl Stream<Item = PlayerEvent>,
) -> PlayerReadiness {
    if let Err(err) = client.access_token().await {
        tracing::debug!(?err, "No access token for the player.");
        return PlayerReadiness::failed("Not authenticated", false);
    }
    await_player_ready(events).await
}
