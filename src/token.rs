use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::response::SuccessTokenResponse;
use crate::time_ext::TimeDurationExt;
use crate::{AccessToken, RefreshToken};

/// Tokens are considered stale this long before they actually expire, accounting for clock skew
/// and network latency.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(60);

/// The persisted result of a successful code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenRecord {
    /// Access token. Allows access to resources requiring authentication unless expired.
    pub access_token: AccessToken,

    /// Always "Bearer" for Spotify.
    pub token_type: String,

    /// Lifetime of the `access_token` in seconds, counted from `obtained_at`.
    pub expires_in: i64,

    /// Refresh token. May be used to obtain a new access token without user intervention.
    /// Spotify may or may not rotate it on refresh.
    pub refresh_token: Option<RefreshToken>,

    /// Space separated list of granted scopes.
    pub scope: Option<String>,

    /// Point in time this token data was received.
    #[serde(with = "time::serde::rfc3339")]
    pub obtained_at: OffsetDateTime,
}

impl TokenRecord {
    /// The hard expiry: `obtained_at + expires_in`.
    ///
    /// `None` if that point in time is not representable, e.g. for an absurd `expires_in`.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.obtained_at.checked_add(Duration::seconds(self.expires_in))
    }

    /// Whether the token must be treated as stale at `now`, i.e. whether `now` lies past
    /// `expires_at - margin`.
    ///
    /// A token whose expiry (or expiry minus margin) is not representable counts as expired, so
    /// it gets refreshed or dropped instead of being trusted forever.
    pub fn is_expired_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
        match self
            .expires_at()
            .and_then(|expires_at| expires_at.checked_sub(margin))
        {
            Some(stale_at) => now > stale_at,
            None => true,
        }
    }

    /// [`Self::is_expired_at`] for the current time and the default 60 second margin.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc(), DEFAULT_EXPIRY_MARGIN)
    }

    /// Time until the hard expiry. Zero once expired.
    pub fn time_left(&self) -> std::time::Duration {
        self.expires_at()
            .map(|expires_at| (expires_at - OffsetDateTime::now_utc()).to_std_duration())
            .unwrap_or_default()
    }

    /// Servers may omit `refresh_token` in refresh responses. The previous one stays valid then.
    pub(crate) fn keeping_refresh_token_of(mut self, previous: &TokenRecord) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token.clone_from(&previous.refresh_token);
        }
        self
    }
}

impl From<SuccessTokenResponse> for TokenRecord {
    fn from(value: SuccessTokenResponse) -> Self {
        Self {
            access_token: value.access_token,
            token_type: value.token_type.unwrap_or_else(|| "Bearer".to_owned()),
            expires_in: value.expires_in,
            refresh_token: value.refresh_token,
            scope: value.scope,
            obtained_at: OffsetDateTime::now_utc(),
        }
    }
}
