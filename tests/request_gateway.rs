use assertr::prelude::*;
use http::StatusCode;
use spotify_pkce_auth::{
    AuthError, AuthState, KeyValueStore, PlayerEvent, PlayerReadiness, TokenRecord,
};

mod common;
mod mock_spotify;

use mock_spotify::RefreshBehavior;

const TWO_HOURS: time::Duration = time::Duration::hours(2);

#[tokio::test]
async fn expired_token_is_refreshed_once_before_the_request() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    common::store_token(&h.durable, "AT-old", Some("RT-old"), TWO_HOURS);
    h.auth.restore();

    let me = h.auth.client().get(spotify.url.join("v1/me")?).await?;

    assert_that(me.status()).is_equal_to(StatusCode::OK);
    assert_that(spotify.state.refreshes()).is_equal_to(1);
    assert_that(spotify.state.api_requests()).is_equal_to(1);

    let stored = h.auth.token().expect("token persisted");
    assert_that(stored.access_token.as_str()).is_equal_to("AT1");
    assert_that(stored.refresh_token).is_equal_to(Some("RT-rotated-1".to_owned()));
    assert_that(h.auth.token_store().is_expired(&h.auth.token().expect("token"))).is_false();

    let refresh_form = &spotify.state.token_requests()[0];
    assert_that(refresh_form.get("grant_type").map(String::as_str))
        .is_equal_to(Some("refresh_token"));
    assert_that(refresh_form.get("refresh_token").map(String::as_str))
        .is_equal_to(Some("RT-old"));
    assert_that(refresh_form.get("client_id").map(String::as_str))
        .is_equal_to(Some("test-client"));
    Ok(())
}

#[tokio::test]
async fn refresh_without_new_refresh_token_keeps_the_old_one() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    spotify.state.set_refresh_behavior(RefreshBehavior::OmitRefreshToken);
    let h = common::harness(common::options(&spotify.url));
    common::store_token(&h.durable, "AT-old", Some("RT-old"), TWO_HOURS);

    h.auth.client().get(spotify.url.join("v1/me")?).await?;

    let stored = h.auth.token().expect("token persisted");
    assert_that(stored.access_token.as_str()).is_equal_to("AT1");
    assert_that(stored.refresh_token).is_equal_to(Some("RT-old".to_owned()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_requests_share_a_single_refresh() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    common::store_token(&h.durable, "AT-old", Some("RT-old"), TWO_HOURS);

    let me = spotify.url.join("v1/me")?;
    let tasks = (0..8)
        .map(|_| {
            let client = h.auth.client();
            let me = me.clone();
            tokio::spawn(async move { client.get(me).await })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        let response = task.await??;
        assert_that(response.status()).is_equal_to(StatusCode::OK);
    }
    assert_that(spotify.state.refreshes()).is_equal_to(1);
    assert_that(spotify.state.api_requests()).is_equal_to(8);
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_drops_the_token() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    spotify.state.set_refresh_behavior(RefreshBehavior::InvalidGrant);
    let h = common::harness(common::options(&spotify.url));
    common::store_token(&h.durable, "AT-old", Some("RT-old"), TWO_HOURS);
    h.auth.restore();
    assert_that(h.auth.state()).is_equal_to(AuthState::Authenticated);

    let client = h.auth.client();
    let first = client.get(spotify.url.join("v1/me")?).await;
    let err = first.expect_err("refresh to be rejected");
    assert_that(matches!(err, AuthError::TokenRefreshFailed { .. })).is_true();
    assert_that(err.is_invalid_grant()).is_true();

    // Every further call fails the same way until the user logs in again.
    let second = client.get(spotify.url.join("v1/me")?).await;
    assert_that(matches!(second, Err(AuthError::NotAuthenticated))).is_true();
    assert_that(h.auth.state()).is_equal_to(AuthState::Anonymous);
    assert_that(spotify.state.refreshes()).is_equal_to(1);
    assert_that(spotify.state.api_requests()).is_equal_to(0);
    Ok(())
}

#[tokio::test]
async fn logout_during_refresh_discards_the_refreshed_token() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    common::store_token(&h.durable, "AT-old", Some("RT-old"), TWO_HOURS);

    let client = h.auth.client();
    let me = spotify.url.join("v1/me")?;
    let request = tokio::spawn(async move { client.get(me).await });

    // The mock answers refreshes after 50ms.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    h.auth.logout();

    let result = request.await?;
    assert_that(matches!(result, Err(AuthError::NotAuthenticated))).is_true();
    assert_that(h.auth.token()).is_equal_to(None);
    assert_that(h.durable.get(common::TOKEN_KEY)?).is_equal_to(None);
    assert_that(h.auth.state()).is_equal_to(AuthState::Anonymous);
    assert_that(spotify.state.refreshes()).is_equal_to(1);
    assert_that(spotify.state.api_requests()).is_equal_to(0);
    Ok(())
}

#[tokio::test]
async fn unrepresentable_expiry_is_refreshed_instead_of_trusted() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    common::store_record(
        &h.durable,
        &TokenRecord {
            access_token: "AT-old".to_owned(),
            token_type: "Bearer".to_owned(),
            expires_in: i64::MAX,
            refresh_token: Some("RT-old".to_owned()),
            scope: None,
            obtained_at: time::OffsetDateTime::now_utc(),
        },
    );

    let me = h.auth.client().get(spotify.url.join("v1/me")?).await?;

    assert_that(me.status()).is_equal_to(StatusCode::OK);
    assert_that(spotify.state.refreshes()).is_equal_to(1);
    assert_that(h.auth.token().map(|token| token.expires_in)).is_equal_to(Some(3600));
    Ok(())
}

#[tokio::test]
async fn expired_token_without_refresh_token_is_not_authenticated() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    common::store_token(&h.durable, "AT-old", None, TWO_HOURS);

    let result = h.auth.client().get(spotify.url.join("v1/me")?).await;

    assert_that(matches!(result, Err(AuthError::NotAuthenticated))).is_true();
    assert_that(spotify.state.refreshes()).is_equal_to(0);
    assert_that(spotify.state.api_requests()).is_equal_to(0);
    Ok(())
}

#[tokio::test]
async fn no_content_and_non_json_bodies_are_empty() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    common::store_token(&h.durable, "AT-old", Some("RT-old"), TWO_HOURS);
    let client = h.auth.client();

    let volume = client
        .put_with(spotify.url.join("v1/me/player/volume")?, |builder| {
            builder.query(&[("volume_percent", "40")])
        })
        .await?;
    assert_that(volume.status()).is_equal_to(StatusCode::NO_CONTENT);
    assert_that(volume.body()).is_equal_to(None);

    let plain = client.get(spotify.url.join("v1/plain")?).await?;
    assert_that(plain.body()).is_equal_to(None);
    assert_that(plain.text()).is_equal_to("not json");
    Ok(())
}

#[tokio::test]
async fn error_status_is_returned_as_api_error() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    common::store_token(&h.durable, "AT-old", Some("RT-old"), TWO_HOURS);

    let result = h.auth.client().get(spotify.url.join("v1/missing")?).await;

    match result {
        Err(AuthError::Api { status, body }) => {
            assert_that(status).is_equal_to(StatusCode::NOT_FOUND);
            assert_that(body.contains("Not found")).is_true();
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn unauthorized_is_returned_as_is_by_default() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    // Not expired locally, but unknown to the server.
    common::store_token(&h.durable, "AT-revoked", Some("RT-old"), time::Duration::ZERO);

    let result = h.auth.client().get(spotify.url.join("v1/me")?).await;

    assert_that(matches!(
        result,
        Err(AuthError::Api { status, .. }) if status == StatusCode::UNAUTHORIZED
    ))
    .is_true();
    assert_that(spotify.state.refreshes()).is_equal_to(0);
    Ok(())
}

#[tokio::test]
async fn unauthorized_triggers_one_refresh_and_retry_when_enabled() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let mut options = common::options(&spotify.url);
    options.advanced.refresh_on_unauthorized = true;
    let h = common::harness(options);
    common::store_token(&h.durable, "AT-revoked", Some("RT-old"), time::Duration::ZERO);

    let me = h.auth.client().get(spotify.url.join("v1/me")?).await?;

    assert_that(me.body().and_then(|b| b["id"].as_str())).is_equal_to(Some("u1"));
    assert_that(spotify.state.refreshes()).is_equal_to(1);
    assert_that(spotify.state.api_requests()).is_equal_to(2);
    assert_that(h.auth.token().map(|t| t.access_token)).is_equal_to(Some("AT1".to_owned()));
    Ok(())
}

#[tokio::test]
async fn caller_supplied_authorization_header_is_kept() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));

    // Obtain a valid token through a refresh, then send it explicitly.
    common::store_token(&h.durable, "AT-old", Some("RT-old"), TWO_HOURS);
    let valid = h.auth.client().access_token().await?;
    common::store_token(&h.durable, "AT-revoked", Some("RT-old"), time::Duration::ZERO);

    let me = h
        .auth
        .client()
        .get_with(spotify.url.join("v1/me")?, move |builder| {
            builder.bearer_auth(valid.clone())
        })
        .await?;
    assert_that(me.status()).is_equal_to(StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn player_readiness_requires_a_token() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let spotify = mock_spotify::start().await;
    let h = common::harness(common::options(&spotify.url));
    let events = futures::stream::iter([PlayerEvent::Ready {
        device_id: "dash".to_owned(),
    }]);

    let readiness =
        spotify_pkce_auth::await_authenticated_player_ready(&h.auth.client(), events).await;
    assert_that(readiness).is_equal_to(PlayerReadiness::Failed {
        reason: "Not authenticated".to_owned(),
        requires_upgrade: false,
    });

    common::store_token(&h.durable, "AT-old", Some("RT-old"), time::Duration::ZERO);
    let events = futures::stream::iter([PlayerEvent::Ready {
        device_id: "dash".to_owned(),
    }]);
    let readiness =
        spotify_pkce_auth::await_authenticated_player_ready(&h.auth.client(), events).await;
    assert_that(readiness).is_equal_to(PlayerReadiness::Ready {
        device_id: "dash".to_owned(),
    });
    Ok(())
}
