//! Request executor behaviour against a mock backend.

mod common;

use std::time::Duration;

use carbn_client::api::NoContent;
use carbn_client::error::ApiError;
use common::{Harness, auth_body, mount_refresh};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_bearer_token_attached() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    Mock::given(method("GET"))
        .and(path("/cars"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .expect(1)
        .mount(&h.server)
        .await;

    let cars: Vec<i32> = h.services.api.get("/cars").await.unwrap();
    assert_eq!(cars, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_expired_token_refreshes_before_sending() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");
    h.expire_token();

    mount_refresh(&h.server, "a2", "r2", 1).await;
    Mock::given(method("GET"))
        .and(path("/cars"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&h.server)
        .await;

    let cars: Vec<i32> = h.services.api.get("/cars").await.unwrap();
    assert!(cars.is_empty());
    assert_eq!(h.services.session.get_access_token().unwrap(), "a2");
    assert_eq!(h.services.session.get_refresh_token().unwrap(), "r2");
}

#[tokio::test]
async fn test_concurrent_expired_calls_share_one_refresh() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");
    h.expire_token();

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(auth_body("a2", "r2"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(3)
        .mount(&h.server)
        .await;

    let api = &h.services.api;
    let (a, b, c) = tokio::join!(
        api.get::<serde_json::Value>("/feed"),
        api.get::<serde_json::Value>("/cars"),
        api.get::<serde_json::Value>("/user/7/details"),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
}

#[tokio::test]
async fn test_late_401_reuses_rotated_token() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    mount_refresh(&h.server, "a2", "r2", 1).await;
    Mock::given(method("GET"))
        .and(path("/fast"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(2)
        .mount(&h.server)
        .await;

    let api = &h.services.api;
    let (fast, slow) = tokio::join!(api.get::<i32>("/fast"), api.get::<i32>("/slow"));
    assert_eq!(fast.unwrap(), 1);
    assert_eq!(slow.unwrap(), 1);
    assert_eq!(h.services.session.get_refresh_token().unwrap(), "r2");
}

#[tokio::test]
async fn test_waiter_gives_up_with_token_expired() {
    let h = Harness::with_refresh_wait(Duration::from_millis(50)).await;
    h.sign_in("a1", "r1");
    h.expire_token();

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(auth_body("a2", "r2"))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .mount(&h.server)
        .await;

    let api = &h.services.api;
    let (a, b) = tokio::join!(api.get::<i32>("/a"), api.get::<i32>("/b"));
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(ApiError::TokenExpired)))
            .count(),
        1
    );
    assert!(h.services.session.is_logged_in());
}

#[tokio::test]
async fn test_second_401_gives_up_and_logs_out() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    mount_refresh(&h.server, "a2", "r2", 1).await;
    Mock::given(method("GET"))
        .and(path("/cars"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&h.server)
        .await;

    let result = h.services.api.get::<Vec<i32>>("/cars").await;
    assert!(matches!(result, Err(ApiError::MaxRetriesExceeded)));
    assert!(!h.services.session.is_logged_in());
    assert!(!h.services.session.is_authenticated());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_fresh_token_rejected_does_not_refresh_again() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");
    h.expire_token();

    mount_refresh(&h.server, "a2", "r2", 1).await;
    Mock::given(method("GET"))
        .and(path("/cars"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.services.api.get::<Vec<i32>>("/cars").await;
    assert!(matches!(result, Err(ApiError::MaxRetriesExceeded)));
    assert!(!h.services.session.is_logged_in());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_refresh_rejection_is_terminal() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");
    h.expire_token();

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cars"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let result = h.services.api.get::<Vec<i32>>("/cars").await;
    assert!(matches!(result, Err(ApiError::MaxRetriesExceeded)));
    assert!(!h.services.session.is_authenticated());
    assert!(h.services.session.get_refresh_token().is_err());
}

#[tokio::test]
async fn test_business_error_after_refresh_passes_through() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    mount_refresh(&h.server, "a2", "r2", 1).await;
    Mock::given(method("GET"))
        .and(path("/trade/9"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/trade/9"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "not found" })))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h
        .services
        .api
        .get::<serde_json::Value>("/trade/9")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 404, .. }));
    assert!(err.is_business_error());
    assert!(h.services.session.is_logged_in());
    assert_eq!(h.services.session.get_access_token().unwrap(), "a2");
}

#[tokio::test]
async fn test_server_error_on_replay_logs_out() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    mount_refresh(&h.server, "a2", "r2", 1).await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.services.api.get::<serde_json::Value>("/feed").await;
    assert!(matches!(result, Err(ApiError::MaxRetriesExceeded)));
    assert!(!h.services.session.is_logged_in());
}

#[tokio::test]
async fn test_payment_required_carries_message() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    Mock::given(method("POST"))
        .and(path("/cars/scan"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "Not enough credits" })),
        )
        .mount(&h.server)
        .await;

    let err = h
        .services
        .api
        .post::<serde_json::Value, _>("/cars/scan", &json!({ "image": "x" }))
        .await
        .unwrap_err();
    match err {
        ApiError::PaymentRequired(message) => assert_eq!(message, "Not enough credits"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(h.services.session.is_logged_in());
}

#[tokio::test]
async fn test_server_error_keeps_body() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&h.server)
        .await;

    match h.services.api.get::<serde_json::Value>("/feed").await {
        Err(ApiError::Http { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(&body[..], b"boom");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(h.services.session.is_logged_in());
}

#[tokio::test]
async fn test_requests_rejected_while_logging_out() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");
    h.services.session.begin_logout();

    let result = h.services.api.get::<serde_json::Value>("/feed").await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
    assert_eq!(h.request_count().await, 0);
}

#[tokio::test]
async fn test_null_body_decodes_as_empty_list() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    Mock::given(method("GET"))
        .and(path("/friends"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&h.server)
        .await;

    let friends: Vec<serde_json::Value> = h.services.api.get("/friends").await.unwrap();
    assert!(friends.is_empty());
}

#[tokio::test]
async fn test_empty_body_only_for_no_content() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    Mock::given(method("POST"))
        .and(path("/friends/request/3"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.server)
        .await;

    let done: NoContent = h.services.api.post_empty("/friends/request/3").await.unwrap();
    assert_eq!(done, NoContent);

    let result = h.services.api.get::<serde_json::Value>("/empty").await;
    assert!(matches!(result, Err(ApiError::InvalidResponse)));
}

#[tokio::test]
async fn test_delete_with_body_sends_json() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    Mock::given(method("DELETE"))
        .and(path("/friends"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "friend_id": 4 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;

    let _: NoContent = h
        .services
        .api
        .delete_with_body("/friends", &json!({ "friend_id": 4 }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_token_forces_logout() {
    let h = Harness::start().await;
    let _ = h.services.images.set("https://cdn/x.jpg", &b"jpeg"[..]).await;
    assert_eq!(h.services.images.memory_len(), 1);

    let result = h.services.api.get::<serde_json::Value>("/feed").await;
    assert!(matches!(result, Err(ApiError::MaxRetriesExceeded)));
    assert_eq!(h.services.images.memory_len(), 0);
    assert!(!h.services.session.is_authenticated());
    assert_eq!(h.request_count().await, 0);
}

#[tokio::test]
async fn test_network_failure_surfaces() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    let config = {
        let mut c = (*h.services.config).clone();
        c.api.base_url = "http://127.0.0.1:9".to_string();
        c
    };
    let services = carbn_client::AppServices::with_store(
        &config,
        std::sync::Arc::new(h.store.clone()),
        h.clock.clone(),
    );

    let result = services.api.get::<serde_json::Value>("/feed").await;
    assert!(matches!(result, Err(ApiError::Network(_))));
    assert!(services.session.is_logged_in());
}

#[tokio::test]
async fn test_request_id_header_sent() {
    let h = Harness::start().await;
    h.sign_in("a1", "r1");

    Mock::given(method("GET"))
        .and(wiremock::matchers::header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(1)
        .mount(&h.server)
        .await;

    assert!(h.services.api.get::<bool>("/ping").await.unwrap());
}
