// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests driving the axum router in process.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use urlencoding::encode;

use homepoll::server::{AppState, StaticSessions, build_router};
use homepoll::types::UserId;
use homepoll::{DeviceSync, SyncConfig};

const MAC: &str = "AA:BB:CC";
const TOKEN: &str = "dashboard-token";

struct TestApp {
    router: Router,
    sync: Arc<DeviceSync>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(SyncConfig::default().with_device_type(1, "RGB lamp"))
    }

    fn with_config(config: SyncConfig) -> Self {
        let sync = Arc::new(DeviceSync::in_memory(config));
        let sessions = StaticSessions::new().with_session(TOKEN, UserId::new(9));
        let router = build_router(AppState::new(Arc::clone(&sync), Arc::new(sessions)));
        Self { router, sync }
    }

    /// Sends a request and returns (status, JSON body or null).
    async fn send(&self, method: Method, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let resp = self
            .router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    /// Registers the test device with a color and an effect, returns its key.
    async fn register(&self) -> String {
        let uri = format!(
            concat!(
                "/api/device/registration?deviceId={}&ip=10.0.0.2&device_type=1",
                "&color={}&effect={}&temp={}&history=temp",
            ),
            encode(MAC),
            encode("0,0,0,255"),
            encode("-1,0"),
            encode("21.5,40"),
        );
        let (status, body) = self.get(&uri).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["key"].as_str().unwrap().to_string()
    }

    fn device_uri(&self, key: &str, extra: &str) -> String {
        format!("/api/device/values?deviceId={}&key={key}{extra}", encode(MAC))
    }

    async fn wait_for_waiters(&self, device: usize, user: usize) {
        loop {
            let counts = self.sync.waiter_counts();
            if counts.device == device && counts.user == user {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_reports_waiters() {
    let app = TestApp::new();
    let (status, body) = app.get("/api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "ok", "waiters": {"device": 0, "user": 0}})
    );
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let app = TestApp::new();
    let resp = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api")
                .header(header::ORIGIN, "http://dashboard.local")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

// ============================================================================
// Device provisioning
// ============================================================================

mod provisioning {
    use super::*;

    #[tokio::test]
    async fn registration_returns_key() {
        let app = TestApp::new();
        let key = app.register().await;
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let app = TestApp::new();
        app.register().await;

        let uri = format!(
            "/api/device/registration?deviceId={}&ip=10.0.0.3&device_type=1",
            encode("aa:bb:cc")
        );
        let (status, body) = app.get(&uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"message": "device is already registered", "errors": []})
        );
    }

    #[tokio::test]
    async fn registration_requires_type_and_ip() {
        let app = TestApp::new();
        let (status, _) = app
            .get("/api/device/registration?deviceId=aa&ip=10.0.0.2")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .get("/api/device/registration?deviceId=aa&device_type=1")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn registration_rejects_malformed_value() {
        let app = TestApp::new();
        let (status, _) = app
            .get("/api/device/registration?deviceId=aa&ip=10.0.0.2&device_type=1&color=red")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authorization_checks_key() {
        let app = TestApp::new();
        let key = app.register().await;

        let uri = format!(
            "/api/device/authorization?deviceId={}&key=wrong&ip=10.0.0.5",
            encode(MAC)
        );
        let (status, _) = app.get(&uri).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let uri = format!(
            "/api/device/authorization?deviceId={}&key={key}&ip=10.0.0.5",
            encode(MAC)
        );
        let (status, body) = app.get(&uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"mac": "aa:bb:cc", "key": key}));
    }
}

// ============================================================================
// Device values
// ============================================================================

mod values {
    use super::*;

    #[tokio::test]
    async fn read_all_values() {
        let app = TestApp::new();
        let key = app.register().await;

        let (status, body) = app.get(&app.device_uri(&key, "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["color"], json!({"r": 0, "g": 0, "b": 0, "a": 255}));
        assert_eq!(body["effect"], json!({"effect": -1, "a": 0}));
        assert_eq!(body["temp"][0]["value"], json!({"temp": 21.5, "hud": 40.0}));
        assert!(body["temp"][0]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn write_echoes_and_effect_overrides_color() {
        let app = TestApp::new();
        let key = app.register().await;

        let (status, body) = app
            .get(&app.device_uri(&key, &format!("&effect={}", encode("2,128"))))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"effect": "2,128"}));

        let (_, body) = app.get(&app.device_uri(&key, "&value=color")).await;
        assert_eq!(body, json!({"color": {"effect": 2, "a": 128}}));

        app.get(&app.device_uri(&key, &format!("&color={}", encode("255,0,0,255"))))
            .await;
        let (_, body) = app.get(&app.device_uri(&key, "&value=effect")).await;
        assert_eq!(body, json!({"effect": {"effect": -1, "a": 0}}));
        let (_, body) = app.get(&app.device_uri(&key, "&value=color")).await;
        assert_eq!(body, json!({"color": {"r": 255, "g": 0, "b": 0, "a": 255}}));
    }

    #[tokio::test]
    async fn history_key_appends() {
        let app = TestApp::new();
        let key = app.register().await;

        app.get(&app.device_uri(&key, &format!("&temp={}", encode("22,41"))))
            .await;
        let (_, body) = app.get(&app.device_uri(&key, "&value=temp")).await;
        let temps: Vec<f64> = body["temp"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["value"]["temp"].as_f64().unwrap())
            .collect();
        assert_eq!(temps, [21.5, 22.0]);
    }

    #[tokio::test]
    async fn new_key_needs_history_hint() {
        let app = TestApp::new();
        let key = app.register().await;

        let (status, body) = app.get(&app.device_uri(&key, "&mode=auto")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "store error: invalid key: mode");

        let (status, _) = app
            .get(&app.device_uri(&key, "&log=boot&history=log"))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reading_unknown_key_is_bad_request() {
        let app = TestApp::new();
        let key = app.register().await;
        let (status, _) = app.get(&app.device_uri(&key, "&value=missing")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_key_is_unauthorized() {
        let app = TestApp::new();
        app.register().await;
        let (status, _) = app.get(&app.device_uri("nope", "")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_identity_is_bad_request() {
        let app = TestApp::new();
        let (status, _) = app.get("/api/device/values?deviceId=aa").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

// ============================================================================
// User devices
// ============================================================================

mod user_devices {
    use super::*;

    async fn claim(app: &TestApp, key: &str) {
        let uri = format!("/api/user/device?deviceId={}&key={key}", encode(MAC));
        let (status, body) = app.send(Method::POST, &uri, Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["mac"], "aa:bb:cc");
    }

    #[tokio::test]
    async fn listing_requires_session() {
        let app = TestApp::new();
        let (status, _) = app.get("/api/user/device").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(Method::GET, "/api/user/device", Some("stale"))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn claimed_device_is_listed() {
        let app = TestApp::new();
        let key = app.register().await;
        claim(&app, &key).await;

        let (status, body) = app
            .get(&format!("/api/user/device?access_token={TOKEN}"))
            .await;
        assert_eq!(status, StatusCode::OK);
        let devices = body["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0]["mac"], "aa:bb:cc");
        assert_eq!(devices[0]["online"], true);
        assert_eq!(devices[0]["title"], "RGB lamp");
        assert!(devices[0].get("key").is_none());
    }

    #[tokio::test]
    async fn user_session_writes_values() {
        let app = TestApp::new();
        let key = app.register().await;
        claim(&app, &key).await;

        let uri = format!("/api/device/values?color={}", encode("1,2,3,4"));
        let (status, _) = app.send(Method::GET, &uri, Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app.get(&app.device_uri(&key, "&value=color")).await;
        assert_eq!(body, json!({"color": {"r": 1, "g": 2, "b": 3, "a": 4}}));
    }

    #[tokio::test]
    async fn user_without_devices_is_bad_request() {
        let app = TestApp::new();
        let (status, _) = app
            .send(Method::GET, "/api/device/values", Some(TOKEN))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_soft_deletes() {
        let app = TestApp::new();
        let key = app.register().await;
        claim(&app, &key).await;

        let uri = format!("/api/user/device?deviceId={}", encode(MAC));
        let (status, _) = app.send(Method::DELETE, &uri, Some(TOKEN)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.get(&app.device_uri(&key, "")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // The mac can be registered again.
        app.register().await;
    }
}

// ============================================================================
// Long-poll
// ============================================================================

mod long_poll {
    use super::*;

    #[tokio::test]
    async fn device_and_user_waiters_both_wake() {
        let app = Arc::new(TestApp::new());
        let key = app.register().await;
        claim_device(&app, &key).await;

        let device_wait = {
            let app = Arc::clone(&app);
            let uri = app.device_uri(&key, "&longpool=1&rid=device");
            tokio::spawn(async move { app.get(&uri).await })
        };
        let user_wait = {
            let app = Arc::clone(&app);
            tokio::spawn(async move {
                app.send(
                    Method::GET,
                    "/api/user/device?longpool=1&rid=tab",
                    Some(TOKEN),
                )
                .await
            })
        };
        app.wait_for_waiters(1, 1).await;

        let (status, _) = app
            .get(&app.device_uri(&key, &format!("&effect={}", encode("2,128"))))
            .await;
        assert_eq!(status, StatusCode::OK);

        let update = (StatusCode::OK, json!({"event": "update"}));
        assert_eq!(device_wait.await.unwrap(), update);
        assert_eq!(user_wait.await.unwrap(), update);
        app.wait_for_waiters(0, 0).await;
    }

    #[tokio::test]
    async fn abandoned_request_does_not_block_others() {
        let app = Arc::new(TestApp::new());
        let key = app.register().await;

        let gone = {
            let app = Arc::clone(&app);
            let uri = app.device_uri(&key, "&longpool=1&rid=gone");
            tokio::spawn(async move { app.get(&uri).await })
        };
        app.wait_for_waiters(1, 0).await;
        gone.abort();
        let _ = gone.await;
        app.wait_for_waiters(0, 0).await;

        let stays = {
            let app = Arc::clone(&app);
            let uri = app.device_uri(&key, "&longpool=1&rid=stays");
            tokio::spawn(async move { app.get(&uri).await })
        };
        app.wait_for_waiters(1, 0).await;

        app.get(&app.device_uri(&key, &format!("&color={}", encode("9,9,9,9"))))
            .await;
        assert_eq!(
            stays.await.unwrap(),
            (StatusCode::OK, json!({"event": "update"}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_answers_none() {
        let app = TestApp::with_config(
            SyncConfig::default().with_longpoll_timeout(Duration::from_secs(60)),
        );
        let key = app.register().await;

        let (status, body) = app.get(&app.device_uri(&key, "&longpool=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"event": "none"}));
        assert_eq!(app.sync.waiter_counts().device, 0);
    }

    async fn claim_device(app: &TestApp, key: &str) {
        let uri = format!("/api/user/device?deviceId={}&key={key}", encode(MAC));
        let (status, _) = app.send(Method::POST, &uri, Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
