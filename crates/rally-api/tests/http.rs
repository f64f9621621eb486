//! End-to-end request tests against the full router with an in-memory store.

use std::sync::{Arc, Mutex};

use argon2::Params;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tower::ServiceExt;

use rally_api::auth::AppStateInner;
use rally_api::routes;
use rally_core::config::TokenConfig;
use rally_core::credentials::Credentials;
use rally_core::notify::{DeliveryError, PushTransport};
use rally_core::tokens::Tokens;
use rally_db::Database;
use rally_types::models::PushSubscription;

#[derive(Default)]
struct FakeTransport {
    fail_all: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl PushTransport for FakeTransport {
    fn send<'a>(
        &'a self,
        subscription: &'a PushSubscription,
        payload: &'a [u8],
        _ttl: u32,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push((
                subscription.endpoint.clone(),
                String::from_utf8_lossy(payload).into_owned(),
            ));
            if self.fail_all {
                Err(DeliveryError::Rejected { status: 500 })
            } else {
                Ok(())
            }
        })
    }
}

struct TestApp {
    router: Router,
    db: Arc<Database>,
    transport: Arc<FakeTransport>,
}

fn app_with(transport: FakeTransport) -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let transport = Arc::new(transport);
    let tokens = Tokens::new(&TokenConfig {
        secret: "test-secret".into(),
        ttl: chrono::Duration::hours(1),
    });
    let state = Arc::new(AppStateInner::new(
        db.clone(),
        Credentials::with_params(Params::new(1024, 1, 1, None).unwrap()),
        tokens,
        transport.clone(),
        "BPublicKey".into(),
    ));
    TestApp {
        router: routes::router(state),
        db,
        transport,
    }
}

fn app() -> TestApp {
    app_with(FakeTransport::default())
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Registers a user and returns (user_id, token).
    async fn register(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .call(
                "POST",
                "/users",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "correct horse",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn subscribe(&self, token: &str, device: &str) {
        let (status, _) = self
            .call(
                "POST",
                "/subscriptions",
                Some(token),
                Some(json!({
                    "endpoint": format!("https://push.example.com/{}", device),
                    "keys": { "p256dh": "p256dh-key", "auth": "auth-secret" },
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    fn pushes(&self) -> Vec<(String, String)> {
        self.transport.sent.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn register_then_login_by_username_or_email() {
    let app = app();
    let (user_id, _) = app.register("ada").await;

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "identifier": "ada@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.as_str());
    assert_eq!(body["username"], "ada");

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "identifier": "ada", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_failures_look_identical() {
    let app = app();
    app.register("ada").await;

    let (s1, wrong_password) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "identifier": "ada", "password": "battery staple" })),
        )
        .await;
    let (s2, unknown_user) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "identifier": "grace", "password": "correct horse" })),
        )
        .await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_user);
    assert_eq!(wrong_password["error"], "invalid credentials");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    app.register("ada").await;

    let (status, _) = app
        .call(
            "POST",
            "/users",
            None,
            Some(json!({ "username": "ada", "email": "other@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app();
    let (status, _) = app.call("GET", "/subscriptions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call("GET", "/subscriptions", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call("GET", "/push/public-key", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["public_key"], "BPublicKey");
}

#[tokio::test]
async fn users_can_only_edit_themselves() {
    let app = app();
    let (ada_id, ada) = app.register("ada").await;
    let (grace_id, _) = app.register("grace").await;

    let (status, _) = app
        .call(
            "PUT",
            &format!("/users/{}", grace_id),
            Some(&ada),
            Some(json!({ "username": "hijacked" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "PUT",
            &format!("/users/{}", ada_id),
            Some(&ada),
            Some(json!({ "username": "ada_l", "password": "new password!" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ada_l");
    assert!(body.get("password").is_none());

    // The new password is the one that works now
    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "identifier": "ada_l", "password": "new password!" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn password_gated_channel_join_and_leave() {
    let app = app();
    let (ada_id, ada) = app.register("ada").await;
    let (grace_id, grace) = app.register("grace").await;

    let (status, channel) = app
        .call(
            "POST",
            "/channels",
            Some(&ada),
            Some(json!({ "name": "Ops", "password": "hunter22" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(channel.get("password_hash").is_none());
    let channel_id = channel["id"].as_str().unwrap().to_string();
    let join = format!("/channels/{}/join", channel_id);

    let (status, body) = app
        .call(
            "POST",
            &join,
            Some(&grace),
            Some(json!({ "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid credentials");

    let (status, body) = app
        .call(
            "POST",
            &join,
            Some(&grace),
            Some(json!({ "password": "hunter22" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"], json!([ada_id, grace_id]));

    // Joining twice keeps a single entry
    let (_, body) = app
        .call(
            "POST",
            &join,
            Some(&grace),
            Some(json!({ "password": "hunter22" })),
        )
        .await;
    assert_eq!(body["members"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .call(
            "POST",
            &format!("/channels/{}/leave", channel_id),
            Some(&grace),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"], json!([ada_id]));
}

#[tokio::test]
async fn joining_a_missing_channel_is_404() {
    let app = app();
    let (_, ada) = app.register("ada").await;

    let (status, _) = app
        .call(
            "POST",
            &format!("/channels/{}/join", uuid::Uuid::new_v4()),
            Some(&ada),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Creates an open channel owned by `owner` that `member` has joined, plus a list in it.
async fn shared_list(app: &TestApp, owner: &str, member: &str) -> String {
    let (_, channel) = app
        .call(
            "POST",
            "/channels",
            Some(owner),
            Some(json!({ "name": "Home" })),
        )
        .await;
    let channel_id = channel["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .call(
            "POST",
            &format!("/channels/{}/join", channel_id),
            Some(member),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, list) = app
        .call(
            "POST",
            "/todolists",
            Some(owner),
            Some(json!({ "title": "Groceries", "channel_id": channel_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    list["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn completion_flip_pushes_to_channel_members() {
    let app = app();
    let (_, ada) = app.register("ada").await;
    let (_, grace) = app.register("grace").await;
    app.subscribe(&grace, "grace-phone").await;

    let list_id = shared_list(&app, &ada, &grace).await;
    let tasks = format!("/todolists/{}/tasks", list_id);

    let (status, task) = app
        .call("POST", &tasks, Some(&ada), Some(json!({ "title": "Milk" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["completed"], false);
    let task_url = format!("{}/{}", tasks, task["id"].as_str().unwrap());

    // Title-only edit stays quiet
    let (status, _) = app
        .call(
            "PUT",
            &task_url,
            Some(&ada),
            Some(json!({ "title": "Oat milk" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.pushes().is_empty());

    let (status, task) = app
        .call(
            "PUT",
            &task_url,
            Some(&grace),
            Some(json!({ "title": "Oat milk", "completed": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["completed"], true);

    assert_eq!(
        app.pushes(),
        vec![(
            "https://push.example.com/grace-phone".to_string(),
            "Task 'Oat milk' has been marked as true.".to_string()
        )]
    );
}

#[tokio::test]
async fn push_failures_do_not_fail_the_write() {
    let app = app_with(FakeTransport {
        fail_all: true,
        ..Default::default()
    });
    let (_, ada) = app.register("ada").await;
    let (_, grace) = app.register("grace").await;
    app.subscribe(&grace, "grace-phone").await;
    app.subscribe(&ada, "ada-laptop").await;

    let list_id = shared_list(&app, &ada, &grace).await;
    let tasks = format!("/todolists/{}/tasks", list_id);
    let (_, task) = app
        .call(
            "POST",
            &tasks,
            Some(&ada),
            Some(json!({ "title": "Bread" })),
        )
        .await;
    let task_id = task["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            "PUT",
            &format!("{}/{}", tasks, task_id),
            Some(&ada),
            Some(json!({ "title": "Bread", "completed": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Both devices were attempted even though each failed
    assert_eq!(app.pushes().len(), 2);

    let stored = app
        .db
        .get_task(list_id.parse().unwrap(), task_id.parse().unwrap())
        .unwrap()
        .unwrap();
    assert!(stored.completed);
}

#[tokio::test]
async fn deleting_a_task_notifies_and_returns_it() {
    let app = app();
    let (_, ada) = app.register("ada").await;
    app.subscribe(&ada, "ada-laptop").await;

    let (_, list) = app
        .call(
            "POST",
            "/todolists",
            Some(&ada),
            Some(json!({ "title": "Personal" })),
        )
        .await;
    let tasks = format!("/todolists/{}/tasks", list["id"].as_str().unwrap());
    let (_, task) = app
        .call(
            "POST",
            &tasks,
            Some(&ada),
            Some(json!({ "title": "Call mum" })),
        )
        .await;
    let task_url = format!("{}/{}", tasks, task["id"].as_str().unwrap());

    let (status, deleted) = app.call("DELETE", &task_url, Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["title"], "Call mum");
    assert_eq!(app.pushes()[0].1, "Task 'Call mum' has been deleted.");

    let (status, _) = app.call("DELETE", &task_url, Some(&ada), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn outsiders_cannot_touch_a_list() {
    let app = app();
    let (_, ada) = app.register("ada").await;
    let (_, mallory) = app.register("mallory").await;

    let (_, list) = app
        .call(
            "POST",
            "/todolists",
            Some(&ada),
            Some(json!({ "title": "Private" })),
        )
        .await;
    let list_url = format!("/todolists/{}", list["id"].as_str().unwrap());

    let (status, _) = app.call("GET", &list_url, Some(&mallory), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            "POST",
            &format!("{}/tasks", list_url),
            Some(&mallory),
            Some(json!({ "title": "spam" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn subscriptions_are_scoped_to_their_owner() {
    let app = app();
    let (_, ada) = app.register("ada").await;
    let (_, grace) = app.register("grace").await;

    let (status, _) = app
        .call(
            "POST",
            "/subscriptions",
            Some(&ada),
            Some(json!({
                "endpoint": "http://insecure.example.com/x",
                "keys": { "p256dh": "k", "auth": "a" },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.subscribe(&ada, "ada-laptop").await;
    let (_, subs) = app.call("GET", "/subscriptions", Some(&ada), None).await;
    let sub_id = subs[0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            "DELETE",
            &format!("/subscriptions/{}", sub_id),
            Some(&grace),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            "DELETE",
            &format!("/subscriptions/{}", sub_id),
            Some(&ada),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn user_list_index_shows_only_what_the_caller_may_see() {
    let app = app();
    let (ada_id, ada) = app.register("ada").await;
    let (_, grace) = app.register("grace").await;
    let (_, mallory) = app.register("mallory").await;

    app.call(
        "POST",
        "/todolists",
        Some(&ada),
        Some(json!({ "title": "Private" })),
    )
    .await;
    shared_list(&app, &ada, &grace).await;
    let index = format!("/users/{}/todolists", ada_id);

    let (status, lists) = app.call("GET", &index, Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lists.as_array().unwrap().len(), 2);

    let (_, lists) = app.call("GET", &index, Some(&grace), None).await;
    assert_eq!(lists.as_array().unwrap().len(), 1);
    assert_eq!(lists[0]["title"], "Groceries");

    let (status, lists) = app.call("GET", &index, Some(&mallory), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lists, json!([]));
}

#[tokio::test]
async fn channel_list_index_is_behind_the_password_gate() {
    let app = app();
    let (_, ada) = app.register("ada").await;
    let (_, mallory) = app.register("mallory").await;

    let (_, channel) = app
        .call(
            "POST",
            "/channels",
            Some(&ada),
            Some(json!({ "name": "Ops", "password": "hunter22" })),
        )
        .await;
    let channel_id = channel["id"].as_str().unwrap().to_string();
    app.call(
        "POST",
        "/todolists",
        Some(&ada),
        Some(json!({ "title": "Runbook", "channel_id": channel_id })),
    )
    .await;
    let index = format!("/channels/{}/todolists", channel_id);

    let (status, _) = app.call("GET", &index, Some(&mallory), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            "POST",
            &format!("/channels/{}/join", channel_id),
            Some(&mallory),
            Some(json!({ "password": "hunter22" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, lists) = app.call("GET", &index, Some(&mallory), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lists[0]["title"], "Runbook");
}
