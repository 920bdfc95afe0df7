//! Shared test harness: an in-process server on an ephemeral port, driven over
//! HTTP with reqwest. Each TestServer gets its own throwaway SQLite database.

use marketclub_server::auth::{self, PlatformRole};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret-key-for-testing-only";

pub struct TestServer {
    addr: std::net::SocketAddr,
    #[allow(dead_code)]
    pub db_pool: sqlx::SqlitePool,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        let db_path = std::env::temp_dir().join(format!("marketclub_test_{}.db", Uuid::new_v4()));
        let database_url = format!("sqlite:{}", db_path.display());

        let config = marketclub_server::state::Config {
            database_url,
            jwt_secret: JWT_SECRET.to_string(),
            bind_address: "127.0.0.1:0".to_string(),
        };

        let (router, db_pool) = marketclub_server::create_app(config).await?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        // Give the server time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Ok(Self {
            addr,
            db_pool,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start_test_server() -> TestServer {
    TestServer::start().await.expect("Failed to start test server")
}

/// Mint a token for a regular user; identity issuance itself is out of scope.
pub fn user_token(user_id: Uuid) -> String {
    auth::create_token(user_id, PlatformRole::User, JWT_SECRET).expect("Failed to mint token")
}

pub fn admin_token(user_id: Uuid) -> String {
    auth::create_token(user_id, PlatformRole::Admin, JWT_SECRET).expect("Failed to mint token")
}

pub async fn create_community(
    client: &Client,
    http_url: &str,
    token: &str,
    name: &str,
    visibility: &str,
) -> Value {
    let response = client
        .post(format!("{http_url}/api/communities"))
        .bearer_auth(token)
        .json(&json!({ "name": name, "visibility": visibility }))
        .send()
        .await
        .expect("create community request failed");

    assert_eq!(response.status(), 201, "community creation should succeed");
    response.json().await.expect("invalid community body")
}

pub async fn create_draft_event(
    client: &Client,
    http_url: &str,
    token: &str,
    extra: Value,
) -> Value {
    let mut body = json!({
        "title": "Intro to the BRVM exchange",
        "description": "A walkthrough of regional market basics.",
        "event_date": (chrono::Utc::now() + chrono::Duration::days(7)).to_rfc3339(),
    });
    if let (Some(base), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }

    let response = client
        .post(format!("{http_url}/api/events"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .expect("create event request failed");

    assert_eq!(response.status(), 201, "event creation should succeed");
    response.json().await.expect("invalid event body")
}

pub async fn publish_event(client: &Client, http_url: &str, token: &str, event_id: &str) {
    let response = client
        .post(format!("{http_url}/api/events/{event_id}/publish"))
        .bearer_auth(token)
        .send()
        .await
        .expect("publish request failed");
    assert_eq!(response.status(), 200, "publish should succeed");
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("missing id").to_string()
}
