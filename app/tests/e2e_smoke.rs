//! ABOUTME: End-to-end smoke test that boots the real stanbase servers on free ports
//! ABOUTME: Walks probes, metrics, public pages and the API token flow over HTTP

use reqwest::{Client, StatusCode};
use sb_config::Config;
use sb_db::Db;
use serde_json::{json, Value};
use stanbase::{admin::create_admin, seed::seed, server::serve};
use std::{net::TcpListener, time::Duration};
use tempfile::TempDir;
use tokio::{sync::oneshot, time::sleep};

const ADMIN_EMAIL: &str = "admin@stanbase.test";
const ADMIN_PASSWORD: &str = "adminpass123";

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("free port")
}

/// A running server pair with its own database and cache directory
struct Harness {
    _dir: TempDir,
    client: Client,
    web: String,
    obs: String,
    server: Option<oneshot::Sender<()>>,
}

impl Harness {
    async fn start() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join(test_support::unique_db_name("e2e"));

        let mut config = Config::default();
        config.environment = "test".to_string();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = free_port();
        config.server.obs_port = free_port();
        config.server.static_dir = dir.path().join("static").to_string_lossy().to_string();
        config.database.path = db_path.to_string_lossy().to_string();
        config.cache.dir = dir.path().join("cache").to_string_lossy().to_string();
        config.security.jwt_secret = test_support::test_jwt_secret();

        // schema, reference data and an admin exist before the servers come up
        let db = Db::new(&config.database.path).await.expect("db");
        seed(&db).await.expect("seed");
        create_admin(&db, ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("admin");
        db.pool().close().await;

        let web = format!("http://127.0.0.1:{}", config.server.port);
        let obs = format!("http://127.0.0.1:{}", config.server.obs_port);
        // actix servers are !Send, so they run on their own current-thread runtime
        let (server, stop) = oneshot::channel::<()>();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("server runtime");
            rt.block_on(async move {
                tokio::select! {
                    _ = serve(config) => {}
                    _ = stop => {}
                }
            });
        });
        let server = Some(server);

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("client");

        let harness = Self {
            _dir: dir,
            client,
            web,
            obs,
            server,
        };
        harness.wait_until_healthy().await;
        harness
    }

    async fn wait_until_healthy(&self) {
        for _ in 0..100 {
            let web_up = self.client.get(&self.web).send().await.is_ok();
            let obs_up = self
                .client
                .get(format!("{}/healthz", self.obs))
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false);
            if web_up && obs_up {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("servers did not come up");
    }

    async fn get(&self, url: String) -> reqwest::Response {
        self.client.get(url).send().await.expect("request")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(stop) = self.server.take() {
            let _ = stop.send(());
        }
    }
}

#[tokio::test]
async fn test_probes_and_metrics() {
    let h = Harness::start().await;

    let resp = h.get(format!("{}/healthz", h.obs)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = h.get(format!("{}/readyz", h.obs)).await;
    assert_eq!(resp.status(), StatusCode::OK, "serve marks itself ready");

    // one page view so the request counters move
    let resp = h.get(format!("{}/", h.web)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let text = h
        .get(format!("{}/metrics", h.obs))
        .await
        .text()
        .await
        .expect("metrics body");
    assert!(text.contains("http_requests"));
    assert!(text.contains("http_request_duration_seconds"));
}

#[tokio::test]
async fn test_public_pages_render() {
    let h = Harness::start().await;

    for path in ["/", "/companies", "/investors", "/news", "/events", "/jobs", "/analytics"] {
        let resp = h.get(format!("{}{}", h.web, path)).await;
        assert_eq!(resp.status(), StatusCode::OK, "GET {}", path);
        let ct = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(ct.starts_with("text/html"), "{} served {}", path, ct);
    }

    let resp = h.get(format!("{}/company/does-not-exist", h.web)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let sitemap = h
        .get(format!("{}/sitemap.xml", h.web))
        .await
        .text()
        .await
        .expect("sitemap");
    assert!(sitemap.contains("<urlset"));
}

#[tokio::test]
async fn test_api_token_opens_admin_endpoints() {
    let h = Harness::start().await;

    let resp = h
        .client
        .post(format!("{}/api/v1/cache/invalidate/all", h.web))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = h
        .client
        .post(format!("{}/api/v1/auth/login", h.web))
        .json(&json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .expect("login");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("login body");
    let token = body["access_token"].as_str().expect("token").to_string();
    assert_eq!(body["user"]["role"], "admin");

    let resp = h
        .client
        .post(format!("{}/api/v1/cache/invalidate/all", h.web))
        .bearer_auth(&token)
        .send()
        .await
        .expect("invalidate");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("invalidate body");
    assert_eq!(body["success"], true);

    let body: Value = h
        .get(format!("{}/api/v1/analytics", h.web))
        .await
        .json()
        .await
        .expect("analytics body");
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_feedback_is_accepted_without_telegram() {
    let h = Harness::start().await;

    let resp = h
        .client
        .post(format!("{}/api/v1/feedback", h.web))
        .json(&test_support::sample_feedback_payload())
        .send()
        .await
        .expect("feedback");
    assert!(resp.status().is_success(), "got {}", resp.status());
    let body: Value = resp.json().await.expect("feedback body");
    assert_eq!(body["success"], true);
}
