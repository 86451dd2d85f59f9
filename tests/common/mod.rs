use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub const ADMIN_SECRET: &str = "integration-admin-secret";
pub const ADMIN_EMAIL: &str = "admin@license.test";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Spawn the already-built binary against the in-memory backend so the
        // suite needs no external database.
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_license-api-rust"));
        cmd.env("LICENSE_API_PORT", port.to_string())
            .env("STORE_BACKEND", "memory")
            .env("ADMIN_SECRET_CODE", ADMIN_SECRET)
            .env("ADMIN_EMAILS", format!("{ADMIN_EMAIL},legacy@license.test"))
            .env("SESSION_JWT_SECRET", "integration-session-secret")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Fetch an admin token through the login endpoint.
pub async fn admin_token(server: &TestServer) -> Result<String> {
    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .post(format!("{}/admin/login", server.base_url))
        .json(&serde_json::json!({ "code": ADMIN_SECRET }))
        .send()
        .await?
        .json()
        .await?;
    anyhow::ensure!(body["ok"] == serde_json::json!(true), "admin login failed: {body}");
    Ok(body["token"].as_str().context("token missing")?.to_string())
}

/// POST an action to the dispatch endpoint with an optional admin token and
/// caller IP.
pub async fn post_action(
    server: &TestServer,
    body: serde_json::Value,
    token: Option<&str>,
    ip: Option<&str>,
) -> Result<(StatusCode, serde_json::Value)> {
    let client = reqwest::Client::new();
    let mut req = client.post(&server.base_url).json(&body);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    if let Some(ip) = ip {
        req = req.header("x-forwarded-for", ip);
    }
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.json().await?;
    Ok((status, body))
}
