mod common;

use anyhow::Result;
use reqwest::StatusCode;

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], serde_json::json!(true));
    Ok(())
}

#[tokio::test]
async fn root_describes_the_service() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let body = client
        .get(&server.base_url)
        .send()
        .await?
        .json::<serde_json::Value>()
        .await?;
    assert_eq!(body["success"], serde_json::json!(true));
    assert!(body["data"]["endpoints"]["actions"].is_string());
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_a_400() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(&server.base_url)
        .header("content-type", "application/json")
        .body("[1, 2, 3]")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn unknown_action_is_a_400() -> Result<()> {
    let server = common::ensure_server().await?;
    let (status, body) =
        common::post_action(server, serde_json::json!({ "action": "definitely-not-real" }), None, None)
            .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], serde_json::json!(false));
    Ok(())
}
