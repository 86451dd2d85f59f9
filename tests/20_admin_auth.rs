mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn wrong_access_code_is_a_clean_failure() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/admin/login", server.base_url))
        .header("x-forwarded-for", "203.0.113.10")
        .json(&json!({ "code": "not-the-code" }))
        .send()
        .await?;
    // Wrong codes are a 200 so clients render a message, not a crash.
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["ok"], json!(false));
    Ok(())
}

#[tokio::test]
async fn login_issues_a_working_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::admin_token(server).await?;

    let (status, body) =
        common::post_action(server, json!({ "action": "list-all" }), Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert!(body["licenses"].is_array());
    Ok(())
}

#[tokio::test]
async fn admin_actions_reject_missing_credentials() -> Result<()> {
    let server = common::ensure_server().await?;

    let (status, body) =
        common::post_action(server, json!({ "action": "list-all" }), None, None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], json!(false));
    Ok(())
}

#[tokio::test]
async fn admin_actions_reject_garbage_tokens() -> Result<()> {
    let server = common::ensure_server().await?;

    let (status, _) = common::post_action(
        server,
        json!({ "action": "list-all", "adminToken": "aaa.bbb.ccc" }),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn legacy_email_allow_list_still_authorizes() -> Result<()> {
    let server = common::ensure_server().await?;

    let (status, body) = common::post_action(
        server,
        json!({ "action": "list-all", "adminEmail": "Legacy@License.TEST" }),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    Ok(())
}

#[tokio::test]
async fn body_token_works_without_header() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::admin_token(server).await?;

    let (status, _) = common::post_action(
        server,
        json!({ "action": "list-all", "adminToken": token }),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
