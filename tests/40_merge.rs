mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

async fn create_license(
    server: &common::TestServer,
    token: &str,
    email: &str,
    registration_id: &str,
) -> Result<(String, String)> {
    let (status, body) = common::post_action(
        server,
        json!({
            "action": "create-license",
            "email": email,
            "registrationId": registration_id,
        }),
        Some(token),
        None,
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "create failed: {body}");
    Ok((
        body["licenseCode"].as_str().unwrap().to_string(),
        body["license"]["id"].as_str().unwrap().to_string(),
    ))
}

#[tokio::test]
async fn merge_consolidates_duplicate_companies() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::admin_token(server).await?;

    // Two registrations of the same company, one with spaced formatting.
    let (_, target_id) = create_license(server, &token, "a@dupes.test", "552 100 554").await?;
    let (source_code, source_id) =
        create_license(server, &token, "b@dupes.test", "552100554").await?;

    // Give the source a member by validating.
    let (status, _) = common::post_action(
        server,
        json!({ "action": "validate", "licenseCode": source_code, "email": "b@dupes.test" }),
        None,
        Some("192.0.2.41"),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // Exact-match duplicate detection groups them.
    let (_, dupes) =
        common::post_action(server, json!({ "action": "detect-duplicates" }), Some(&token), None)
            .await?;
    let groups = dupes["duplicates"].as_array().unwrap();
    let group = groups
        .iter()
        .find(|g| g["registration_id"] == json!("552100554"))
        .expect("group for the shared registration id");
    assert_eq!(group["licenses"].as_array().unwrap().len(), 2);

    // Merge the source into the target.
    let (status, body) = common::post_action(
        server,
        json!({
            "action": "merge-companies",
            "targetLicenseId": target_id,
            "sourceLicenseIds": [source_id],
        }),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "merge failed: {body}");
    assert_eq!(body["report"]["sources"][0]["moved_memberships"], json!(1));

    // The member now belongs to the target.
    let (_, data) = common::post_action(
        server,
        json!({ "action": "get-company-data", "licenseId": target_id }),
        Some(&token),
        None,
    )
    .await?;
    let members = data["members"].as_array().unwrap();
    assert!(members.iter().any(|m| m["email"] == json!("b@dupes.test")));

    // The source is still resolvable by its original code, but dead.
    let (status, body) = common::post_action(
        server,
        json!({ "action": "check", "licenseCode": source_code, "email": "b@dupes.test" }),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], json!(false));

    // Exactly one audit entry for the merge, recorded against the target.
    let (_, logs) = common::post_action(
        server,
        json!({ "action": "get-audit-logs", "licenseId": target_id }),
        Some(&token),
        None,
    )
    .await?;
    let merge_entries: Vec<_> = logs["logs"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|l| l["action"] == json!("merge_companies"))
        .collect();
    assert_eq!(merge_entries.len(), 1);

    Ok(())
}

#[tokio::test]
async fn merge_requires_sources() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::admin_token(server).await?;
    let (_, target_id) = create_license(server, &token, "lonely@dupes.test", "111222333").await?;

    let (status, _) = common::post_action(
        server,
        json!({ "action": "merge-companies", "targetLicenseId": target_id, "sourceLicenseIds": [] }),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
