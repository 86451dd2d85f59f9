mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

async fn create_license(
    server: &common::TestServer,
    token: &str,
    email: &str,
) -> Result<(String, String)> {
    let (status, body) = common::post_action(
        server,
        json!({ "action": "create-license", "email": email, "planTier": "enterprise" }),
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
async fn tenant_flags_and_member_overrides_flow_through_validation() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::admin_token(server).await?;
    let (code, license_id) = create_license(server, &token, "owner@features.test").await?;

    // Tenant-level flags, merged across two updates.
    for flags in [json!({ "ai_analysis": true }), json!({ "pdf_export": false })] {
        let (status, _) = common::post_action(
            server,
            json!({ "action": "update-features", "licenseId": license_id, "features": flags }),
            Some(&token),
            None,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = common::post_action(
        server,
        json!({ "action": "validate", "licenseCode": code, "email": "owner@features.test" }),
        None,
        Some("192.0.2.51"),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "validate failed: {body}");
    assert_eq!(body["customFeatures"]["ai_analysis"], json!(true));
    assert_eq!(body["customFeatures"]["pdf_export"], json!(false));
    let session = body["session"]["access_token"].as_str().unwrap().to_string();

    // Per-member override on top of the tenant default.
    let (_, data) = common::post_action(
        server,
        json!({ "action": "get-company-data", "licenseId": license_id }),
        Some(&token),
        None,
    )
    .await?;
    let membership_id = data["members"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = common::post_action(
        server,
        json!({
            "action": "update-user-features",
            "membershipId": membership_id,
            "overrides": { "pdf_export": true },
        }),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // The check path surfaces the override for the session holder.
    let (status, body) = common::post_action(
        server,
        json!({ "action": "check", "licenseCode": code, "email": "owner@features.test" }),
        Some(&session),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let overrides = body["userFeatureOverrides"].as_array().expect("overrides present");
    assert_eq!(overrides[0]["feature_key"], json!("pdf_export"));
    assert_eq!(overrides[0]["enabled"], json!(true));

    Ok(())
}

#[tokio::test]
async fn addon_replacement_is_owner_scoped() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::admin_token(server).await?;
    let (code, license_id) = create_license(server, &token, "owner@addons.test").await?;

    let (status, _) = common::post_action(
        server,
        json!({
            "action": "update-addons",
            "licenseCode": code,
            "email": "owner@addons.test",
            "addOns": ["extra_drivers", "priority_support"],
        }),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // Members cannot manage add-ons with the shared code.
    let (status, _) = common::post_action(
        server,
        json!({
            "action": "update-addons",
            "licenseCode": code,
            "email": "member@addons.test",
            "addOns": [],
        }),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Replacing the set deactivates what is no longer selected.
    let (status, _) = common::post_action(
        server,
        json!({
            "action": "update-addons",
            "licenseCode": code,
            "email": "owner@addons.test",
            "addOns": ["priority_support"],
        }),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = common::post_action(
        server,
        json!({ "action": "admin-get-addons", "licenseId": license_id }),
        Some(&token),
        None,
    )
    .await?;
    let addons = body["addons"].as_array().unwrap();
    assert_eq!(addons.len(), 1);
    assert_eq!(addons[0]["addon_id"], json!("priority_support"));

    Ok(())
}

#[tokio::test]
async fn sync_company_counts_active_members() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::admin_token(server).await?;
    let (code, _) = create_license(server, &token, "owner@sync.test").await?;

    let (status, _) = common::post_action(
        server,
        json!({ "action": "validate", "licenseCode": code, "email": "owner@sync.test" }),
        None,
        Some("192.0.2.52"),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = common::post_action(
        server,
        json!({ "action": "sync-company", "licenseCode": code, "email": "owner@sync.test" }),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["syncedCount"], json!(1));
    Ok(())
}
