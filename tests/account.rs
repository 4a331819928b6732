//! Account purchase lookup and identity reconciliation tests.

mod common;

use axum::http::StatusCode;
use common::*;

use feddsp_licensing::db;

#[tokio::test]
async fn test_missing_token_is_401() {
    let app = test_app();
    let response = get_purchases(app.state.clone(), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_token_is_401() {
    let app = test_app();
    let response = get_purchases(app.state.clone(), Some("forged-token")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// The end-to-end reconciliation scenario: the first lookup bootstraps by
/// verified email and persists the discovered commerce id; the second
/// lookup works from the mapping alone, even with the email lookup dead.
#[tokio::test]
async fn test_bootstrap_by_email_then_durable_match_by_customer_id() {
    let app = test_app();

    {
        let conn = app.state.db.get().unwrap();
        let record = make_license_record(
            "ORD-9",
            "636851",
            "buyer@example.com",
            Some("C42"),
            "2025-06-01T10:00:00Z",
        );
        db::licenses::put(&conn, "ORD-9:636851", &record).unwrap();
    }

    // Case differs from the record on purpose: matching is
    // case-insensitive exact.
    *app.identity.emails.lock().unwrap() = vec!["Buyer@Example.COM".to_string()];

    let response = get_purchases(app.state.clone(), Some(STUB_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let purchases = body["purchases"].as_array().unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0]["id"], "ORD-9:636851");
    assert_eq!(purchases[0]["productId"], "fedDSP-PHAT");
    assert_eq!(purchases[0]["licenseStatus"], "active");
    assert!(
        purchases[0]["licenseKey"]
            .as_str()
            .unwrap()
            .starts_with("-----BEGIN")
    );

    // The mapping and the reverse index were persisted.
    {
        let conn = app.state.db.get().unwrap();
        let mapping = db::identity::get_mapping(&conn, STUB_USER_ID)
            .unwrap()
            .expect("mapping persisted on first lookup");
        assert!(mapping.commerce_customer_ids.contains("C42"));
        assert_eq!(
            db::identity::get_customer_link(&conn, "C42").unwrap().as_deref(),
            Some(STUB_USER_ID)
        );
    }

    // Second lookup: email lookup is now unavailable; the mapping alone
    // must still resolve the purchase.
    app.identity.emails.lock().unwrap().clear();
    *app.identity.fail_emails.lock().unwrap() = true;

    let response = get_purchases(app.state.clone(), Some(STUB_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let purchases = body["purchases"].as_array().unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0]["id"], "ORD-9:636851");
}

#[tokio::test]
async fn test_post_auth_failure_degrades_to_empty_list() {
    let app = test_app();
    *app.identity.fail_emails.lock().unwrap() = true;

    let response = get_purchases(app.state.clone(), Some(STUB_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["purchases"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_no_verified_emails_means_no_purchases() {
    let app = test_app();

    {
        let conn = app.state.db.get().unwrap();
        let record = make_license_record(
            "ORD-10",
            "636851",
            "buyer@example.com",
            Some("C42"),
            "2025-06-01T10:00:00Z",
        );
        db::licenses::put(&conn, "ORD-10:636851", &record).unwrap();
    }

    let response = get_purchases(app.state.clone(), Some(STUB_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["purchases"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_purchases_sorted_newest_first() {
    let app = test_app();

    {
        let conn = app.state.db.get().unwrap();
        for (order, created_at) in [
            ("ORD-A", "2023-01-01T00:00:00Z"),
            ("ORD-C", "2025-01-01T00:00:00Z"),
            ("ORD-B", "2024-01-01T00:00:00Z"),
        ] {
            let record = make_license_record(
                order,
                "636851",
                "buyer@example.com",
                Some("C42"),
                created_at,
            );
            db::licenses::put(&conn, &db::licenses::store_key(order, "636851"), &record).unwrap();
        }
    }

    *app.identity.emails.lock().unwrap() = vec!["buyer@example.com".to_string()];

    let response = get_purchases(app.state.clone(), Some(STUB_TOKEN)).await;
    let body = body_json(response).await;
    let ids: Vec<&str> = body["purchases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["ORD-C:636851", "ORD-B:636851", "ORD-A:636851"]);
}

#[tokio::test]
async fn test_linked_at_survives_mapping_updates() {
    let app = test_app();

    // Pre-existing mapping with no ids yet and a sentinel linked_at.
    {
        let conn = app.state.db.get().unwrap();
        let mapping = feddsp_licensing::models::IdentityMapping {
            auth_user_id: STUB_USER_ID.to_string(),
            commerce_customer_ids: Default::default(),
            linked_at: "2022-05-05T05:05:05Z".to_string(),
            updated_at: "2022-05-05T05:05:05Z".to_string(),
        };
        db::identity::put_mapping(&conn, &mapping).unwrap();

        let record = make_license_record(
            "ORD-11",
            "636851",
            "buyer@example.com",
            Some("C77"),
            "2025-06-01T10:00:00Z",
        );
        db::licenses::put(&conn, "ORD-11:636851", &record).unwrap();
    }

    *app.identity.emails.lock().unwrap() = vec!["buyer@example.com".to_string()];
    let response = get_purchases(app.state.clone(), Some(STUB_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let conn = app.state.db.get().unwrap();
    let mapping = db::identity::get_mapping(&conn, STUB_USER_ID).unwrap().unwrap();
    assert!(mapping.commerce_customer_ids.contains("C77"));
    assert_eq!(mapping.linked_at, "2022-05-05T05:05:05Z");
    assert_ne!(mapping.updated_at, "2022-05-05T05:05:05Z");
}
