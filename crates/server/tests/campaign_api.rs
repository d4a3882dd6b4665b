//! End-to-end API tests driving the router in-process.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use megaphone_core::{CampaignStatus, CampaignStore, NewCampaign, ProviderError, Recipient};

use common::{roster_csv, TestFixture};

#[tokio::test]
async fn test_create_campaign_dispatches_to_all_recipients() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": roster_csv(5),
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert!(response.body["id"].is_string());
    assert_eq!(response.body["template_id"], "HXpromo");
    assert_eq!(response.body["total"], 5);

    let id = response.body["id"].as_str().unwrap().to_string();
    let body = fixture.wait_for_status(&id, "completed").await;

    assert_eq!(body["sent"], 5);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["pending"], 0);
    assert_eq!(fixture.gateway.total_calls().await, 5);

    // The run deregisters itself once it finishes
    for _ in 0..100 {
        if fixture.state.active_run_count().await == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(fixture.state.active_run_count().await, 0);
}

#[tokio::test]
async fn test_create_campaign_rejects_malformed_roster() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": "name,city\nAlice,Rome\n",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("Invalid roster"));
    assert_eq!(fixture.gateway.total_calls().await, 0);
}

#[tokio::test]
async fn test_create_campaign_rejects_invalid_phone() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": "phone,1\nnot-a-phone,Alice\n",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_campaign_duplicate_id_conflicts() {
    let fixture = TestFixture::new().await;

    let body = json!({
        "id": "camp-dup",
        "template_id": "HXpromo",
        "template_name": "spring_promo",
        "roster_csv": roster_csv(2),
    });

    let first = fixture.post("/api/v1/campaigns", body.clone()).await;
    assert_eq!(first.status, StatusCode::ACCEPTED);

    let second = fixture.post("/api/v1/campaigns", body).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert!(second.body["error"]
        .as_str()
        .unwrap()
        .contains("already exists"));
}

#[tokio::test]
async fn test_get_campaign_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/campaigns/nope").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_campaigns_with_pagination() {
    let fixture = TestFixture::new().await;

    for i in 0..3 {
        let response = fixture
            .post(
                "/api/v1/campaigns",
                json!({
                    "id": format!("camp-{}", i),
                    "template_id": "HXpromo",
                    "template_name": "spring_promo",
                    "roster_csv": roster_csv(1),
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
    }

    let response = fixture.get("/api/v1/campaigns").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["campaigns"].as_array().unwrap().len(), 3);

    let response = fixture.get("/api/v1/campaigns?limit=2&offset=0").await;
    assert_eq!(response.body["campaigns"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["limit"], 2);

    let response = fixture.get("/api/v1/campaigns?limit=2&offset=2").await;
    assert_eq!(response.body["campaigns"].as_array().unwrap().len(), 1);
    assert_eq!(response.body["offset"], 2);
}

#[tokio::test]
async fn test_errors_endpoint_lists_failed_recipients() {
    let fixture = TestFixture::new().await;

    fixture
        .gateway
        .always_fail(
            "+15550000001",
            ProviderError::permanent("63016: Number not registered on WhatsApp"),
        )
        .await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "id": "camp-err",
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": roster_csv(3),
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let body = fixture
        .wait_for_status("camp-err", "completed_with_errors")
        .await;
    assert_eq!(body["sent"], 2);
    assert_eq!(body["failed"], 1);

    let response = fixture.get("/api/v1/campaigns/camp-err/errors").await;
    assert_eq!(response.status, StatusCode::OK);

    let errors = response.body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["phone"], "+15550000001");
    assert!(errors[0]["error"]
        .as_str()
        .unwrap()
        .contains("not registered"));
    assert_eq!(errors[0]["attempts"], 1);
}

#[tokio::test]
async fn test_errors_endpoint_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/campaigns/nope/errors").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_queued_campaign_settles_records() {
    let fixture = TestFixture::new().await;

    // Seed a campaign directly in the store so no dispatch run starts
    let recipients = vec![
        Recipient::new("+15550000001"),
        Recipient::new("+15550000002"),
    ];
    fixture
        .store
        .create_campaign(
            NewCampaign::new("HXpromo", "spring_promo").with_id("camp-idle"),
            &recipients,
        )
        .unwrap();

    let response = fixture.post("/api/v1/campaigns/camp-idle/cancel", json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "cancelled");
    assert_eq!(response.body["cancelled"], 2);
    assert_eq!(response.body["pending"], 0);
    assert_eq!(fixture.gateway.total_calls().await, 0);
}

#[tokio::test]
async fn test_cancel_terminal_campaign_conflicts() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "id": "camp-done",
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": roster_csv(2),
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    fixture.wait_for_status("camp-done", "completed").await;

    let response = fixture.post("/api/v1/campaigns/camp-done/cancel", json!({})).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_unknown_campaign_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture.post("/api/v1/campaigns/nope/cancel", json!({})).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_in_flight_run() {
    let fixture = TestFixture::new().await;

    // Slow the provider so the run is still going when we cancel
    fixture
        .gateway
        .set_latency(std::time::Duration::from_millis(50))
        .await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "id": "camp-cancel",
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": roster_csv(20),
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let response = fixture
        .post("/api/v1/campaigns/camp-cancel/cancel", json!({}))
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let body = fixture.wait_for_status("camp-cancel", "cancelled").await;
    assert_eq!(body["pending"], 0);

    let total = body["sent"].as_u64().unwrap()
        + body["failed"].as_u64().unwrap()
        + body["cancelled"].as_u64().unwrap();
    assert_eq!(total, 20);
    assert!(body["cancelled"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_dispatch_endpoint_resumes_stalled_campaign() {
    let fixture = TestFixture::new().await;

    // Seed a campaign that stalled mid-run: one record already settled,
    // the rest still pending.
    let recipients = vec![
        Recipient::new("+15550000001"),
        Recipient::new("+15550000002"),
        Recipient::new("+15550000003"),
    ];
    fixture
        .store
        .create_campaign(
            NewCampaign::new("HXpromo", "spring_promo").with_id("camp-stalled"),
            &recipients,
        )
        .unwrap();
    fixture
        .store
        .record_attempt("camp-stalled", "+15550000001")
        .unwrap();
    fixture
        .store
        .mark_sent("camp-stalled", "+15550000001", "SMprior")
        .unwrap();
    fixture
        .store
        .set_campaign_status("camp-stalled", CampaignStatus::Stalled)
        .unwrap();

    let response = fixture
        .post("/api/v1/campaigns/camp-stalled/dispatch", json!({}))
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let body = fixture.wait_for_status("camp-stalled", "completed").await;
    assert_eq!(body["sent"], 3);
    assert_eq!(body["pending"], 0);

    // The record that settled before the stall was not resent
    assert_eq!(fixture.gateway.call_count("+15550000001").await, 0);
    assert_eq!(fixture.gateway.total_calls().await, 2);
}

#[tokio::test]
async fn test_dispatch_terminal_campaign_conflicts() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "id": "camp-finished",
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": roster_csv(1),
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    fixture.wait_for_status("camp-finished", "completed").await;

    let response = fixture
        .post("/api/v1/campaigns/camp-finished/dispatch", json!({}))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("current status is completed"));
}

#[tokio::test]
async fn test_dispatch_unknown_campaign_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/campaigns/nope/dispatch", json!({}))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dispatch_while_run_active_conflicts() {
    let fixture = TestFixture::new().await;

    // Slow the provider so the first run is still going
    fixture
        .gateway
        .set_latency(std::time::Duration::from_millis(50))
        .await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "id": "camp-busy",
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": roster_csv(20),
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let response = fixture
        .post("/api/v1/campaigns/camp-busy/dispatch", json!({}))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("already in progress"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_endpoint_redacts_credentials() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["provider"]["account_sid"], "ACtest");
    assert_eq!(response.body["provider"]["auth_token_configured"], true);
    assert!(response.body["provider"].get("auth_token").is_none());
    assert_eq!(response.body["dispatcher"]["workers"], 4);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;

    // Generate some traffic first
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/api/v1/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_snapshot_counts_match_record_truth() {
    let fixture = TestFixture::new().await;

    fixture
        .gateway
        .script(
            "+15550000002",
            vec![
                Err(ProviderError::transient("429: Too Many Requests")),
                Ok("SM-retry-ok".to_string()),
            ],
        )
        .await;

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({
                "id": "camp-retry",
                "template_id": "HXpromo",
                "template_name": "spring_promo",
                "roster_csv": roster_csv(4),
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let body = fixture.wait_for_status("camp-retry", "completed").await;
    assert_eq!(body["sent"], 4);
    assert_eq!(body["failed"], 0);

    // The transient failure cost one extra provider call
    assert_eq!(fixture.gateway.total_calls().await, 5);
    assert_eq!(fixture.gateway.call_count("+15550000002").await, 2);
}
