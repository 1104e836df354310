//! tests/handler_tests.rs
//! Capa HTTP: credenciales, códigos de estado y bodies de respuesta.

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};

use crate::{
    app,
    config::app_config::AppConfig,
    handlers::auth::API_KEY_HEADER,
    tests::support::{send_request, Harness, MISSING_ORG},
};

const KEY: &str = "test-service-key";

macro_rules! service {
    ($h:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppConfig::for_tests()))
                .app_data(web::Data::new($h.orchestrator.clone()))
                .app_data(web::Data::new($h.reconciler.clone()))
                .app_data(web::Data::new($h.poller.clone()))
                .configure(app::init_app),
        )
        .await
    };
}

fn send_body(campaign_id: &str, org_id: &str, steps: usize) -> Value {
    let sequence: Vec<Value> = (1..=steps)
        .map(|i| json!({ "step": i, "bodyHtml": format!("<p>{}</p>", i), "daysSinceLastStep": 1 }))
        .collect();
    json!({
        "orgId": org_id,
        "brandId": "brand_1",
        "appId": "app_1",
        "runId": "run_parent",
        "campaignId": campaign_id,
        "to": "lead@example.com",
        "subject": "Hello",
        "sequence": sequence,
    })
}

#[actix_rt::test]
async fn send_requires_api_key() {
    let h = Harness::new().await;
    let svc = service!(h);

    let req = test::TestRequest::post()
        .uri("/send")
        .set_json(send_body("camp_1", "org_1", 1))
        .to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/send")
        .insert_header((API_KEY_HEADER, "wrong"))
        .set_json(send_body("camp_1", "org_1", 1))
        .to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.platform.created_count(), 0);
}

#[actix_rt::test]
async fn send_succeeds_then_reports_existing() {
    let h = Harness::new().await;
    let svc = service!(h);

    let req = test::TestRequest::post()
        .uri("/send")
        .insert_header((API_KEY_HEADER, KEY))
        .set_json(send_body("camp_1", "org_1", 2))
        .to_request();
    let body: Value = test::call_and_read_body_json(&svc, req).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["added"], json!(1));
    assert_eq!(body["campaignId"], json!("camp_1"));
    assert!(body["leadId"].is_string());
    assert_eq!(body["stepRuns"].as_array().map(Vec::len), Some(2));

    let req = test::TestRequest::post()
        .uri("/send")
        .insert_header((API_KEY_HEADER, KEY))
        .set_json(send_body("camp_1", "org_1", 2))
        .to_request();
    let body: Value = test::call_and_read_body_json(&svc, req).await;
    assert_eq!(body["added"], json!(0));
    assert!(body.get("leadId").is_none());
}

#[actix_rt::test]
async fn send_without_org_key_is_unprocessable() {
    let h = Harness::new().await;
    let svc = service!(h);

    let req = test::TestRequest::post()
        .uri("/send")
        .insert_header((API_KEY_HEADER, KEY))
        .set_json(send_body("camp_1", MISSING_ORG, 1))
        .to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_rt::test]
async fn send_rejects_bad_bodies() {
    let h = Harness::new().await;
    let svc = service!(h);

    let req = test::TestRequest::post()
        .uri("/send")
        .insert_header((API_KEY_HEADER, KEY))
        .set_json(send_body("camp_1", "org_1", 0))
        .to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/send")
        .insert_header((API_KEY_HEADER, KEY))
        .insert_header(("content-type", "application/json"))
        .set_payload("{ not json")
        .to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], json!("Invalid request"));
}

#[actix_rt::test]
async fn webhook_status_codes() {
    let h = Harness::new().await;
    h.orchestrator
        .send(send_request("camp_1", "lead@example.com", 2))
        .await
        .expect("send");
    let svc = service!(h);

    let req = test::TestRequest::post()
        .uri("/webhooks/instantly")
        .set_json(json!({ "event_type": "email_opened" }))
        .to_request();
    assert_eq!(test::call_service(&svc, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/webhooks/instantly")
        .set_json(json!({ "event_type": "email_opened", "campaign_id": "nope" }))
        .to_request();
    assert_eq!(test::call_service(&svc, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/webhooks/instantly")
        .set_json(json!({
            "event_type": "email_opened",
            "campaign_id": "inst_1",
            "lead_email": "lead@example.com"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&svc, req).await;
    assert_eq!(body, json!({ "success": true, "eventType": "email_opened" }));
}

#[actix_rt::test]
async fn webhook_config_lists_public_url() {
    let h = Harness::new().await;
    let svc = service!(h);

    let req = test::TestRequest::get().uri("/webhooks/instantly/config").to_request();
    assert_eq!(test::call_service(&svc, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/webhooks/instantly/config")
        .insert_header((API_KEY_HEADER, KEY))
        .to_request();
    let body: Value = test::call_and_read_body_json(&svc, req).await;
    assert_eq!(
        body["webhookUrl"],
        json!("https://instantly.example.com/webhooks/instantly")
    );
    assert!(body["events"]
        .as_array()
        .map(|e| e.contains(&json!("reply_received")))
        .unwrap_or(false));
}

#[actix_rt::test]
async fn check_status_runs_a_pass() {
    let h = Harness::new().await;
    h.orchestrator
        .send(send_request("camp_1", "lead@example.com", 1))
        .await
        .expect("send");
    h.platform.set_not_sending("inst_1", json!(1));
    let svc = service!(h);

    let req = test::TestRequest::post().uri("/campaigns/check-status").to_request();
    assert_eq!(test::call_service(&svc, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/campaigns/check-status")
        .insert_header((API_KEY_HEADER, KEY))
        .to_request();
    let body: Value = test::call_and_read_body_json(&svc, req).await;
    assert_eq!(body["checked"], json!(1));
    assert_eq!(body["errors"][0]["instantlyCampaignId"], json!("inst_1"));
    assert_eq!(body["errors"][0]["leadEmail"], json!("lead@example.com"));
}
