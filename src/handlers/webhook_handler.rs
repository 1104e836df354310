//! handlers/webhook_handler.rs
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde_json::json;

use crate::{
    config::app_config::AppConfig, handlers::auth::authorize,
    services::webhook_reconciler::WebhookReconciler,
};

/// POST /webhooks/instantly
///
/// Sin credencial del servicio: Instantly llama directo y el evento solo
/// se acepta si la campaña la creamos nosotros.
pub async fn instantly_webhook_endpoint(
    reconciler: web::Data<WebhookReconciler>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    match reconciler.ingest(body.into_inner()).await {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => e.error_response(),
    }
}

/// GET /webhooks/instantly/config
pub async fn webhook_config_endpoint(
    req: HttpRequest,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    if let Err(e) = authorize(&req, &config) {
        return e.error_response();
    }

    HttpResponse::Ok().json(json!({
        "webhookUrl": config.webhook_url(),
        "events": [
            "email_sent",
            "email_opened",
            "email_link_clicked",
            "reply_received",
            "auto_reply_received",
            "lead_out_of_office",
            "email_bounced",
            "lead_unsubscribed",
            "lead_not_interested",
            "campaign_completed"
        ]
    }))
}
