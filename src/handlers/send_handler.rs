//! handlers/send_handler.rs
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use crate::{
    config::app_config::AppConfig, handlers::auth::authorize, models::send_model::SendRequest,
    services::send_orchestrator::SendOrchestrator,
};

/// POST /send
pub async fn send_endpoint(
    req: HttpRequest,
    config: web::Data<AppConfig>,
    orchestrator: web::Data<SendOrchestrator>,
    body: web::Json<SendRequest>,
) -> HttpResponse {
    if let Err(e) = authorize(&req, &config) {
        return e.error_response();
    }

    let send_req = body.into_inner();
    log::info!(
        "POST /send campaign={} steps={}",
        send_req.campaign_id,
        send_req.sequence.len()
    );

    match orchestrator.send(send_req).await {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => {
            log::error!("Send failed: {:#}", e);
            e.error_response()
        }
    }
}
