//! handlers/campaign_handler.rs
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use crate::{
    config::app_config::AppConfig, errors::AppError, handlers::auth::authorize,
    services::health_poller::HealthPoller,
};

/// POST /campaigns/check-status
pub async fn check_status_endpoint(
    req: HttpRequest,
    config: web::Data<AppConfig>,
    poller: web::Data<HealthPoller>,
) -> HttpResponse {
    if let Err(e) = authorize(&req, &config) {
        return e.error_response();
    }

    match poller.check_all().await {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => {
            log::error!("Campaign status check failed: {:#}", e);
            AppError::Internal(e).error_response()
        }
    }
}
