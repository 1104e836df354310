//! app.rs
use actix_web::{error::InternalError, web, HttpResponse};
use serde_json::json;

use crate::handlers::{campaign_handler, send_handler, webhook_handler};

/// JSON mal formado responde 400 con la misma forma que los demás errores.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(2 * 1024 * 1024)
        .error_handler(|err, _req| {
            let details = err.to_string();
            InternalError::from_response(
                err,
                HttpResponse::BadRequest().json(json!({
                    "error": "Invalid request",
                    "details": details
                })),
            )
            .into()
        })
}

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/send", web::post().to(send_handler::send_endpoint))
        .service(
            web::scope("/webhooks/instantly")
                .route("", web::post().to(webhook_handler::instantly_webhook_endpoint))
                .route(
                    "/config",
                    web::get().to(webhook_handler::webhook_config_endpoint),
                ),
        )
        .service(web::scope("/campaigns").route(
            "/check-status",
            web::post().to(campaign_handler::check_status_endpoint),
        ));
}
