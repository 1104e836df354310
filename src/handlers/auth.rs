//! handlers/auth.rs
//! Chequeo de la credencial del servicio para los endpoints internos.

use actix_web::HttpRequest;

use crate::{config::app_config::AppConfig, errors::AppError};

pub const API_KEY_HEADER: &str = "X-API-Key";

pub fn authorize(req: &HttpRequest, config: &AppConfig) -> Result<(), AppError> {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == config.service_api_key => Ok(()),
        Some(_) => Err(AppError::Unauthorized("Invalid API key".to_string())),
        None => Err(AppError::Unauthorized(format!("Missing {} header", API_KEY_HEADER))),
    }
}
