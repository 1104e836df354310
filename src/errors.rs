//! errors.rs
//! Errores que ve el cliente HTTP, más los errores tipados de los clientes externos.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Errores con los que puede responder un handler.
#[derive(Debug, Error)]
pub enum AppError {
    /// Body mal formado o inválido. No se reintenta nunca.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Falta la credencial del servicio, o el webhook trae una campaña desconocida.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// La organización no tiene key de Instantly configurada.
    #[error("Instantly API key not configured for organization {0}")]
    MissingCredential(String),

    #[error("No sending accounts available in Instantly")]
    NoAccounts,

    #[error("Campaign creation failed after {attempts} retry attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::MissingCredential(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NoAccounts
            | AppError::RetriesExhausted { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::Validation(_) => "Invalid request",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::MissingCredential(_) => "Instantly API key not configured",
            AppError::NoAccounts
            | AppError::RetriesExhausted { .. }
            | AppError::Internal(_) => "Internal server error",
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": error,
            "details": format!("{:#}", self),
        }))
    }
}

/// No se pudo resolver la key de Instantly.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no Instantly key configured for {0}")]
    NotConfigured(String),

    #[error("key service unavailable: {0:#}")]
    Unavailable(anyhow::Error),
}

impl From<CredentialError> for AppError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::NotConfigured(org) => AppError::MissingCredential(org),
            CredentialError::Unavailable(inner) => {
                AppError::Internal(inner.context("Failed to resolve Instantly API key"))
            }
        }
    }
}

/// Errores del cliente HTTP de Instantly.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Instantly API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Instantly request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected Instantly response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Rate limit, 5xx y problemas de conexión: vale la pena reintentar.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Http { status, .. } => *status == 429 || *status >= 500,
            PlatformError::Transport(_) => true,
            PlatformError::Decode(_) => false,
        }
    }
}
