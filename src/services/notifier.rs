//! services/notifier.rs
//! Avisos por email al operador (best-effort).

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

use crate::config::app_config::SmtpConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subject: String,
    pub html: String,
}

impl Notification {
    pub fn campaign_error(
        campaign_name: &str,
        instantly_campaign_id: &str,
        campaign_id: &str,
        lead_email: &str,
        reason: &str,
    ) -> Self {
        Notification {
            subject: format!("[instantly-service] Campaign error: {}", campaign_name),
            html: format!(
                "<p>An Instantly campaign stopped sending and was moved to <b>error</b>.</p>\
                 <ul>\
                 <li>Instantly campaign: {}</li>\
                 <li>Campaign: {}</li>\
                 <li>Lead: {}</li>\
                 <li>Reason: {}</li>\
                 </ul>\
                 <p>Outstanding provisioned costs were cancelled.</p>",
                instantly_campaign_id, campaign_id, lead_email, reason
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(cfg: &SmtpConfig) -> Result<Self> {
        let tls_params = TlsParameters::new(cfg.host.clone())?;
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.user.clone(), cfg.pass.clone()))
            .tls(Tls::Required(tls_params))
            .build();

        Ok(Self {
            mailer,
            from: format!("Instantly Service <{}>", cfg.user)
                .parse()
                .context("Invalid from address")?,
            to: cfg
                .operator_email
                .parse()
                .context("Invalid operator address")?,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let html_part = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(notification.html.clone());

        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(&notification.subject)
            .singlepart(html_part)?;

        tokio::time::timeout(Duration::from_secs(30), self.mailer.send(message))
            .await
            .context("Timeout sending notification")??;

        Ok(())
    }
}

/// Se usa cuando no hay SMTP configurado.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        log::warn!(
            "(notify) SMTP not configured, notification only logged: {}",
            notification.subject
        );
        Ok(())
    }
}
