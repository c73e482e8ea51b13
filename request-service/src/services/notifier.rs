//! Notification delivery.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::config::SmtpConfig;

/// Delivery channel for reminders.
///
/// Ordinary delivery failures are reported as `false`, never as a panic or
/// error, so callers can keep going through their recipient list.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient_id: Uuid,
        subject: &str,
        body: &str,
        recipient_email: &str,
    ) -> bool;
}

/// Sends plain-text email over SMTP with STARTTLS.
pub struct SmtpNotifier {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;

        Ok(Self { from, transport })
    }

    async fn send(&self, subject: &str, body: &str, recipient_email: &str) -> Result<(), AppError> {
        let to: Mailbox = recipient_email
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(
        &self,
        recipient_id: Uuid,
        subject: &str,
        body: &str,
        recipient_email: &str,
    ) -> bool {
        match self.send(subject, body, recipient_email).await {
            Ok(()) => {
                tracing::info!(
                    recipient_id = %recipient_id,
                    to = %recipient_email,
                    subject = %subject,
                    "Email sent successfully"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    recipient_id = %recipient_id,
                    to = %recipient_email,
                    error = %e,
                    "Email delivery failed"
                );
                false
            }
        }
    }
}

/// Used when SMTP is disabled: writes the notification to the log instead.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient_id: Uuid,
        subject: &str,
        body: &str,
        recipient_email: &str,
    ) -> bool {
        tracing::info!(
            recipient_id = %recipient_id,
            to = %recipient_email,
            subject = %subject,
            body = %body,
            "[SMTP DISABLED] Email would be sent"
        );
        true
    }
}
