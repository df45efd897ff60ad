//! Outbound mail over an authenticated STARTTLS SMTP relay

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use super::MailProvider;
use crate::{config::UpstreamConfig, errors::ToolError};

struct Relay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

pub struct SmtpMailer {
    relay: Option<Relay>,
}

impl SmtpMailer {
    /// Builds the relay when `SENDER_MAIL` and `MAIL_PASS` are both configured. The
    /// connection itself is only opened on the first send.
    pub fn from_config(config: &UpstreamConfig) -> Self {
        let (Some(sender_mail), Some(password)) = (&config.sender_mail, &config.mail_password)
        else {
            return Self { relay: None };
        };

        let sender = match sender_mail.parse::<Mailbox>() {
            Ok(sender) => sender,
            Err(err) => {
                warn!(error = %err, "SENDER_MAIL is not a valid address, mail disabled");
                return Self { relay: None };
            }
        };

        let transport = match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(
            &config.smtp_host,
        ) {
            Ok(builder) => builder
                .credentials(Credentials::new(sender_mail.clone(), password.clone()))
                .build(),
            Err(err) => {
                warn!(error = %err, host = %config.smtp_host, "smtp relay unusable, mail disabled");
                return Self { relay: None };
            }
        };

        Self {
            relay: Some(Relay { transport, sender }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.relay.is_some()
    }
}

#[async_trait]
impl MailProvider for SmtpMailer {
    async fn send_mail(
        &self,
        subject: &str,
        message: &str,
        receiver: &str,
    ) -> Result<bool, ToolError> {
        let Some(relay) = &self.relay else {
            return Err(ToolError::not_configured("mail relay"));
        };

        let receiver: Mailbox = receiver.trim().parse().map_err(|_| {
            ToolError::InvalidParams(format!("receiver `{receiver}` is not a mail address"))
        })?;

        let email = Message::builder()
            .from(relay.sender.clone())
            .to(receiver.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .map_err(|err| ToolError::Unhandled(format!("failed to build mail: {err}")))?;

        match relay.transport.send(email).await {
            Ok(_) => {
                info!(receiver = %receiver, "mail sent");
                Ok(true)
            }
            Err(err) if err.is_permanent() => {
                warn!(receiver = %receiver, error = %err, "mail rejected by relay");
                Ok(false)
            }
            Err(err) => Err(ToolError::upstream("mail relay", err.to_string())),
        }
    }
}
