use async_trait::async_trait;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub attachment: Option<MailAttachment>,
}

impl OutgoingMail {
    /// Loose recipient check: non-empty and contains `@`.
    pub fn validate(&self) -> Result<()> {
        let to = self.to.trim();
        if to.is_empty() || !to.contains('@') {
            return Err(AppError::bad_request("recipient must be an email address"));
        }
        if self.subject.trim().is_empty() {
            return Err(AppError::bad_request("subject is required"));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// Delivery through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &Config, host: &str) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?;
        if let Some(port) = config.smtp_port {
            builder = builder.port(port);
        }
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            let creds = Credentials::new(username.to_string(), password.to_string());
            builder = builder.credentials(creds);
        }

        Ok(Self {
            transport: builder.build(),
            from: config.mail_from.parse()?,
        })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message> {
        let to: Mailbox = mail
            .to
            .trim()
            .parse()
            .map_err(|_| AppError::bad_request(format!("invalid recipient `{}`", mail.to)))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.as_str());

        let message = match &mail.attachment {
            Some(attachment) => {
                let content_type = header::ContentType::parse(&attachment.content_type)
                    .map_err(|err| AppError::Mail(err.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(mail.text.clone()))
                        .singlepart(
                            Attachment::new(attachment.filename.clone())
                                .body(attachment.bytes.clone(), content_type),
                        ),
                )
            }
            None => builder
                .header(header::ContentType::TEXT_PLAIN)
                .body(mail.text.clone()),
        };

        message.map_err(|err| AppError::Mail(err.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn kind(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        mail.validate()?;
        let message = self.build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| AppError::Mail(err.to_string()))?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "mail sent");
        Ok(())
    }
}

/// Writes outgoing mail to the log instead of delivering it, and keeps a
/// copy of every message.
#[derive(Default)]
pub struct LogMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        mail.validate()?;
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            attachment = mail.attachment.as_ref().map(|a| a.filename.as_str()),
            "SMTP is not configured, mail logged instead of sent"
        );
        self.sent.lock().await.push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str, subject: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.into(),
            subject: subject.into(),
            text: "Hej".into(),
            attachment: None,
        }
    }

    #[test]
    fn validates_recipient_and_subject() {
        assert!(mail("kalle@bygg.se", "Offert").validate().is_ok());
        assert!(mail("", "Offert").validate().is_err());
        assert!(mail("kalle", "Offert").validate().is_err());
        assert!(mail("kalle@bygg.se", "  ").validate().is_err());
    }

    #[tokio::test]
    async fn log_mailer_keeps_a_copy() {
        let mailer = LogMailer::new();
        mailer.send(&mail("kalle@bygg.se", "Offert")).await.unwrap();
        assert!(mailer.send(&mail("nope", "Offert")).await.is_err());

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "kalle@bygg.se");
    }

    #[tokio::test]
    async fn builds_multipart_message_with_attachment() {
        let config = Config::from_pairs(Vec::new()).unwrap();
        let mailer = SmtpMailer::new(&config, "smtp.example.com").unwrap();
        let mut outgoing = mail("kalle@bygg.se", "Faktura F-2025-0001");
        outgoing.attachment = Some(MailAttachment {
            filename: "F-2025-0001.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.5".to_vec(),
        });

        let message = mailer.build_message(&outgoing).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("F-2025-0001.pdf"));
    }
}
