//! Background delivery of the notification outbox.
//!
//! Every tick the relay takes pending outbox messages, hands each to a
//! [`MailTransport`] and records the result. The default transport writes
//! RFC 5322 messages into a spool directory for the host MTA to pick up.

use chrono::Utc;
use gslas_orchestrator::{OutboxMessage, Portal};
use sqlx::SqlitePool;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

/// Failed deliveries are retried until this many attempts.
pub const MAX_ATTEMPTS: u32 = 5;

const BATCH_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail spool error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message {0} has no recipients")]
    NoRecipients(i64),
}

pub trait MailTransport: Send + Sync {
    fn deliver(&self, from: &str, message: &OutboxMessage) -> Result<(), MailError>;
}

/// Writes each message as a `.eml` file into a directory.
#[derive(Debug, Clone)]
pub struct SpoolTransport {
    dir: PathBuf,
}

impl SpoolTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MailTransport for SpoolTransport {
    fn deliver(&self, from: &str, message: &OutboxMessage) -> Result<(), MailError> {
        if message.recipients.is_empty() {
            return Err(MailError::NoRecipients(message.id));
        }

        fs::create_dir_all(&self.dir)?;

        // Write under a temporary name so pickup never sees a partial file.
        let name = format!("{:08}.eml", message.id);
        let partial = self.dir.join(format!(".{}.tmp", name));
        fs::write(&partial, render_message(from, message))?;
        fs::rename(&partial, self.dir.join(name))?;

        Ok(())
    }
}

fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Render a message in RFC 5322 form with CRLF line endings.
///
/// A single recipient goes in `To`; several are listed in `Bcc` so students
/// do not see each other's addresses.
pub fn render_message(from: &str, message: &OutboxMessage) -> String {
    let mut out = String::new();
    let recipients = message
        .recipients
        .iter()
        .map(|r| header_value(r))
        .collect::<Vec<_>>()
        .join(", ");

    out.push_str(&format!("From: {}\r\n", header_value(from)));
    if message.recipients.len() == 1 {
        out.push_str(&format!("To: {}\r\n", recipients));
    } else {
        out.push_str("To: undisclosed-recipients:;\r\n");
        out.push_str(&format!("Bcc: {}\r\n", recipients));
    }
    out.push_str(&format!("Subject: {}\r\n", header_value(&message.subject)));
    out.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
    out.push_str(&format!("Message-ID: <outbox-{}@gslas>\r\n", message.id));
    out.push_str("MIME-Version: 1.0\r\n");

    match &message.attachment {
        None => {
            out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
            out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
            out.push_str(&crlf(&message.body));
        }
        Some(attachment) => {
            let boundary = format!("gslas-outbox-{}", message.id);
            let name = header_value(&attachment.name);
            out.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
                boundary
            ));

            out.push_str(&format!("--{}\r\n", boundary));
            out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
            out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
            out.push_str(&crlf(&message.body));
            out.push_str("\r\n");

            out.push_str(&format!("--{}\r\n", boundary));
            out.push_str(&format!(
                "Content-Type: {}; charset=utf-8; name=\"{}\"\r\n",
                header_value(&attachment.content_type),
                name
            ));
            out.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{}\"\r\n",
                name
            ));
            out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
            out.push_str(&crlf(&attachment.content));
            out.push_str(&format!("\r\n--{}--\r\n", boundary));
        }
    }

    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub sent: usize,
    pub failed: usize,
}

pub async fn start_mail_relay_task(
    pool: SqlitePool,
    transport: Arc<dyn MailTransport>,
    from: String,
    interval_secs: u64,
) {
    let portal = Portal::new(pool);
    let interval_secs = interval_secs.max(1);
    let mut interval = interval(Duration::from_secs(interval_secs));

    info!("Mail relay running (checks every {} seconds)", interval_secs);

    loop {
        interval.tick().await;

        match relay_pending(&portal, transport.as_ref(), &from).await {
            Ok(report) if report.sent + report.failed > 0 => {
                info!(
                    "Mail relay: {} sent, {} failed",
                    report.sent, report.failed
                );
            }
            Ok(_) => {}
            Err(e) => error!("Mail relay failed: {}", e),
        }
    }
}

/// Deliver one batch of pending outbox messages.
pub async fn relay_pending(
    portal: &Portal,
    transport: &dyn MailTransport,
    from: &str,
) -> anyhow::Result<RelayReport> {
    let pending = portal.pending_mail(MAX_ATTEMPTS, BATCH_SIZE).await?;
    let mut report = RelayReport::default();

    for message in pending {
        match transport.deliver(from, &message) {
            Ok(()) => {
                portal.mark_mail_sent(message.id).await?;
                report.sent += 1;
            }
            Err(e) => {
                warn!(
                    "Delivery of message {} failed (attempt {}): {}",
                    message.id,
                    message.attempts + 1,
                    e
                );
                portal.mark_mail_failed(message.id, &e.to_string()).await?;
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
