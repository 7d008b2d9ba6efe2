//! Persisted outbox of notification mails.
//!
//! Operations queue mails here inside their own transactions; the relay in the API
//! service delivers pending messages and records the outcome.

use crate::error::{OrchestratorError, Result};
use crate::portal::{from_timestamp, Portal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub content: String,
}

/// A mail waiting to be queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMail {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub attachment: Option<Attachment>,
}

impl NewMail {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            recipients,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutboxMessage {
    pub id: i64,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Last delivery error
    pub error: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationReceipt {
    pub message_id: i64,
    /// Number of distinct recipients
    pub recipients: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactRequest {
    /// Username of the student to contact
    pub recipient: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BroadcastRequest {
    pub subject: String,
    pub message: String,
    /// Usernames to mail; omit to mail every student
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
}

/// Queue a mail on an open connection or transaction.
pub(crate) async fn enqueue(conn: &mut SqliteConnection, mail: &NewMail) -> Result<i64> {
    let (name, content_type, content) = match &mail.attachment {
        Some(a) => (Some(&a.name), Some(&a.content_type), Some(&a.content)),
        None => (None, None, None),
    };

    let result = sqlx::query(
        "INSERT INTO outbox (subject, body, recipients, attachment_name, attachment_content_type,
            attachment_content, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&mail.subject)
    .bind(&mail.body)
    .bind(serde_json::to_string(&mail.recipients)?)
    .bind(name)
    .bind(content_type)
    .bind(content)
    .bind(Utc::now().timestamp())
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Distinct, non-empty addresses in first-seen order.
fn unique_addresses<I>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = BTreeSet::new();
    addresses
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty() && seen.insert(a.clone()))
        .collect()
}

impl Portal {
    #[instrument(skip(self, mail), fields(subject = %mail.subject))]
    pub async fn queue_mail(&self, mail: NewMail) -> Result<i64> {
        if mail.recipients.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "Mail has no recipients".to_string(),
            ));
        }
        let mut conn = self.pool().acquire().await?;
        enqueue(&mut conn, &mail).await
    }

    /// Every message in the outbox, newest first.
    pub async fn list_outbox(&self) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query_as::<_, OutboxRow>("SELECT * FROM outbox ORDER BY id DESC")
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    /// Unsent messages that have failed fewer than `max_attempts` times, oldest first.
    pub async fn pending_mail(&self, max_attempts: u32, limit: u32) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "SELECT * FROM outbox WHERE sent_at IS NULL AND attempts < ? ORDER BY id LIMIT ?",
        )
        .bind(i64::from(max_attempts))
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    pub async fn mark_mail_sent(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE outbox SET sent_at = ?, attempts = attempts + 1, error = NULL WHERE id = ?",
        )
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn mark_mail_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE outbox SET attempts = attempts + 1, error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Mail the allocation CSV to every student on lab duty.
    #[instrument(skip(self))]
    pub async fn confirm_and_notify(&self) -> Result<NotificationReceipt> {
        let emails: Vec<(String,)> =
            sqlx::query_as("SELECT email FROM students WHERE gs_duty = 1 ORDER BY username")
                .fetch_all(self.pool())
                .await?;
        let recipients = unique_addresses(emails.into_iter().map(|(e,)| e));

        if recipients.is_empty() {
            return Err(OrchestratorError::InvalidState(
                "No student emails found to notify".to_string(),
            ));
        }

        let csv = self.export_allocations_csv().await?;
        let body = format!(
            "Dear Student,\n\n\
             The lab allocations for this semester have been confirmed and are now available \
             in the Teaching Allocation Portal at {url}.\n\n\
             The complete list of allocations is attached for reference. Please review your \
             assignments and let us know if you have any questions.\n\n\
             Best regards,\n\
             Teaching Allocation Portal Team\n",
            url = self.portal_url(),
        );

        let count = recipients.len();
        let mail = NewMail::new("Lab Allocation Results", body, recipients).with_attachment(
            Attachment {
                name: "allocations.csv".to_string(),
                content_type: "text/csv".to_string(),
                content: csv,
            },
        );
        let message_id = self.queue_mail(mail).await?;

        info!("Allocation notification queued for {} addresses", count);
        Ok(NotificationReceipt {
            message_id,
            recipients: count,
        })
    }

    /// Relay a message from one student to another.
    #[instrument(skip(self, req), fields(recipient = %req.recipient))]
    pub async fn contact_student(&self, sender: &str, req: ContactRequest) -> Result<NotificationReceipt> {
        let message = req.message.trim();
        if message.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "Message is required".to_string(),
            ));
        }

        let from = self.get_student(sender).await?;
        let to = self.get_student(req.recipient.trim()).await?;

        let body = format!(
            "Dear {to_name},\n\n\
             You have received a message from {from_name} ({from_email}).\n\n\
             Message from {from_name}:\n\
             {message}\n\n\
             You can access the Teaching Allocation Portal here:\n\
             {url}\n\n\
             Best regards,\n\
             Teaching Allocation Portal Team\n",
            to_name = to.name,
            from_name = from.name,
            from_email = from.email,
            url = self.portal_url(),
        );

        let mail = NewMail::new(
            format!("Teaching Allocation Portal: Message from {}", from.name),
            body,
            vec![to.email],
        );
        let message_id = self.queue_mail(mail).await?;

        Ok(NotificationReceipt {
            message_id,
            recipients: 1,
        })
    }

    /// Mail every student, or the listed ones. Unknown usernames are skipped.
    #[instrument(skip(self, req), fields(subject = %req.subject))]
    pub async fn broadcast(&self, req: BroadcastRequest) -> Result<NotificationReceipt> {
        let subject = req.subject.trim();
        let message = req.message.trim();
        if subject.is_empty() || message.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "Subject and message are required".to_string(),
            ));
        }

        let students = self.list_students().await?;
        let addresses: Vec<String> = match &req.recipients {
            None => students.into_iter().map(|s| s.email).collect(),
            Some(usernames) => {
                if usernames.is_empty() {
                    return Err(OrchestratorError::InvalidInput(
                        "At least one student must be selected".to_string(),
                    ));
                }
                students
                    .into_iter()
                    .filter(|s| usernames.iter().any(|u| u.trim() == s.username))
                    .map(|s| s.email)
                    .collect()
            }
        };

        let recipients = unique_addresses(addresses);
        if recipients.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "No valid student emails found".to_string(),
            ));
        }

        let count = recipients.len();
        let message_id = self
            .queue_mail(NewMail::new(subject, message, recipients))
            .await?;

        info!("Broadcast queued for {} students", count);
        Ok(NotificationReceipt {
            message_id,
            recipients: count,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    subject: String,
    body: String,
    recipients: String,
    attachment_name: Option<String>,
    attachment_content_type: Option<String>,
    attachment_content: Option<String>,
    created_at: i64,
    sent_at: Option<i64>,
    error: Option<String>,
    attempts: i64,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = OrchestratorError;

    fn try_from(row: OutboxRow) -> Result<Self> {
        let attachment = match (
            row.attachment_name,
            row.attachment_content_type,
            row.attachment_content,
        ) {
            (Some(name), Some(content_type), Some(content)) => Some(Attachment {
                name,
                content_type,
                content,
            }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            subject: row.subject,
            body: row.body,
            recipients: serde_json::from_str(&row.recipients)?,
            attachment,
            created_at: from_timestamp(row.created_at),
            sent_at: row.sent_at.map(from_timestamp),
            error: row.error,
            attempts: u32::try_from(row.attempts).unwrap_or_default(),
        })
    }
}
