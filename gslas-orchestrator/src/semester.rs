use crate::error::{OrchestratorError, Result};
use crate::portal::Portal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

/// Literal the admin must type to reset the semester.
pub const RESET_CONFIRMATION: &str = "CONFIRM";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResetSummary {
    pub special_requests: u64,
    pub preferences: u64,
    pub assignments: u64,
    pub past_course_links: u64,
}

impl Portal {
    /// Clear per-semester state. Students, courses and labs are kept.
    #[instrument(skip(self, confirmation))]
    pub async fn reset_semester(&self, confirmation: &str) -> Result<ResetSummary> {
        if confirmation != RESET_CONFIRMATION {
            return Err(OrchestratorError::InvalidInput(format!(
                "You must type '{}' to reset the database.",
                RESET_CONFIRMATION
            )));
        }

        let mut tx = self.pool().begin().await?;

        let special_requests = sqlx::query("DELETE FROM special_requests")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let preferences = sqlx::query("DELETE FROM teaching_preferences")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let assignments = sqlx::query("DELETE FROM assignments")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let past_course_links = sqlx::query("DELETE FROM past_courses")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("UPDATE labs SET assigned = 0")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let summary = ResetSummary {
            special_requests,
            preferences,
            assignments,
            past_course_links,
        };
        info!(?summary, "Semester reset");
        Ok(summary)
    }
}
