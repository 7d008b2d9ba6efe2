use crate::error::{OrchestratorError, Result};
use crate::portal::Portal;
use tracing::instrument;

pub const EXPORT_HEADER: [&str; 11] = [
    "Course Code",
    "Course Name",
    "Lab Category",
    "Lab Hours",
    "Lab Weeks",
    "Lab Group",
    "Lab Day",
    "Lab Time",
    "Lab Venue",
    "Lab Teaching Week",
    "Student Assigned",
];

pub const NOT_ASSIGNED: &str = "Not Assigned";

#[derive(sqlx::FromRow)]
struct ExportRow {
    code: String,
    title: String,
    lab_cat: String,
    hours: i64,
    weeks: i64,
    lab_group: String,
    day: String,
    time: String,
    venue: String,
    teaching_weeks: String,
    student_name: Option<String>,
}

impl Portal {
    /// Allocation table as CSV, one row per lab session.
    #[instrument(skip(self))]
    pub async fn export_allocations_csv(&self) -> Result<String> {
        let rows = sqlx::query_as::<_, ExportRow>(
            "SELECT c.code, c.title, c.lab_cat, c.hours, c.weeks,
                    l.lab_group, l.day, l.time, l.venue, l.teaching_weeks,
                    s.name AS student_name
             FROM courses c
             JOIN labs l ON l.course_code = c.code
             LEFT JOIN assignments a ON a.lab_id = l.id
             LEFT JOIN students s ON s.username = a.student
             ORDER BY c.code, l.id",
        )
        .fetch_all(self.pool())
        .await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(EXPORT_HEADER)?;

        for row in rows {
            let weeks: Vec<u8> = serde_json::from_str(&row.teaching_weeks)?;
            let weeks = weeks
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(", ");

            writer.write_record([
                row.code,
                row.title,
                row.lab_cat,
                row.hours.to_string(),
                row.weeks.to_string(),
                row.lab_group,
                row.day,
                row.time,
                row.venue,
                weeks,
                row.student_name.unwrap_or_else(|| NOT_ASSIGNED.to_string()),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| OrchestratorError::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| OrchestratorError::InvalidState(e.to_string()))
    }
}
