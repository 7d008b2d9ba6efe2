use crate::course::resolve_course_code;
use crate::error::{OrchestratorError, Result};
use crate::notification::{enqueue, NewMail};
use crate::portal::{from_timestamp, Portal};
use chrono::{DateTime, Utc};
use gslas_allocator::{Availability, CourseLock, Slot};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

pub const MAX_UNAVAILABLE_SLOTS: usize = 8;
pub const MAX_TEACHING_DAYS: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SpecialRequest {
    pub id: i64,
    pub student: String,
    pub student_name: String,
    /// Course the student agreed with faculty to teach
    pub course_lock: Option<String>,
    pub lab_groups_locked: u32,
    pub faculty_contact: String,
    /// Half days the student cannot teach, e.g. `Mon-AM`
    pub unavailable_slots: Vec<String>,
    pub max_teaching_days: u8,
    pub justification: String,
    pub course_lock_approved: bool,
    pub availability_approved: bool,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub admin_comments: String,
}

impl SpecialRequest {
    /// Whether the request asks for any availability limit.
    pub fn has_availability_limits(&self) -> bool {
        !self.unavailable_slots.is_empty() || self.max_teaching_days < MAX_TEACHING_DAYS
    }

    /// Approved availability limits, if any.
    pub fn approved_availability(&self) -> Option<Availability> {
        if !self.availability_approved {
            return None;
        }
        Some(Availability {
            max_teaching_days: self.max_teaching_days,
            unavailable: self
                .unavailable_slots
                .iter()
                .filter_map(|slot| slot.parse::<Slot>().ok())
                .collect(),
        })
    }

    /// Approved course lock, if any.
    pub fn approved_course_lock(&self) -> Option<CourseLock> {
        match &self.course_lock {
            Some(course) if self.course_lock_approved && self.lab_groups_locked > 0 => {
                Some(CourseLock {
                    course: course.clone(),
                    groups: self.lab_groups_locked,
                })
            }
            _ => None,
        }
    }
}

fn default_max_teaching_days() -> u8 {
    MAX_TEACHING_DAYS
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SpecialRequestSubmission {
    /// Course code or short code; omit for no course lock
    #[serde(default)]
    pub course_lock: Option<String>,
    #[serde(default)]
    pub lab_groups_locked: u32,
    #[serde(default)]
    pub faculty_contact: String,
    #[serde(default)]
    pub unavailable_slots: Vec<String>,
    #[serde(default = "default_max_teaching_days")]
    pub max_teaching_days: u8,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub course_lock_approved: bool,
    pub availability_approved: bool,
    #[serde(default)]
    pub admin_comments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewOutcome {
    pub request: SpecialRequest,
    /// Parts of the request that were not approved
    pub rejected_parts: Vec<String>,
    /// Whether a review-outcome mail was queued
    pub notified: bool,
}

const SELECT_REQUESTS: &str = "SELECT r.*, s.name AS student_name
     FROM special_requests r
     JOIN students s ON s.username = r.student";

/// Normalise the requested slots, rejecting unknown values.
fn parse_slots(slots: &[String]) -> std::result::Result<Vec<String>, Vec<String>> {
    let mut errors = Vec::new();
    let mut parsed: Vec<Slot> = Vec::new();

    for raw in slots {
        match raw.trim().parse::<Slot>() {
            Ok(slot) if !parsed.contains(&slot) => parsed.push(slot),
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }
    }
    if parsed.len() > MAX_UNAVAILABLE_SLOTS {
        errors.push(format!(
            "You can only select up to {} unavailable slots.",
            MAX_UNAVAILABLE_SLOTS
        ));
    }

    if errors.is_empty() {
        Ok(parsed.iter().map(Slot::to_string).collect())
    } else {
        Err(errors)
    }
}

impl Portal {
    /// Submit or resubmit a student's special request. Earlier approvals are reset.
    #[instrument(skip(self, req))]
    pub async fn submit_special_request(
        &self,
        username: &str,
        req: SpecialRequestSubmission,
    ) -> Result<SpecialRequest> {
        let student = self.get_student(username).await?;
        let mut errors = Vec::new();

        let slots = parse_slots(&req.unavailable_slots).unwrap_or_else(|e| {
            errors.extend(e);
            Vec::new()
        });

        if !(1..=MAX_TEACHING_DAYS).contains(&req.max_teaching_days) {
            errors.push(format!(
                "Max teaching days must be between 1 and {}",
                MAX_TEACHING_DAYS
            ));
        }
        let limited = !req.unavailable_slots.is_empty() || req.max_teaching_days < MAX_TEACHING_DAYS;
        if limited && req.justification.trim().is_empty() {
            errors.push("Justification is required when constraints are applied.".to_string());
        }

        let lock_key = req
            .course_lock
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());

        let mut conn = self.pool().acquire().await?;
        let (course_lock, lab_groups_locked, faculty_contact) = match lock_key {
            None => (None, 0, String::new()),
            Some(key) => {
                let code = resolve_course_code(&mut conn, key).await?;
                if code.is_none() {
                    errors.push(format!("Unknown course: {}", key));
                }
                if req.lab_groups_locked < 1 || req.lab_groups_locked > student.lab_load {
                    errors.push(format!(
                        "Lab groups locked must be between 1 and your lab load ({})",
                        student.lab_load
                    ));
                }
                if req.faculty_contact.trim().is_empty() {
                    errors.push("Faculty contact is required when a course is selected".to_string());
                }
                (code, req.lab_groups_locked, req.faculty_contact.trim().to_string())
            }
        };
        drop(conn);

        if !errors.is_empty() {
            return Err(OrchestratorError::Validation(errors));
        }

        sqlx::query(
            "INSERT INTO special_requests (student, course_lock, lab_groups_locked, faculty_contact,
                unavailable_slots, max_teaching_days, justification, course_lock_approved,
                availability_approved, submitted_at, reviewed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?, NULL)
             ON CONFLICT(student) DO UPDATE SET
                course_lock = excluded.course_lock,
                lab_groups_locked = excluded.lab_groups_locked,
                faculty_contact = excluded.faculty_contact,
                unavailable_slots = excluded.unavailable_slots,
                max_teaching_days = excluded.max_teaching_days,
                justification = excluded.justification,
                course_lock_approved = 0,
                availability_approved = 0,
                submitted_at = excluded.submitted_at,
                reviewed_at = NULL",
        )
        .bind(username)
        .bind(&course_lock)
        .bind(i64::from(lab_groups_locked))
        .bind(&faculty_contact)
        .bind(serde_json::to_string(&slots)?)
        .bind(i64::from(req.max_teaching_days))
        .bind(req.justification.trim())
        .bind(Utc::now().timestamp())
        .execute(self.pool())
        .await?;

        info!("Special request submitted by {}", username);

        self.get_special_request(username)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("Special request of {}", username)))
    }

    pub async fn get_special_request(&self, username: &str) -> Result<Option<SpecialRequest>> {
        let row = sqlx::query_as::<_, SpecialRequestRow>(&format!(
            "{} WHERE r.student = ?",
            SELECT_REQUESTS
        ))
        .bind(username)
        .fetch_optional(self.pool())
        .await?;

        row.map(SpecialRequest::try_from).transpose()
    }

    pub async fn list_special_requests(&self) -> Result<Vec<SpecialRequest>> {
        let rows = sqlx::query_as::<_, SpecialRequestRow>(&format!(
            "{} ORDER BY r.submitted_at DESC, r.id",
            SELECT_REQUESTS
        ))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(SpecialRequest::try_from).collect()
    }

    async fn special_request_by_id(&self, id: i64) -> Result<SpecialRequest> {
        let row = sqlx::query_as::<_, SpecialRequestRow>(&format!("{} WHERE r.id = ?", SELECT_REQUESTS))
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("Special request {}", id)))?;

        row.try_into()
    }

    /// Record the admin's decision. A mail is queued when any requested part is rejected.
    #[instrument(skip(self, review))]
    pub async fn review_special_request(&self, id: i64, review: ReviewRequest) -> Result<ReviewOutcome> {
        let current = self.special_request_by_id(id).await?;
        let email: (String,) = sqlx::query_as("SELECT email FROM students WHERE username = ?")
            .bind(&current.student)
            .fetch_one(self.pool())
            .await?;

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "UPDATE special_requests
             SET course_lock_approved = ?, availability_approved = ?, admin_comments = ?, reviewed_at = ?
             WHERE id = ?",
        )
        .bind(review.course_lock_approved)
        .bind(review.availability_approved)
        .bind(review.admin_comments.trim())
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let reviewed = SpecialRequest {
            course_lock_approved: review.course_lock_approved,
            availability_approved: review.availability_approved,
            admin_comments: review.admin_comments.trim().to_string(),
            ..current
        };

        let mut rejected_parts = Vec::new();
        if reviewed.course_lock.is_some() && !reviewed.course_lock_approved {
            rejected_parts.push("Course Lock Request".to_string());
        }
        if reviewed.has_availability_limits() && !reviewed.availability_approved {
            rejected_parts.push("Availability Request".to_string());
        }

        let notified = !rejected_parts.is_empty();
        if notified {
            let mail = NewMail::new(
                format!("Special Request #{} Review Outcome", id),
                review_outcome_body(&reviewed, &rejected_parts),
                vec![email.0],
            );
            enqueue(&mut tx, &mail).await?;
        }

        tx.commit().await?;
        info!(
            "Reviewed special request {} (rejected parts: {})",
            id,
            rejected_parts.len()
        );

        Ok(ReviewOutcome {
            request: self.special_request_by_id(id).await?,
            rejected_parts,
            notified,
        })
    }
}

fn review_outcome_body(request: &SpecialRequest, rejected_parts: &[String]) -> String {
    let course_lock = match &request.course_lock {
        Some(course) => format!("Course Lock Requested: {}", course),
        None => "No Course Lock Requested".to_string(),
    };
    let slots = if request.unavailable_slots.is_empty() {
        "None".to_string()
    } else {
        request.unavailable_slots.join(", ")
    };
    let comments = if request.admin_comments.is_empty() {
        String::new()
    } else {
        format!("\n\nComments from Admin:\n{}", request.admin_comments)
    };

    format!(
        "Dear {name},\n\n\
         Your Special Request (ID: {id}) has been reviewed.\n\n\
         {course_lock}\n\
         Unavailable Slots: {slots}\n\
         Max Teaching Days: {days}\n\n\
         The following part(s) of your special request were not approved: {rejected}.\
         {comments}\n\n\
         To have them reviewed again, resubmit the special request with a fuller justification \
         or different entries. A resubmission is evaluated as a whole, so include any part that \
         was approved before. Approved parts of this request still apply if you do not resubmit.\n\n\
         Best regards,\n\
         Teaching Allocation Portal Team\n",
        name = request.student_name,
        id = request.id,
        days = request.max_teaching_days,
        rejected = rejected_parts.join(", "),
    )
}

#[derive(sqlx::FromRow)]
struct SpecialRequestRow {
    id: i64,
    student: String,
    student_name: String,
    course_lock: Option<String>,
    lab_groups_locked: i64,
    faculty_contact: String,
    unavailable_slots: String,
    max_teaching_days: i64,
    justification: String,
    course_lock_approved: bool,
    availability_approved: bool,
    submitted_at: i64,
    reviewed_at: Option<i64>,
    admin_comments: String,
}

impl TryFrom<SpecialRequestRow> for SpecialRequest {
    type Error = OrchestratorError;

    fn try_from(row: SpecialRequestRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            student: row.student,
            student_name: row.student_name,
            course_lock: row.course_lock,
            lab_groups_locked: u32::try_from(row.lab_groups_locked).unwrap_or_default(),
            faculty_contact: row.faculty_contact,
            unavailable_slots: serde_json::from_str(&row.unavailable_slots)?,
            max_teaching_days: u8::try_from(row.max_teaching_days).unwrap_or(MAX_TEACHING_DAYS),
            justification: row.justification,
            course_lock_approved: row.course_lock_approved,
            availability_approved: row.availability_approved,
            submitted_at: from_timestamp(row.submitted_at),
            reviewed_at: row.reviewed_at.map(from_timestamp),
            admin_comments: row.admin_comments,
        })
    }
}
