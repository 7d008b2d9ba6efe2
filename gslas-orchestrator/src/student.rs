use crate::error::{OrchestratorError, Result};
use crate::notification::{enqueue, NewMail};
use crate::portal::{from_timestamp, Portal};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument};
use utoipa::ToSchema;

pub(crate) const NOT_SET: &str = "Not Set";

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("Invalid username regex")
});

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex"));

static MATRICULATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0[1-9]|1[0-2])/\d{4}$").expect("Invalid matriculation date regex")
});

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Student {
    pub username: String,
    pub name: String,
    pub email: String,
    pub supervisor: String,
    pub bachelor_degree: String,
    /// `MM/YYYY`, or `Not Set`
    pub matriculation_date: String,
    /// Whether the student takes lab duty this semester
    pub gs_duty: bool,
    /// Number of lab groups the student should teach
    pub lab_load: u32,
    /// Course codes the student has taught before
    pub past_courses: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterStudentRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub supervisor: String,
    #[serde(default)]
    pub bachelor_degree: String,
    pub matriculation_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SemesterInfoRequest {
    pub gs_duty: bool,
    #[serde(default)]
    pub lab_load: u32,
    #[serde(default)]
    pub past_courses: Vec<String>,
}

fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

fn or_not_set(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        NOT_SET.to_string()
    } else {
        value.to_string()
    }
}

fn validate_email(email: &str) -> Result<()> {
    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidInput(format!(
            "Invalid email address: {}",
            email
        )))
    }
}

impl Portal {
    /// Register a student and queue the welcome mail.
    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn register_student(&self, req: RegisterStudentRequest) -> Result<Student> {
        let username = req.username.trim();
        if !USERNAME_REGEX.is_match(username) {
            return Err(OrchestratorError::InvalidInput(format!(
                "Invalid username: {}",
                req.username
            )));
        }
        let email = req.email.trim();
        validate_email(email)?;
        let name = full_name(&req.first_name, &req.last_name);
        if name.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "Student name is required".to_string(),
            ));
        }

        let mut tx = self.pool().begin().await?;

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT username FROM students WHERE username = ?")
                .bind(username)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_some() {
            return Err(OrchestratorError::InvalidInput(format!(
                "Student {} already exists",
                username
            )));
        }

        sqlx::query(
            "INSERT INTO students (username, name, email, supervisor, bachelor_degree, matriculation_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(&name)
        .bind(email)
        .bind(NOT_SET)
        .bind(NOT_SET)
        .bind(NOT_SET)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        let body = format!(
            "Dear {name},\n\n\
             An account has been created for you on the Teaching Allocation Portal.\n\
             Please visit the portal to complete your profile and semester information:\n\
             {url}\n\n\
             Your username is: {username}\n\n\
             Best regards,\n\
             Teaching Allocation Portal Team\n",
            url = self.portal_url(),
        );
        enqueue(
            &mut *tx,
            &NewMail::new(
                "Account Created on Teaching Allocation Portal",
                body,
                vec![email.to_string()],
            ),
        )
        .await?;

        tx.commit().await?;
        info!("Registered student {}", username);

        self.get_student(username).await
    }

    pub async fn list_students(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query_as::<_, StudentRow>("SELECT * FROM students ORDER BY name, username")
            .fetch_all(self.pool())
            .await?;

        let links: Vec<(String, String)> = sqlx::query_as(
            "SELECT student, course_code FROM past_courses ORDER BY course_code",
        )
        .fetch_all(self.pool())
        .await?;
        let mut past: HashMap<String, Vec<String>> = HashMap::new();
        for (student, course) in links {
            past.entry(student).or_default().push(course);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let courses = past.remove(&row.username).unwrap_or_default();
                row.into_student(courses)
            })
            .collect())
    }

    pub async fn get_student(&self, username: &str) -> Result<Student> {
        let row = sqlx::query_as::<_, StudentRow>("SELECT * FROM students WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("Student {}", username)))?;

        let past: Vec<(String,)> = sqlx::query_as(
            "SELECT course_code FROM past_courses WHERE student = ? ORDER BY course_code",
        )
        .bind(username)
        .fetch_all(self.pool())
        .await?;

        Ok(row.into_student(past.into_iter().map(|(c,)| c).collect()))
    }

    /// Delete a student. Their lab sessions become unassigned.
    #[instrument(skip(self))]
    pub async fn delete_student(&self, username: &str) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "UPDATE labs SET assigned = 0
             WHERE id IN (SELECT lab_id FROM assignments WHERE student = ?)",
        )
        .bind(username)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM students WHERE username = ?")
            .bind(username)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found(format!("Student {}", username)));
        }

        tx.commit().await?;
        info!("Deleted student {}", username);
        Ok(())
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(&self, username: &str, req: UpdateProfileRequest) -> Result<Student> {
        let email = req.email.trim();
        validate_email(email)?;
        let matriculation_date = req.matriculation_date.trim();
        if !MATRICULATION_REGEX.is_match(matriculation_date) {
            return Err(OrchestratorError::InvalidInput(
                "Matriculation date must be in MM/YYYY format (valid months: 01-12)".to_string(),
            ));
        }
        let name = full_name(&req.first_name, &req.last_name);
        if name.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "Student name is required".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE students
             SET name = ?, email = ?, supervisor = ?, bachelor_degree = ?, matriculation_date = ?
             WHERE username = ?",
        )
        .bind(&name)
        .bind(email)
        .bind(or_not_set(&req.supervisor))
        .bind(or_not_set(&req.bachelor_degree))
        .bind(matriculation_date)
        .bind(username)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found(format!("Student {}", username)));
        }

        self.get_student(username).await
    }

    /// Record lab duty, load and previously taught courses for the semester.
    ///
    /// Opting out of lab duty sets the load to zero.
    #[instrument(skip(self, req), fields(gs_duty = req.gs_duty))]
    pub async fn submit_semester_info(
        &self,
        username: &str,
        req: SemesterInfoRequest,
    ) -> Result<Student> {
        let lab_load = if req.gs_duty { req.lab_load } else { 0 };

        let mut past_courses = req.past_courses.clone();
        past_courses.sort();
        past_courses.dedup();

        let mut tx = self.pool().begin().await?;

        let mut unknown = Vec::new();
        for code in &past_courses {
            let found: Option<(String,)> = sqlx::query_as("SELECT code FROM courses WHERE code = ?")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?;
            if found.is_none() {
                unknown.push(format!("Unknown course: {}", code));
            }
        }
        if !unknown.is_empty() {
            return Err(OrchestratorError::Validation(unknown));
        }

        let result = sqlx::query("UPDATE students SET gs_duty = ?, lab_load = ? WHERE username = ?")
            .bind(req.gs_duty)
            .bind(i64::from(lab_load))
            .bind(username)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found(format!("Student {}", username)));
        }

        sqlx::query("DELETE FROM past_courses WHERE student = ?")
            .bind(username)
            .execute(&mut *tx)
            .await?;
        for code in &past_courses {
            sqlx::query("INSERT INTO past_courses (student, course_code) VALUES (?, ?)")
                .bind(username)
                .bind(code)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_student(username).await
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct StudentRow {
    pub username: String,
    pub name: String,
    pub email: String,
    pub supervisor: String,
    pub bachelor_degree: String,
    pub matriculation_date: String,
    pub gs_duty: bool,
    pub lab_load: i64,
    pub created_at: i64,
}

impl StudentRow {
    fn into_student(self, past_courses: Vec<String>) -> Student {
        Student {
            username: self.username,
            name: self.name,
            email: self.email,
            supervisor: self.supervisor,
            bachelor_degree: self.bachelor_degree,
            matriculation_date: self.matriculation_date,
            gs_duty: self.gs_duty,
            lab_load: u32::try_from(self.lab_load).unwrap_or_default(),
            past_courses,
            created_at: from_timestamp(self.created_at),
        }
    }
}
