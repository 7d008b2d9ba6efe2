use crate::error::{OrchestratorError, Result};
use crate::portal::Portal;
use gslas_allocator::{parse_teaching_weeks, parse_time, parse_week_list, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Course {
    /// Full course code, e.g. `SC1003/CZ1003`
    pub code: String,
    /// Part of the code before the first `/`, used in URLs
    pub short_code: String,
    pub title: String,
    pub year: u8,
    /// Lab category, `C` or `D`
    pub lab_cat: String,
    /// Hours per lab session
    pub hours: u32,
    /// Number of teaching weeks
    pub weeks: u32,
    /// Number of lab groups
    pub grp_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseRequest {
    pub code: String,
    pub title: String,
    pub year: u8,
    pub lab_cat: String,
    pub hours: u32,
    pub weeks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCourseRequest {
    pub title: String,
    pub year: u8,
    pub lab_cat: String,
    pub hours: u32,
    pub weeks: u32,
    /// Overrides the group count computed from the labs
    #[serde(default)]
    pub manual_grp_count: Option<u32>,
}

/// One lab session of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Lab {
    pub id: i64,
    pub course_code: String,
    pub group: String,
    /// `MON` to `FRI`
    pub day: String,
    /// `hhmm-hhmm`
    pub time: String,
    pub venue: String,
    pub teaching_weeks: Vec<u8>,
    pub assigned: bool,
}

/// A lab session in an edit set. Sessions with an `id` are updated in place.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LabInput {
    #[serde(default)]
    pub id: Option<i64>,
    pub group: String,
    pub day: String,
    pub time: String,
    pub venue: String,
    /// Comma separated week numbers; empty means every week
    #[serde(default)]
    pub teaching_weeks: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimetableImport {
    /// Lab sessions inserted
    pub inserted: usize,
    /// Courses whose labs were replaced
    pub courses: Vec<String>,
    pub warnings: Vec<String>,
}

const TIMETABLE_COLUMNS: [&str; 7] = ["COURSE", "TYPE", "GROUP", "DAY", "TIME", "VENUE", "REMARK"];

/// Upper bound on the hours of one lab session.
pub const MAX_LAB_HOURS: u32 = 24;

pub fn short_code_of(code: &str) -> &str {
    code.split('/').next().unwrap_or(code)
}

fn validate_course_fields(
    title: &str,
    year: u8,
    lab_cat: &str,
    hours: u32,
    weeks: u32,
) -> Vec<String> {
    let mut errors = Vec::new();
    if title.trim().is_empty() {
        errors.push("Course title is required".to_string());
    }
    if !(1..=3).contains(&year) {
        errors.push("Year must be 1, 2 or 3".to_string());
    }
    if lab_cat != "C" && lab_cat != "D" {
        errors.push("Lab category must be C or D".to_string());
    }
    if !(1..=MAX_LAB_HOURS).contains(&hours) {
        errors.push(format!("Lab hours must be between 1 and {}", MAX_LAB_HOURS));
    }
    if !(1..=13).contains(&weeks) {
        errors.push("Lab weeks must be between 1 and 13".to_string());
    }
    errors
}

/// A validated lab row ready to insert.
struct NewLab {
    id: Option<i64>,
    group: String,
    day: Weekday,
    time: String,
    venue: String,
    weeks: Vec<u8>,
}

impl NewLab {
    fn unique_key(&self) -> (String, Weekday, String, String) {
        (
            self.group.clone(),
            self.day,
            self.time.clone(),
            self.venue.clone(),
        )
    }
}

fn parse_lab(group: &str, day: &str, time: &str, venue: &str, weeks: Vec<u8>) -> Result<NewLab> {
    let group = group.trim();
    let venue = venue.trim();
    if group.is_empty() {
        return Err(OrchestratorError::InvalidInput(
            "Lab group is required".to_string(),
        ));
    }
    if venue.is_empty() {
        return Err(OrchestratorError::InvalidInput(
            "Lab venue is required".to_string(),
        ));
    }

    Ok(NewLab {
        id: None,
        group: group.to_string(),
        day: day.trim().parse()?,
        time: parse_time(time.trim())?.to_string(),
        venue: venue.to_string(),
        weeks,
    })
}

async fn insert_lab(conn: &mut SqliteConnection, course_code: &str, lab: &NewLab) -> Result<()> {
    sqlx::query(
        "INSERT INTO labs (course_code, lab_group, day, time, venue, teaching_weeks)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(course_code)
    .bind(&lab.group)
    .bind(lab.day.code())
    .bind(&lab.time)
    .bind(&lab.venue)
    .bind(serde_json::to_string(&lab.weeks)?)
    .execute(conn)
    .await?;
    Ok(())
}

/// Recompute a course's group count from its labs.
pub(crate) async fn refresh_group_count(conn: &mut SqliteConnection, course_code: &str) -> Result<()> {
    sqlx::query(
        "UPDATE courses
         SET grp_count = (SELECT COUNT(DISTINCT lab_group) FROM labs WHERE course_code = ?)
         WHERE code = ?",
    )
    .bind(course_code)
    .bind(course_code)
    .execute(conn)
    .await?;
    Ok(())
}

/// Resolve a full code or short code to the stored course code.
pub(crate) async fn resolve_course_code(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT code FROM courses WHERE code = ? OR short_code = ? LIMIT 1")
            .bind(key)
            .bind(key)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|(code,)| code))
}

impl Portal {
    #[instrument(skip(self, req), fields(code = %req.code))]
    pub async fn create_course(&self, req: CourseRequest) -> Result<Course> {
        let code = req.code.trim();
        let lab_cat = req.lab_cat.trim().to_uppercase();

        let mut errors = Vec::new();
        if code.is_empty() {
            errors.push("Course code is required".to_string());
        }
        errors.extend(validate_course_fields(
            &req.title, req.year, &lab_cat, req.hours, req.weeks,
        ));
        if !errors.is_empty() {
            return Err(OrchestratorError::Validation(errors));
        }

        let short_code = short_code_of(code);
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT code FROM courses WHERE code = ? OR short_code = ?")
                .bind(code)
                .bind(short_code)
                .fetch_optional(self.pool())
                .await?;
        if let Some((existing,)) = existing {
            return Err(OrchestratorError::InvalidInput(format!(
                "Course {} already exists",
                existing
            )));
        }

        sqlx::query(
            "INSERT INTO courses (code, short_code, title, year, lab_cat, hours, weeks)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(code)
        .bind(short_code)
        .bind(req.title.trim())
        .bind(i64::from(req.year))
        .bind(&lab_cat)
        .bind(i64::from(req.hours))
        .bind(i64::from(req.weeks))
        .execute(self.pool())
        .await?;

        info!("Created course {}", code);
        self.get_course(short_code).await
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query_as::<_, CourseRow>("SELECT * FROM courses ORDER BY code")
            .fetch_all(self.pool())
            .await?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }

    /// Get a course by its short code
    pub async fn get_course(&self, short_code: &str) -> Result<Course> {
        let row = sqlx::query_as::<_, CourseRow>("SELECT * FROM courses WHERE short_code = ?")
            .bind(short_code)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("Course {}", short_code)))?;

        Ok(row.into())
    }

    #[instrument(skip(self, req))]
    pub async fn update_course(&self, short_code: &str, req: UpdateCourseRequest) -> Result<Course> {
        let course = self.get_course(short_code).await?;
        let lab_cat = req.lab_cat.trim().to_uppercase();

        let errors = validate_course_fields(&req.title, req.year, &lab_cat, req.hours, req.weeks);
        if !errors.is_empty() {
            return Err(OrchestratorError::Validation(errors));
        }

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "UPDATE courses SET title = ?, year = ?, lab_cat = ?, hours = ?, weeks = ? WHERE code = ?",
        )
        .bind(req.title.trim())
        .bind(i64::from(req.year))
        .bind(&lab_cat)
        .bind(i64::from(req.hours))
        .bind(i64::from(req.weeks))
        .bind(&course.code)
        .execute(&mut *tx)
        .await?;

        match req.manual_grp_count {
            Some(count) => {
                sqlx::query("UPDATE courses SET grp_count = ? WHERE code = ?")
                    .bind(i64::from(count))
                    .bind(&course.code)
                    .execute(&mut *tx)
                    .await?;
            }
            None => refresh_group_count(&mut tx, &course.code).await?,
        }

        tx.commit().await?;

        self.get_course(short_code).await
    }

    /// Delete a course with its labs, preferences and assignments.
    #[instrument(skip(self))]
    pub async fn delete_course(&self, short_code: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM courses WHERE short_code = ?")
            .bind(short_code)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found(format!("Course {}", short_code)));
        }

        info!("Deleted course {}", short_code);
        Ok(())
    }

    pub async fn list_labs(&self, short_code: &str) -> Result<Vec<Lab>> {
        let course = self.get_course(short_code).await?;

        let rows = sqlx::query_as::<_, LabRow>(
            "SELECT * FROM labs WHERE course_code = ? ORDER BY lab_group, id",
        )
        .bind(&course.code)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Lab::try_from).collect()
    }

    /// Apply an edit set to a course's labs.
    ///
    /// Sessions carrying an `id` are updated and keep their assignment, new sessions
    /// are inserted and sessions missing from the set are deleted.
    #[instrument(skip(self, labs), fields(count = labs.len()))]
    pub async fn replace_labs(&self, short_code: &str, labs: Vec<LabInput>) -> Result<Vec<Lab>> {
        let course = self.get_course(short_code).await?;
        let existing: HashSet<i64> = self
            .list_labs(short_code)
            .await?
            .into_iter()
            .map(|lab| lab.id)
            .collect();

        let mut errors = Vec::new();
        let mut parsed = Vec::new();
        let mut seen = HashSet::new();

        for (idx, input) in labs.iter().enumerate() {
            let row = idx + 1;
            let lab = parse_week_list(&input.teaching_weeks)
                .map_err(OrchestratorError::from)
                .and_then(|weeks| {
                    parse_lab(&input.group, &input.day, &input.time, &input.venue, weeks)
                });

            match lab {
                Ok(mut lab) => {
                    if let Some(id) = input.id {
                        if !existing.contains(&id) {
                            errors.push(format!("Lab {}: unknown lab id {}", row, id));
                            continue;
                        }
                        lab.id = Some(id);
                    }
                    if !seen.insert(lab.unique_key()) {
                        errors.push(format!("Lab {}: duplicate session", row));
                        continue;
                    }
                    parsed.push(lab);
                }
                Err(e) => errors.push(format!("Lab {}: {}", row, e)),
            }
        }

        if !errors.is_empty() {
            return Err(OrchestratorError::Validation(errors));
        }

        let kept: HashSet<i64> = parsed.iter().filter_map(|lab| lab.id).collect();
        let mut tx = self.pool().begin().await?;

        for id in existing.difference(&kept) {
            sqlx::query("DELETE FROM labs WHERE id = ?")
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }

        for lab in &parsed {
            match lab.id {
                Some(id) => {
                    sqlx::query(
                        "UPDATE labs SET lab_group = ?, day = ?, time = ?, venue = ?, teaching_weeks = ?
                         WHERE id = ?",
                    )
                    .bind(&lab.group)
                    .bind(lab.day.code())
                    .bind(&lab.time)
                    .bind(&lab.venue)
                    .bind(serde_json::to_string(&lab.weeks)?)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => insert_lab(&mut tx, &course.code, lab).await?,
            }
        }

        refresh_group_count(&mut tx, &course.code).await?;
        tx.commit().await?;

        self.list_labs(short_code).await
    }

    /// Import lab sessions from a timetable CSV.
    ///
    /// Only rows of type `LAB` are read. The labs of every course named in the file
    /// are replaced; rows naming unknown courses or holding invalid values are skipped
    /// and reported as warnings.
    #[instrument(skip(self, csv_text))]
    pub async fn import_timetable(&self, csv_text: &str) -> Result<TimetableImport> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(csv_text.as_bytes());

        let headers = reader.headers()?.clone();
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_uppercase(), idx))
            .collect();

        let missing: Vec<&str> = TIMETABLE_COLUMNS
            .iter()
            .copied()
            .filter(|column| !index.contains_key(*column))
            .collect();
        if !missing.is_empty() {
            return Err(OrchestratorError::InvalidInput(format!(
                "Missing required columns: {}",
                missing.join(", ")
            )));
        }

        let mut conn = self.pool().acquire().await?;
        let mut warnings = Vec::new();
        let mut resolved: HashMap<String, Option<String>> = HashMap::new();
        let mut labs: HashMap<String, Vec<NewLab>> = HashMap::new();
        let mut seen = HashSet::new();

        for (idx, record) in reader.records().enumerate() {
            let line = idx + 2;
            let record = record?;
            let field = |column: &str| {
                index
                    .get(column)
                    .and_then(|&i| record.get(i))
                    .unwrap_or_default()
            };

            if !field("TYPE").eq_ignore_ascii_case("LAB") {
                continue;
            }

            let course_key = field("COURSE");
            if !resolved.contains_key(course_key) {
                let code = resolve_course_code(&mut conn, course_key).await?;
                if code.is_none() {
                    warnings.push(format!("No matching course found for {}", course_key));
                }
                resolved.insert(course_key.to_string(), code);
            }
            let Some(Some(course_code)) = resolved.get(course_key) else {
                continue;
            };

            let lab = parse_teaching_weeks(field("REMARK"))
                .map_err(OrchestratorError::from)
                .and_then(|weeks| {
                    parse_lab(field("GROUP"), field("DAY"), field("TIME"), field("VENUE"), weeks)
                });

            match lab {
                Ok(lab) => {
                    if seen.insert((course_code.clone(), lab.unique_key())) {
                        labs.entry(course_code.clone()).or_default().push(lab);
                    } else {
                        warnings.push(format!("Row {}: duplicate session skipped", line));
                    }
                }
                Err(e) => warnings.push(format!("Row {}: {}", line, e)),
            }
        }
        drop(conn);

        let courses: BTreeSet<String> = resolved.into_values().flatten().collect();
        let mut inserted = 0;
        let mut tx = self.pool().begin().await?;

        for code in &courses {
            sqlx::query("DELETE FROM labs WHERE course_code = ?")
                .bind(code)
                .execute(&mut *tx)
                .await?;

            for lab in labs.get(code).map(Vec::as_slice).unwrap_or_default() {
                insert_lab(&mut tx, code, lab).await?;
                inserted += 1;
            }

            refresh_group_count(&mut tx, code).await?;
        }

        tx.commit().await?;

        for warning in &warnings {
            warn!("Timetable import: {}", warning);
        }
        info!(
            "Inserted {} lab sessions for {} courses",
            inserted,
            courses.len()
        );

        Ok(TimetableImport {
            inserted,
            courses: courses.into_iter().collect(),
            warnings,
        })
    }
}

// Internal row types for sqlx
#[derive(sqlx::FromRow)]
pub(crate) struct CourseRow {
    code: String,
    short_code: String,
    title: String,
    year: i64,
    lab_cat: String,
    hours: i64,
    weeks: i64,
    grp_count: Option<i64>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct LabRow {
    pub id: i64,
    pub course_code: String,
    pub lab_group: String,
    pub day: String,
    pub time: String,
    pub venue: String,
    pub teaching_weeks: String,
    pub assigned: bool,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Self {
            code: row.code,
            short_code: row.short_code,
            title: row.title,
            year: u8::try_from(row.year).unwrap_or_default(),
            lab_cat: row.lab_cat,
            hours: u32::try_from(row.hours).unwrap_or_default(),
            weeks: u32::try_from(row.weeks).unwrap_or_default(),
            grp_count: row.grp_count.and_then(|c| u32::try_from(c).ok()),
        }
    }
}

impl TryFrom<LabRow> for Lab {
    type Error = OrchestratorError;

    fn try_from(row: LabRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            course_code: row.course_code,
            group: row.lab_group,
            day: row.day,
            time: row.time,
            venue: row.venue,
            teaching_weeks: serde_json::from_str(&row.teaching_weeks)?,
            assigned: row.assigned,
        })
    }
}
