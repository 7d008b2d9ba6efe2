//! Allocation runs, manual edits and allocation views.

use crate::error::{OrchestratorError, Result};
use crate::portal::{from_timestamp, Portal};
use chrono::{DateTime, Utc};
use gslas_allocator::{
    allocate, check_group, parse_time, score, AllocationInput, Candidate, CourseLoad, GroupKey,
    Holding, LabGroup, PenaltyBreakdown, Preference, Session, Weights,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PenaltyScore {
    pub total: f64,
    pub odd_even_splits: u32,
    pub course_variety: u32,
    pub preference: u32,
    pub workload_stdev: f64,
    pub past_matches: u32,
}

impl From<PenaltyBreakdown> for PenaltyScore {
    fn from(p: PenaltyBreakdown) -> Self {
        Self {
            total: round_to(p.total, 1),
            odd_even_splits: p.odd_even_splits,
            course_variety: p.course_variety,
            preference: p.preference,
            workload_stdev: round_to(p.workload_stdev, 2),
            past_matches: p.past_matches,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardStatistics {
    /// Students on lab duty holding at least their lab load
    pub students_with_lab_load_met: u32,
    /// Students on lab duty
    pub total_students: u32,
    pub total_courses: u32,
    /// Lab groups across all courses
    pub total_labs: u32,
    pub assigned_labs: u32,
    /// Share of lab groups assigned, one decimal
    pub assignment_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllocationSummary {
    pub run_id: i64,
    pub new_assignments: usize,
    pub iterations: u32,
    pub penalty_score: f64,
    pub penalty: PenaltyScore,
    pub statistics: DashboardStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AllocationRun {
    pub id: i64,
    pub clear_existing: bool,
    pub penalty_score: f64,
    pub new_assignments: i64,
    pub iterations: i64,
    #[sqlx(skip)]
    pub started_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A lab session held by a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssignedSession {
    pub lab_id: i64,
    pub course_code: String,
    pub short_code: String,
    pub course_title: String,
    pub group: String,
    pub day: String,
    pub time: String,
    pub venue: String,
    pub teaching_weeks: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentAllocation {
    pub username: String,
    pub name: String,
    /// Lab groups held
    pub assigned_groups: u32,
    pub lab_load: u32,
    /// Sum of hours x weeks over held sessions
    pub total_workload: u64,
    pub sessions: Vec<AssignedSession>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentAllocations {
    pub username: String,
    pub name: String,
    pub sessions: Vec<AssignedSession>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GroupSession {
    pub lab_id: i64,
    pub day: String,
    pub time: String,
    pub venue: String,
    pub teaching_weeks: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GroupAllocation {
    pub group: String,
    pub sessions: Vec<GroupSession>,
    pub student: Option<String>,
    pub student_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseAllocation {
    pub code: String,
    pub short_code: String,
    pub title: String,
    pub grp_count: Option<u32>,
    pub groups: Vec<GroupAllocation>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    lab_id: i64,
    course_code: String,
    short_code: String,
    title: String,
    hours: i64,
    weeks: i64,
    lab_group: String,
    day: String,
    time: String,
    venue: String,
    teaching_weeks: String,
    student: Option<String>,
    student_name: Option<String>,
}

/// One lab group as stored, with its current holder.
#[derive(Debug, Clone)]
struct GroupRecord {
    key: GroupKey,
    short_code: String,
    title: String,
    load: CourseLoad,
    sessions: Vec<GroupSession>,
    holder: Option<(String, String)>,
}

impl GroupRecord {
    fn holder_name(&self) -> Option<&str> {
        self.holder.as_ref().map(|(username, _)| username.as_str())
    }

    fn to_lab_group(&self) -> Result<LabGroup> {
        let sessions = self
            .sessions
            .iter()
            .map(|s| {
                Ok(Session {
                    lab_id: s.lab_id,
                    day: s.day.parse()?,
                    time: parse_time(&s.time)?,
                    teaching_weeks: s.teaching_weeks.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LabGroup {
            key: self.key.clone(),
            sessions,
        })
    }

    fn assigned_sessions(&self) -> impl Iterator<Item = AssignedSession> + '_ {
        self.sessions.iter().map(|s| AssignedSession {
            lab_id: s.lab_id,
            course_code: self.key.course.clone(),
            short_code: self.short_code.clone(),
            course_title: self.title.clone(),
            group: self.key.group.clone(),
            day: s.day.clone(),
            time: s.time.clone(),
            venue: s.venue.clone(),
            teaching_weeks: s.teaching_weeks.clone(),
        })
    }

    fn workload(&self) -> u64 {
        self.load.workload().saturating_mul(self.sessions.len() as u64)
    }

    fn to_allocation(&self) -> GroupAllocation {
        GroupAllocation {
            group: self.key.group.clone(),
            sessions: self.sessions.clone(),
            student: self.holder.as_ref().map(|(u, _)| u.clone()),
            student_name: self.holder.as_ref().map(|(_, n)| n.clone()),
        }
    }
}

/// Assign every session of `group` to `student`.
async fn assign_group(conn: &mut SqliteConnection, group: &GroupRecord, student: &str) -> Result<()> {
    let now = Utc::now().timestamp();
    for session in &group.sessions {
        sqlx::query(
            "INSERT INTO assignments (lab_id, student, created_at) VALUES (?, ?, ?)
             ON CONFLICT(lab_id) DO UPDATE SET student = excluded.student, created_at = excluded.created_at",
        )
        .bind(session.lab_id)
        .bind(student)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        sqlx::query("UPDATE labs SET assigned = 1 WHERE id = ?")
            .bind(session.lab_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn unassign_group(conn: &mut SqliteConnection, group: &GroupRecord) -> Result<()> {
    for session in &group.sessions {
        sqlx::query("DELETE FROM assignments WHERE lab_id = ?")
            .bind(session.lab_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("UPDATE labs SET assigned = 0 WHERE id = ?")
            .bind(session.lab_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

impl Portal {
    /// Every lab group in course and timetable order.
    async fn load_groups(&self) -> Result<Vec<GroupRecord>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT l.id AS lab_id, l.course_code, c.short_code, c.title, c.hours, c.weeks,
                    l.lab_group, l.day, l.time, l.venue, l.teaching_weeks,
                    a.student, s.name AS student_name
             FROM labs l
             JOIN courses c ON c.code = l.course_code
             LEFT JOIN assignments a ON a.lab_id = l.id
             LEFT JOIN students s ON s.username = a.student
             ORDER BY l.course_code, l.id",
        )
        .fetch_all(self.pool())
        .await?;

        let mut groups: Vec<GroupRecord> = Vec::new();
        let mut index: HashMap<GroupKey, usize> = HashMap::new();

        for row in rows {
            let key = GroupKey::new(row.course_code, row.lab_group);
            let idx = *index.entry(key.clone()).or_insert_with(|| {
                groups.push(GroupRecord {
                    key,
                    short_code: row.short_code,
                    title: row.title,
                    load: CourseLoad {
                        hours: u32::try_from(row.hours).unwrap_or_default(),
                        weeks: u32::try_from(row.weeks).unwrap_or_default(),
                    },
                    sessions: Vec::new(),
                    holder: None,
                });
                groups.len() - 1
            });

            let group = &mut groups[idx];
            group.sessions.push(GroupSession {
                lab_id: row.lab_id,
                day: row.day,
                time: row.time,
                venue: row.venue,
                teaching_weeks: serde_json::from_str(&row.teaching_weeks)?,
            });
            if group.holder.is_none() {
                if let Some(student) = row.student {
                    let name = row.student_name.unwrap_or_else(|| student.clone());
                    group.holder = Some((student, name));
                }
            }
        }

        Ok(groups)
    }

    /// Build allocation candidates for the given students.
    async fn load_candidates(
        &self,
        usernames: &[(String, u32)],
        groups: &[GroupRecord],
    ) -> Result<Vec<Candidate>> {
        let prefs: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT student, course_code, ranking FROM teaching_preferences")
                .fetch_all(self.pool())
                .await?;
        let past: Vec<(String, String)> =
            sqlx::query_as("SELECT student, course_code FROM past_courses")
                .fetch_all(self.pool())
                .await?;
        let requests: HashMap<String, _> = self
            .list_special_requests()
            .await?
            .into_iter()
            .map(|r| (r.student.clone(), r))
            .collect();

        let mut candidates = Vec::with_capacity(usernames.len());
        for (username, lab_load) in usernames {
            let mut candidate = Candidate::new(username.clone(), *lab_load);

            for group in groups.iter().filter(|g| g.holder_name() == Some(username.as_str())) {
                candidate.held.push(group.to_lab_group()?);
            }
            candidate.preferences = prefs
                .iter()
                .filter(|(student, _, _)| student == username)
                .map(|(_, course, rank)| Preference {
                    course: course.clone(),
                    rank: u8::try_from(*rank).unwrap_or(u8::MAX),
                })
                .collect();
            candidate.past_courses = past
                .iter()
                .filter(|(student, _)| student == username)
                .map(|(_, course)| course.clone())
                .collect();
            if let Some(request) = requests.get(username) {
                candidate.availability = request.approved_availability();
                candidate.course_lock = request.approved_course_lock();
            }

            candidates.push(candidate);
        }

        Ok(candidates)
    }

    fn course_loads(groups: &[GroupRecord]) -> HashMap<String, CourseLoad> {
        groups
            .iter()
            .map(|g| (g.key.course.clone(), g.load))
            .collect()
    }

    /// Run the allocation search and store its new assignments.
    ///
    /// With `clear_existing` every current assignment is removed first; otherwise
    /// existing assignments are kept and count against each student's load.
    #[instrument(skip(self))]
    pub async fn run_allocation(
        &self,
        clear_existing: bool,
        seed: Option<u64>,
    ) -> Result<AllocationSummary> {
        let started_at = Utc::now();

        if clear_existing {
            self.clear_allocations().await?;
        }

        let weights: Weights = (&self.get_weights().await?).into();
        let groups = self.load_groups().await?;

        let duty: Vec<(String, i64)> = sqlx::query_as(
            "SELECT username, lab_load FROM students WHERE gs_duty = 1 ORDER BY username",
        )
        .fetch_all(self.pool())
        .await?;
        let duty: Vec<(String, u32)> = duty
            .into_iter()
            .map(|(u, load)| (u, u32::try_from(load).unwrap_or_default()))
            .collect();

        let available = groups
            .iter()
            .filter(|g| g.holder.is_none())
            .map(GroupRecord::to_lab_group)
            .collect::<Result<Vec<_>>>()?;

        let input = AllocationInput {
            courses: Self::course_loads(&groups),
            available,
            candidates: self.load_candidates(&duty, &groups).await?,
        };

        let search_weights = weights.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            allocate(&input, &search_weights, &mut rng)
        })
        .await??;

        let by_key: HashMap<&GroupKey, &GroupRecord> = groups.iter().map(|g| (&g.key, g)).collect();
        let penalty = PenaltyScore::from(outcome.penalty.clone());

        let mut tx = self.pool().begin().await?;
        for assignment in &outcome.assignments {
            let group = by_key
                .get(&assignment.group)
                .ok_or_else(|| OrchestratorError::not_found(format!("Lab group {}", assignment.group)))?;
            assign_group(&mut tx, group, &assignment.student).await?;
        }

        let run_id = sqlx::query(
            "INSERT INTO allocation_runs (clear_existing, penalty_score, new_assignments, iterations,
                started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(clear_existing)
        .bind(penalty.total)
        .bind(outcome.assignments.len() as i64)
        .bind(i64::from(outcome.iterations))
        .bind(started_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        info!(
            run_id,
            new_assignments = outcome.assignments.len(),
            penalty = penalty.total,
            "Automatic allocation completed"
        );

        Ok(AllocationSummary {
            run_id,
            new_assignments: outcome.assignments.len(),
            iterations: outcome.iterations,
            penalty_score: penalty.total,
            penalty,
            statistics: self.dashboard_statistics().await?,
        })
    }

    /// Remove every assignment. Returns the number of sessions cleared.
    #[instrument(skip(self))]
    pub async fn clear_allocations(&self) -> Result<u64> {
        let mut tx = self.pool().begin().await?;
        let cleared = sqlx::query("DELETE FROM assignments")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("UPDATE labs SET assigned = 0")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Cleared {} assignments", cleared);
        Ok(cleared)
    }

    pub async fn dashboard_statistics(&self) -> Result<DashboardStatistics> {
        let students: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT s.lab_load, COUNT(DISTINCT l.course_code || '/' || l.lab_group)
             FROM students s
             LEFT JOIN assignments a ON a.student = s.username
             LEFT JOIN labs l ON l.id = a.lab_id
             WHERE s.gs_duty = 1
             GROUP BY s.username",
        )
        .fetch_all(self.pool())
        .await?;

        let (total_courses,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM courses")
            .fetch_one(self.pool())
            .await?;
        let (total_labs,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM (SELECT DISTINCT course_code, lab_group FROM labs)",
        )
        .fetch_one(self.pool())
        .await?;
        let (assigned_labs,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM (
                SELECT DISTINCT l.course_code, l.lab_group
                FROM labs l JOIN assignments a ON a.lab_id = l.id
                WHERE a.student IS NOT NULL
             )",
        )
        .fetch_one(self.pool())
        .await?;

        let assignment_percentage = if total_labs > 0 {
            round_to(assigned_labs as f64 / total_labs as f64 * 100.0, 1)
        } else {
            0.0
        };

        Ok(DashboardStatistics {
            students_with_lab_load_met: students
                .iter()
                .filter(|(load, held)| held >= load)
                .count() as u32,
            total_students: students.len() as u32,
            total_courses: total_courses as u32,
            total_labs: total_labs as u32,
            assigned_labs: assigned_labs as u32,
            assignment_percentage,
        })
    }

    /// Per-student view of students on lab duty, ordered by name.
    pub async fn student_allocation_table(&self) -> Result<Vec<StudentAllocation>> {
        let groups = self.load_groups().await?;
        let students = self.list_students().await?;

        Ok(students
            .into_iter()
            .filter(|s| s.gs_duty)
            .map(|s| {
                let held: Vec<&GroupRecord> = groups
                    .iter()
                    .filter(|g| g.holder_name() == Some(s.username.as_str()))
                    .collect();
                StudentAllocation {
                    assigned_groups: held.len() as u32,
                    lab_load: s.lab_load,
                    total_workload: held.iter().map(|g| g.workload()).sum(),
                    sessions: held.iter().flat_map(|g| g.assigned_sessions()).collect(),
                    username: s.username,
                    name: s.name,
                }
            })
            .collect())
    }

    /// Per-course view of every lab group and its holder, ordered by course code.
    pub async fn course_allocation_table(&self) -> Result<Vec<CourseAllocation>> {
        let groups = self.load_groups().await?;
        let courses = self.list_courses().await?;

        Ok(courses
            .into_iter()
            .map(|c| CourseAllocation {
                groups: groups
                    .iter()
                    .filter(|g| g.key.course == c.code)
                    .map(GroupRecord::to_allocation)
                    .collect(),
                code: c.code,
                short_code: c.short_code,
                title: c.title,
                grp_count: c.grp_count,
            })
            .collect())
    }

    /// Lab groups of one course for manual editing.
    pub async fn course_allocation(&self, short_code: &str) -> Result<CourseAllocation> {
        let course = self.get_course(short_code).await?;
        let groups = self.load_groups().await?;

        Ok(CourseAllocation {
            groups: groups
                .iter()
                .filter(|g| g.key.course == course.code)
                .map(GroupRecord::to_allocation)
                .collect(),
            code: course.code,
            short_code: course.short_code,
            title: course.title,
            grp_count: course.grp_count,
        })
    }

    /// Check that `username` may take `key` on top of their other groups.
    pub async fn validate_group_assignment(&self, username: &str, key: &GroupKey) -> Result<()> {
        let groups = self.load_groups().await?;
        self.validate_against(username, key, &groups).await
    }

    async fn validate_against(&self, username: &str, key: &GroupKey, groups: &[GroupRecord]) -> Result<()> {
        let student = self.get_student(username).await?;
        if !student.gs_duty {
            return Err(OrchestratorError::InvalidInput(format!(
                "{} is not on lab duty this semester",
                student.name
            )));
        }

        let target = groups
            .iter()
            .find(|g| &g.key == key)
            .ok_or_else(|| OrchestratorError::not_found(format!("Lab group {}", key)))?
            .to_lab_group()?;

        let held = groups
            .iter()
            .filter(|g| g.holder_name() == Some(username) && &g.key != key)
            .map(GroupRecord::to_lab_group)
            .collect::<Result<Vec<_>>>()?;

        let availability = self
            .get_special_request(username)
            .await?
            .and_then(|r| r.approved_availability());

        check_group(student.lab_load, availability.as_ref(), &held, &target).map_err(|reason| {
            OrchestratorError::InvalidInput(format!(
                "Cannot assign {} to group {}: {}",
                student.name, key.group, reason
            ))
        })
    }

    /// Give a lab group to a student, or unassign it with `None`.
    #[instrument(skip(self))]
    pub async fn set_group_assignment(
        &self,
        short_code: &str,
        group: &str,
        student: Option<&str>,
    ) -> Result<GroupAllocation> {
        let course = self.get_course(short_code).await?;
        let key = GroupKey::new(course.code, group);
        let groups = self.load_groups().await?;
        let record = groups
            .iter()
            .find(|g| g.key == key)
            .ok_or_else(|| OrchestratorError::not_found(format!("Lab group {}", key)))?;

        let mut tx = self.pool().begin().await?;
        match student {
            Some(username) => {
                self.validate_against(username, &key, &groups).await?;
                assign_group(&mut tx, record, username).await?;
                info!("Assigned {} to {}", key, username);
            }
            None => {
                unassign_group(&mut tx, record).await?;
                info!("Unassigned {}", key);
            }
        }
        tx.commit().await?;

        self.load_groups()
            .await?
            .into_iter()
            .find(|g| g.key == key)
            .map(|g| g.to_allocation())
            .ok_or_else(|| OrchestratorError::not_found(format!("Lab group {}", key)))
    }

    /// Penalty of the assignments currently stored, over students holding groups.
    pub async fn current_penalty(&self) -> Result<PenaltyScore> {
        let groups = self.load_groups().await?;
        let weights: Weights = (&self.get_weights().await?).into();

        let holders: BTreeSet<&str> = groups.iter().filter_map(|g| g.holder_name()).collect();
        if holders.is_empty() {
            return Ok(PenaltyBreakdown::default().into());
        }

        let loads: Vec<(String, i64)> = sqlx::query_as("SELECT username, lab_load FROM students")
            .fetch_all(self.pool())
            .await?;
        let usernames: Vec<(String, u32)> = loads
            .into_iter()
            .filter(|(u, _)| holders.contains(u.as_str()))
            .map(|(u, load)| (u, u32::try_from(load).unwrap_or_default()))
            .collect();

        let candidates = self.load_candidates(&usernames, &groups).await?;
        let holdings: Vec<Holding<'_>> = candidates
            .iter()
            .map(|c| Holding {
                candidate: c,
                groups: &c.held,
            })
            .collect();

        Ok(score(&Self::course_loads(&groups), &weights, &holdings).into())
    }

    /// Sessions held by one student.
    pub async fn student_allocations(&self, username: &str) -> Result<Vec<AssignedSession>> {
        self.get_student(username).await?;
        let groups = self.load_groups().await?;

        Ok(groups
            .iter()
            .filter(|g| g.holder_name() == Some(username))
            .flat_map(|g| g.assigned_sessions())
            .collect())
    }

    /// Sessions of every student holding at least one group, ordered by name.
    pub async fn all_allocations(&self) -> Result<Vec<StudentAllocations>> {
        let groups = self.load_groups().await?;
        let students = self.list_students().await?;

        Ok(students
            .into_iter()
            .filter_map(|s| {
                let sessions: Vec<AssignedSession> = groups
                    .iter()
                    .filter(|g| g.holder_name() == Some(s.username.as_str()))
                    .flat_map(|g| g.assigned_sessions())
                    .collect();
                (!sessions.is_empty()).then(|| StudentAllocations {
                    username: s.username,
                    name: s.name,
                    sessions,
                })
            })
            .collect())
    }

    pub async fn list_runs(&self) -> Result<Vec<AllocationRun>> {
        let rows: Vec<RunRow> = sqlx::query_as("SELECT * FROM allocation_runs ORDER BY id DESC")
            .fetch_all(self.pool())
            .await?;

        Ok(rows.into_iter().map(AllocationRun::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: i64,
    clear_existing: bool,
    penalty_score: f64,
    new_assignments: i64,
    iterations: i64,
    started_at: i64,
    completed_at: i64,
}

impl From<RunRow> for AllocationRun {
    fn from(row: RunRow) -> Self {
        Self {
            id: row.id,
            clear_existing: row.clear_existing,
            penalty_score: row.penalty_score,
            new_assignments: row.new_assignments,
            iterations: row.iterations,
            started_at: Some(from_timestamp(row.started_at)),
            completed_at: Some(from_timestamp(row.completed_at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(66.666, 1), 66.7);
        assert_eq!(round_to(-15.004, 2), -15.0);
    }

    #[test]
    fn test_penalty_score_is_rounded() {
        let breakdown = PenaltyBreakdown {
            workload_stdev: 18.384776,
            total: 367.64552,
            ..PenaltyBreakdown::default()
        };
        let score = PenaltyScore::from(breakdown);
        assert_eq!(score.total, 367.6);
        assert_eq!(score.workload_stdev, 18.38);
    }
}
