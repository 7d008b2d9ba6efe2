use crate::error::{OrchestratorError, Result};
use crate::portal::Portal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, instrument};
use utoipa::ToSchema;

pub const MAX_RANKING: u8 = 8;
/// Courses a student must rank in each year of study.
pub const MIN_PER_YEAR: usize = 3;
/// Courses that may share one ranking.
pub const MAX_PER_RANKING: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PreferenceEntry {
    /// Course code or short code
    pub course: String,
    /// 1 (most preferred) to 8
    pub ranking: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct TeachingPreference {
    pub course_code: String,
    pub short_code: String,
    pub title: String,
    pub year: u8,
    pub ranking: u8,
}

#[derive(sqlx::FromRow)]
struct CourseYear {
    code: String,
    short_code: String,
    year: i64,
}

impl Portal {
    /// Replace a student's ranking of courses.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn submit_preferences(
        &self,
        username: &str,
        entries: Vec<PreferenceEntry>,
    ) -> Result<Vec<TeachingPreference>> {
        self.get_student(username).await?;

        let courses = sqlx::query_as::<_, CourseYear>("SELECT code, short_code, year FROM courses")
            .fetch_all(self.pool())
            .await?;

        let ranked = validate_ranking(&entries, &courses)?;

        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM teaching_preferences WHERE student = ?")
            .bind(username)
            .execute(&mut *tx)
            .await?;

        for (code, year, ranking) in &ranked {
            sqlx::query(
                "INSERT INTO teaching_preferences (student, course_code, ranking, year)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(username)
            .bind(code)
            .bind(i64::from(*ranking))
            .bind(*year)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Saved {} preferences for {}", ranked.len(), username);

        self.get_preferences(username).await
    }

    pub async fn get_preferences(&self, username: &str) -> Result<Vec<TeachingPreference>> {
        let prefs = sqlx::query_as::<_, TeachingPreference>(
            "SELECT p.course_code, c.short_code, c.title, p.year, p.ranking
             FROM teaching_preferences p
             JOIN courses c ON c.code = p.course_code
             WHERE p.student = ?
             ORDER BY p.ranking, p.course_code",
        )
        .bind(username)
        .fetch_all(self.pool())
        .await?;

        Ok(prefs)
    }
}

/// Resolve entries to `(course code, year, ranking)` or report every rule broken.
fn validate_ranking(
    entries: &[PreferenceEntry],
    courses: &[CourseYear],
) -> Result<Vec<(String, i64, u8)>> {
    let mut errors = Vec::new();
    let mut ranked = Vec::new();
    let mut seen = HashSet::new();
    let mut per_year: BTreeMap<i64, usize> = (1..=3).map(|year| (year, 0)).collect();
    let mut per_ranking: BTreeMap<u8, usize> = BTreeMap::new();

    for entry in entries {
        let key = entry.course.trim();
        let Some(course) = courses
            .iter()
            .find(|c| c.code == key || c.short_code == key)
        else {
            errors.push(format!("Unknown course: {}", key));
            continue;
        };

        if !(1..=MAX_RANKING).contains(&entry.ranking) {
            errors.push(format!(
                "Ranking for {} must be between 1 and {}",
                course.short_code, MAX_RANKING
            ));
            continue;
        }
        if !seen.insert(course.code.clone()) {
            errors.push(format!("{} is ranked more than once", course.short_code));
            continue;
        }

        *per_year.entry(course.year).or_default() += 1;
        *per_ranking.entry(entry.ranking).or_default() += 1;
        ranked.push((course.code.clone(), course.year, entry.ranking));
    }

    for year in 1..=3 {
        if per_year.get(&year).copied().unwrap_or_default() < MIN_PER_YEAR {
            errors.push(format!(
                "You must rank at least {} courses for Year {}.",
                MIN_PER_YEAR, year
            ));
        }
    }
    for (ranking, count) in &per_ranking {
        if *count > MAX_PER_RANKING {
            errors.push(format!(
                "You cannot assign ranking {} to more than {} courses.",
                ranking, MAX_PER_RANKING
            ));
        }
    }

    if errors.is_empty() {
        Ok(ranked)
    } else {
        Err(OrchestratorError::Validation(errors))
    }
}
