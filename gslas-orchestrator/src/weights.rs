use crate::error::{OrchestratorError, Result};
use crate::portal::Portal;
use gslas_allocator::Weights;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

/// Penalty weights used by the allocation search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AllocationWeights {
    /// Keeping odd/even week pairs with one student
    pub odd_even_pair_weight: i64,
    /// Limiting the number of different courses per student
    pub course_variety_weight: i64,
    /// Bonus for courses a student has taught before
    pub past_assignments_weight: i64,
    pub preference_weight: i64,
    /// Evening out workload per unit of lab load
    pub workload_distribution_weight: i64,
    /// Number of shuffled orderings tried per run
    pub permutation_count: i64,
}

impl Default for AllocationWeights {
    fn default() -> Self {
        Weights::default().into()
    }
}

impl From<Weights> for AllocationWeights {
    fn from(w: Weights) -> Self {
        Self {
            odd_even_pair_weight: w.odd_even_pair,
            course_variety_weight: w.course_variety,
            past_assignments_weight: w.past_assignments,
            preference_weight: w.preference,
            workload_distribution_weight: w.workload_distribution,
            permutation_count: i64::from(w.permutation_count),
        }
    }
}

impl From<&AllocationWeights> for Weights {
    fn from(w: &AllocationWeights) -> Self {
        Self {
            odd_even_pair: w.odd_even_pair_weight,
            course_variety: w.course_variety_weight,
            past_assignments: w.past_assignments_weight,
            preference: w.preference_weight,
            workload_distribution: w.workload_distribution_weight,
            permutation_count: u32::try_from(w.permutation_count.max(1)).unwrap_or(u32::MAX),
        }
    }
}

impl AllocationWeights {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let fields = [
            ("odd_even_pair_weight", self.odd_even_pair_weight),
            ("course_variety_weight", self.course_variety_weight),
            ("past_assignments_weight", self.past_assignments_weight),
            ("preference_weight", self.preference_weight),
            ("workload_distribution_weight", self.workload_distribution_weight),
        ];
        for (name, value) in fields {
            if value < 0 {
                errors.push(format!("{} must not be negative", name));
            }
        }
        if self.permutation_count < 1 {
            errors.push("permutation_count must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::Validation(errors))
        }
    }
}

impl Portal {
    /// Current weights, created with defaults on first use.
    pub async fn get_weights(&self) -> Result<AllocationWeights> {
        sqlx::query("INSERT OR IGNORE INTO allocation_weights (id) VALUES (1)")
            .execute(self.pool())
            .await?;

        let weights = sqlx::query_as::<_, AllocationWeights>(
            "SELECT odd_even_pair_weight, course_variety_weight, past_assignments_weight,
                    preference_weight, workload_distribution_weight, permutation_count
             FROM allocation_weights WHERE id = 1",
        )
        .fetch_one(self.pool())
        .await?;

        Ok(weights)
    }

    #[instrument(skip(self))]
    pub async fn update_weights(&self, weights: AllocationWeights) -> Result<AllocationWeights> {
        weights.validate()?;

        sqlx::query(
            "INSERT INTO allocation_weights (id, odd_even_pair_weight, course_variety_weight,
                past_assignments_weight, preference_weight, workload_distribution_weight, permutation_count)
             VALUES (1, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                odd_even_pair_weight = excluded.odd_even_pair_weight,
                course_variety_weight = excluded.course_variety_weight,
                past_assignments_weight = excluded.past_assignments_weight,
                preference_weight = excluded.preference_weight,
                workload_distribution_weight = excluded.workload_distribution_weight,
                permutation_count = excluded.permutation_count",
        )
        .bind(weights.odd_even_pair_weight)
        .bind(weights.course_variety_weight)
        .bind(weights.past_assignments_weight)
        .bind(weights.preference_weight)
        .bind(weights.workload_distribution_weight)
        .bind(weights.permutation_count)
        .execute(self.pool())
        .await?;

        info!("Allocation weights updated");
        self.get_weights().await
    }
}
