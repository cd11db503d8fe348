use tracing::instrument;

use nerv_core::ids::{EvaluationId, SynthesisId};
use nerv_core::synthesis::SynthesisEvaluation;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, format_ts};

const TABLE: &str = "synthesis_evaluations";

/// Sink for relevance evaluations of completed syntheses.
pub trait EvaluationStore: Send + Sync {
    fn insert_evaluation(&self, evaluation: &SynthesisEvaluation) -> Result<(), StoreError>;
}

pub struct EvaluationRepo {
    db: Database,
}

impl EvaluationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Evaluations of one synthesis record, oldest first.
    #[instrument(skip(self), fields(record_id = %synthesis_id))]
    pub fn list_for(&self, synthesis_id: &SynthesisId) -> Result<Vec<SynthesisEvaluation>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, synthesis_id, profile_title, overall_relevance, overall_criticality,
                        ratings_json, created_at
                 FROM synthesis_evaluations WHERE synthesis_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([synthesis_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_evaluation(row)?);
            }
            Ok(results)
        })
    }
}

impl EvaluationStore for EvaluationRepo {
    #[instrument(skip(self, evaluation), fields(evaluation_id = %evaluation.id, record_id = %evaluation.synthesis_id))]
    fn insert_evaluation(&self, evaluation: &SynthesisEvaluation) -> Result<(), StoreError> {
        let ratings = serde_json::to_string(&evaluation.ratings)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO synthesis_evaluations (id, synthesis_id, profile_title, overall_relevance,
                    overall_criticality, ratings_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    evaluation.id.as_str(),
                    evaluation.synthesis_id.as_str(),
                    evaluation.profile_title,
                    evaluation.overall_relevance,
                    evaluation.overall_criticality,
                    ratings,
                    format_ts(&evaluation.created_at),
                ],
            )?;
            Ok(())
        })
    }
}

fn row_to_evaluation(row: &rusqlite::Row<'_>) -> Result<SynthesisEvaluation, StoreError> {
    let id: String = row_helpers::get(row, 0, TABLE, "id")?;
    let synthesis_id: String = row_helpers::get(row, 1, TABLE, "synthesis_id")?;
    let ratings: String = row_helpers::get(row, 5, TABLE, "ratings_json")?;
    let created_at: String = row_helpers::get(row, 6, TABLE, "created_at")?;

    Ok(SynthesisEvaluation {
        id: EvaluationId::from_raw(id),
        synthesis_id: SynthesisId::from_raw(synthesis_id),
        profile_title: row_helpers::get(row, 2, TABLE, "profile_title")?,
        overall_relevance: row_helpers::get_opt(row, 3, TABLE, "overall_relevance")?,
        overall_criticality: row_helpers::get_opt(row, 4, TABLE, "overall_criticality")?,
        ratings: row_helpers::parse_json(&ratings, TABLE, "ratings_json")?,
        created_at: row_helpers::parse_ts(&created_at, TABLE, "created_at")?,
    })
}
