use tracing::instrument;

use nerv_core::ids::{DocumentId, SynthesisId};
use nerv_core::synthesis::{SynthesisRecord, SynthesisStatus, SynthesisWindow};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, format_ts, json_opt};

const TABLE: &str = "synthesis_records";

const COLUMNS: &str = "id, window_start, window_end, document_ids_json, draft_json, feedback_json,
    final_json, iteration_count, status, created_at, updated_at";

/// Synthesis record operations the orchestrator depends on.
pub trait SynthesisStore: Send + Sync {
    fn insert_synthesis(&self, record: &SynthesisRecord) -> Result<(), StoreError>;

    /// Overwrite the mutable parts of an existing record.
    fn update_synthesis(&self, record: &SynthesisRecord) -> Result<(), StoreError>;

    /// The completed record with the latest window end.
    fn last_completed_synthesis(&self) -> Result<Option<SynthesisRecord>, StoreError>;
}

pub struct SynthesisRepo {
    db: Database,
}

impl SynthesisRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(record_id = %id))]
    pub fn get(&self, id: &SynthesisId) -> Result<SynthesisRecord, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM synthesis_records WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_record(row),
                None => Err(StoreError::NotFound(format!("synthesis record {id}"))),
            }
        })
    }

    /// Most recent records first, by window end.
    #[instrument(skip(self))]
    pub fn list_recent(&self, limit: u32) -> Result<Vec<SynthesisRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM synthesis_records ORDER BY window_end DESC, created_at DESC LIMIT ?1"
            ))?;
            let mut rows = stmt.query([limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_record(row)?);
            }
            Ok(results)
        })
    }
}

impl SynthesisStore for SynthesisRepo {
    #[instrument(skip(self, record), fields(record_id = %record.id, documents = record.document_ids.len()))]
    fn insert_synthesis(&self, record: &SynthesisRecord) -> Result<(), StoreError> {
        let document_ids = serde_json::to_string(&record.document_ids)?;
        let draft = json_opt(record.draft.as_ref())?;
        let feedback = json_opt(record.feedback.as_ref())?;
        let final_payload = json_opt(record.final_payload.as_ref())?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO synthesis_records (id, window_start, window_end, document_ids_json,
                    draft_json, feedback_json, final_json, iteration_count, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    record.id.as_str(),
                    format_ts(&record.window.start),
                    format_ts(&record.window.end),
                    document_ids,
                    draft,
                    feedback,
                    final_payload,
                    record.iteration_count,
                    record.status.as_str(),
                    format_ts(&record.created_at),
                    format_ts(&record.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self, record), fields(record_id = %record.id, status = %record.status))]
    fn update_synthesis(&self, record: &SynthesisRecord) -> Result<(), StoreError> {
        let draft = json_opt(record.draft.as_ref())?;
        let feedback = json_opt(record.feedback.as_ref())?;
        let final_payload = json_opt(record.final_payload.as_ref())?;

        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE synthesis_records SET draft_json = ?1, feedback_json = ?2, final_json = ?3,
                    iteration_count = ?4, status = ?5, updated_at = ?6
                 WHERE id = ?7",
                rusqlite::params![
                    draft,
                    feedback,
                    final_payload,
                    record.iteration_count,
                    record.status.as_str(),
                    format_ts(&record.updated_at),
                    record.id.as_str(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("synthesis record {}", record.id)));
            }
            Ok(())
        })
    }

    #[instrument(skip(self))]
    fn last_completed_synthesis(&self) -> Result<Option<SynthesisRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM synthesis_records WHERE status = ?1
                 ORDER BY window_end DESC, created_at DESC LIMIT 1"
            ))?;
            let mut rows = stmt.query([SynthesisStatus::Completed.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_record(row).map(Some),
                None => Ok(None),
            }
        })
    }
}

fn parse_json_opt(
    raw: Option<String>,
    column: &'static str,
) -> Result<Option<serde_json::Value>, StoreError> {
    raw.map(|raw| row_helpers::parse_json(&raw, TABLE, column)).transpose()
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<SynthesisRecord, StoreError> {
    let id: String = row_helpers::get(row, 0, TABLE, "id")?;
    let start: String = row_helpers::get(row, 1, TABLE, "window_start")?;
    let end: String = row_helpers::get(row, 2, TABLE, "window_end")?;
    let ids_raw: String = row_helpers::get(row, 3, TABLE, "document_ids_json")?;
    let status: String = row_helpers::get(row, 8, TABLE, "status")?;
    let created_at: String = row_helpers::get(row, 9, TABLE, "created_at")?;
    let updated_at: String = row_helpers::get(row, 10, TABLE, "updated_at")?;

    let document_ids: Vec<DocumentId> =
        serde_json::from_str(&ids_raw).map_err(|e| StoreError::CorruptRow {
            table: TABLE,
            column: "document_ids_json",
            detail: e.to_string(),
        })?;

    Ok(SynthesisRecord {
        id: SynthesisId::from_raw(id),
        window: SynthesisWindow::new(
            row_helpers::parse_ts(&start, TABLE, "window_start")?,
            row_helpers::parse_ts(&end, TABLE, "window_end")?,
        ),
        document_ids,
        draft: parse_json_opt(row_helpers::get_opt(row, 4, TABLE, "draft_json")?, "draft_json")?,
        feedback: parse_json_opt(row_helpers::get_opt(row, 5, TABLE, "feedback_json")?, "feedback_json")?,
        final_payload: parse_json_opt(row_helpers::get_opt(row, 6, TABLE, "final_json")?, "final_json")?,
        iteration_count: row_helpers::get(row, 7, TABLE, "iteration_count")?,
        status: row_helpers::parse_enum(&status, TABLE, "status")?,
        created_at: row_helpers::parse_ts(&created_at, TABLE, "created_at")?,
        updated_at: row_helpers::parse_ts(&updated_at, TABLE, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, hour, 0, 0).unwrap()
    }

    fn setup() -> SynthesisRepo {
        SynthesisRepo::new(Database::in_memory().unwrap())
    }

    fn record(start: u32, end: u32) -> SynthesisRecord {
        SynthesisRecord::open(
            SynthesisWindow::new(at(start), at(end)),
            vec![DocumentId(1), DocumentId(2)],
            at(end),
        )
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let repo = setup();
        let rec = record(1, 2);
        repo.insert_synthesis(&rec).unwrap();
        assert_eq!(repo.get(&rec.id).unwrap(), rec);
    }

    #[test]
    fn update_persists_loop_state() {
        let repo = setup();
        let mut rec = record(1, 2);
        repo.insert_synthesis(&rec).unwrap();

        rec.draft = Some(json!({"headline": "H", "summary": "S", "key_points": ["A"]}));
        rec.feedback = Some(json!({"should_revise": false}));
        rec.final_payload = rec.draft.clone();
        rec.iteration_count = 1;
        rec.status = SynthesisStatus::Completed;
        rec.updated_at = at(3);
        repo.update_synthesis(&rec).unwrap();

        assert_eq!(repo.get(&rec.id).unwrap(), rec);
    }

    #[test]
    fn update_unknown_record_is_not_found() {
        let repo = setup();
        let result = repo.update_synthesis(&record(1, 2));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn last_completed_ignores_draft_and_error_records() {
        let repo = setup();
        assert!(repo.last_completed_synthesis().unwrap().is_none());

        let mut done = record(1, 2);
        done.status = SynthesisStatus::Completed;
        repo.insert_synthesis(&done).unwrap();

        let mut failed = record(2, 4);
        failed.status = SynthesisStatus::Error;
        repo.insert_synthesis(&failed).unwrap();
        repo.insert_synthesis(&record(4, 5)).unwrap();

        let last = repo.last_completed_synthesis().unwrap().unwrap();
        assert_eq!(last.id, done.id);
    }

    #[test]
    fn last_completed_orders_by_window_end() {
        let repo = setup();
        let mut later = record(3, 6);
        later.status = SynthesisStatus::Completed;
        let mut earlier = record(1, 3);
        earlier.status = SynthesisStatus::Completed;
        repo.insert_synthesis(&later).unwrap();
        repo.insert_synthesis(&earlier).unwrap();

        let last = repo.last_completed_synthesis().unwrap().unwrap();
        assert_eq!(last.window.end, at(6));
    }

    #[test]
    fn list_recent_newest_first() {
        let repo = setup();
        let a = record(1, 2);
        let b = record(2, 3);
        repo.insert_synthesis(&a).unwrap();
        repo.insert_synthesis(&b).unwrap();
        let ids: Vec<_> = repo.list_recent(10).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
