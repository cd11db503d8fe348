use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::instrument;

use nerv_core::document::{Annotations, Document, NewDocument};
use nerv_core::ids::DocumentId;
use nerv_core::synthesis::SynthesisWindow;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, format_ts};

const TABLE: &str = "documents";

const COLUMNS: &str = "id, url, title, summary, content, published_at, ingested_at, enriched_at,
    location_name, location_country, location_confidence, location_justification,
    topic, topic_confidence, topic_supporting_points,
    category, subcategory, category_confidence, category_rationale, brief_summary";

/// Historical lookup: prior documents sharing a topic.
#[derive(Clone, Debug)]
pub struct TopicQuery<'a> {
    pub topics: &'a [String],
    /// Exclusive upper bound on the enrichment time.
    pub before: DateTime<Utc>,
    /// Inclusive lower bound on publication or ingestion time.
    pub since: DateTime<Utc>,
    pub exclude: &'a [DocumentId],
    pub per_topic: usize,
}

/// Document operations the enrichment pipeline and orchestrator depend on.
pub trait DocumentStore: Send + Sync {
    /// Documents for the given ids, in first-request order. Unknown and
    /// repeated ids are skipped.
    fn documents_by_ids(&self, ids: &[DocumentId]) -> Result<Vec<Document>, StoreError>;

    /// Write the set annotation fields; unset fields keep their stored value.
    /// The enrichment timestamp is only written when given.
    fn apply_enrichment(
        &self,
        id: DocumentId,
        annotations: &Annotations,
        enriched_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Documents enriched within `window`, newest best timestamp first.
    fn enriched_in_window(
        &self,
        window: &SynthesisWindow,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Capped per-topic groups, flattened in topic order.
    fn related_by_topic(&self, query: &TopicQuery<'_>) -> Result<Vec<Document>, StoreError>;
}

pub struct DocumentRepo {
    db: Database,
}

impl DocumentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store a freshly ingested document.
    #[instrument(skip(self, doc), fields(url = %doc.url))]
    pub fn insert(&self, doc: NewDocument, ingested_at: DateTime<Utc>) -> Result<Document, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (url, title, summary, content, published_at, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    doc.url,
                    doc.title,
                    doc.summary,
                    doc.content,
                    doc.published_at.as_ref().map(format_ts),
                    format_ts(&ingested_at),
                ],
            )?;
            let id = DocumentId(conn.last_insert_rowid());

            Ok(Document {
                id,
                url: doc.url,
                title: doc.title,
                summary: doc.summary,
                content: doc.content,
                published_at: doc.published_at,
                ingested_at,
                enriched_at: None,
                annotations: Annotations::default(),
            })
        })
    }

    #[instrument(skip(self), fields(document_id = %id))]
    pub fn get(&self, id: DocumentId) -> Result<Document, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM documents WHERE id = ?1"))?;
            let mut rows = stmt.query([id.0])?;
            match rows.next()? {
                Some(row) => row_to_document(row),
                None => Err(StoreError::NotFound(format!("document {id}"))),
            }
        })
    }

    /// Ids of documents still awaiting enrichment, oldest first.
    #[instrument(skip(self))]
    pub fn pending_ids(&self, limit: usize) -> Result<Vec<DocumentId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM documents WHERE enriched_at IS NULL
                 ORDER BY ingested_at ASC, id ASC LIMIT ?1",
            )?;
            let ids = stmt
                .query_map([sql_limit(limit)], |row| row.get::<_, i64>(0))?
                .map(|id| id.map(DocumentId))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}

impl DocumentStore for DocumentRepo {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    fn documents_by_ids(&self, ids: &[DocumentId]) -> Result<Vec<Document>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM documents WHERE id = ?1"))?;
            let mut seen = HashSet::with_capacity(ids.len());
            let mut docs = Vec::with_capacity(ids.len());
            for id in ids.iter().filter(|id| seen.insert(**id)) {
                let mut rows = stmt.query([id.0])?;
                if let Some(row) = rows.next()? {
                    docs.push(row_to_document(row)?);
                }
            }
            Ok(docs)
        })
    }

    #[instrument(skip(self, annotations), fields(document_id = %id, stamped = enriched_at.is_some()))]
    fn apply_enrichment(
        &self,
        id: DocumentId,
        annotations: &Annotations,
        enriched_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let a = annotations;
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE documents SET
                    location_name = COALESCE(?1, location_name),
                    location_country = COALESCE(?2, location_country),
                    location_confidence = COALESCE(?3, location_confidence),
                    location_justification = COALESCE(?4, location_justification),
                    topic = COALESCE(?5, topic),
                    topic_confidence = COALESCE(?6, topic_confidence),
                    topic_supporting_points = COALESCE(?7, topic_supporting_points),
                    category = COALESCE(?8, category),
                    subcategory = COALESCE(?9, subcategory),
                    category_confidence = COALESCE(?10, category_confidence),
                    category_rationale = COALESCE(?11, category_rationale),
                    brief_summary = COALESCE(?12, brief_summary),
                    enriched_at = COALESCE(?13, enriched_at)
                 WHERE id = ?14",
                rusqlite::params![
                    a.location_name,
                    a.location_country,
                    a.location_confidence,
                    a.location_justification,
                    a.topic,
                    a.topic_confidence,
                    a.topic_supporting_points,
                    a.category,
                    a.subcategory,
                    a.category_confidence,
                    a.category_rationale,
                    a.brief_summary,
                    enriched_at.as_ref().map(format_ts),
                    id.0,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("document {id}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self), fields(window = %window))]
    fn enriched_in_window(
        &self,
        window: &SynthesisWindow,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM documents
                 WHERE enriched_at IS NOT NULL AND enriched_at >= ?1 AND enriched_at < ?2
                 ORDER BY COALESCE(published_at, enriched_at, ingested_at) DESC, id DESC
                 LIMIT ?3"
            ))?;
            let mut rows = stmt.query(rusqlite::params![
                format_ts(&window.start),
                format_ts(&window.end),
                sql_limit(limit),
            ])?;
            let mut docs = Vec::new();
            while let Some(row) = rows.next()? {
                docs.push(row_to_document(row)?);
            }
            Ok(docs)
        })
    }

    #[instrument(skip(self, query), fields(topics = query.topics.len(), per_topic = query.per_topic))]
    fn related_by_topic(&self, query: &TopicQuery<'_>) -> Result<Vec<Document>, StoreError> {
        if query.per_topic == 0 {
            return Ok(Vec::new());
        }
        let topics: BTreeSet<&str> = query
            .topics
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        let excluded: HashSet<DocumentId> = query.exclude.iter().copied().collect();
        let before = format_ts(&query.before);
        let since = format_ts(&query.since);

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM documents
                 WHERE TRIM(topic) = ?1 AND enriched_at IS NOT NULL AND enriched_at < ?2
                   AND (published_at >= ?3 OR ingested_at >= ?3)
                 ORDER BY enriched_at DESC, id DESC"
            ))?;
            let mut related = Vec::new();
            for topic in topics {
                let mut rows = stmt.query(rusqlite::params![topic, before, since])?;
                let mut taken = 0;
                while taken < query.per_topic {
                    let Some(row) = rows.next()? else { break };
                    let doc = row_to_document(row)?;
                    if excluded.contains(&doc.id) {
                        continue;
                    }
                    related.push(doc);
                    taken += 1;
                }
            }
            Ok(related)
        })
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn row_to_document(row: &rusqlite::Row<'_>) -> Result<Document, StoreError> {
    let published_at: Option<String> = row_helpers::get_opt(row, 5, TABLE, "published_at")?;
    let ingested_at: String = row_helpers::get(row, 6, TABLE, "ingested_at")?;
    let enriched_at: Option<String> = row_helpers::get_opt(row, 7, TABLE, "enriched_at")?;

    Ok(Document {
        id: DocumentId(row_helpers::get(row, 0, TABLE, "id")?),
        url: row_helpers::get(row, 1, TABLE, "url")?,
        title: row_helpers::get_opt(row, 2, TABLE, "title")?,
        summary: row_helpers::get_opt(row, 3, TABLE, "summary")?,
        content: row_helpers::get_opt(row, 4, TABLE, "content")?,
        published_at: row_helpers::parse_ts_opt(published_at, TABLE, "published_at")?,
        ingested_at: row_helpers::parse_ts(&ingested_at, TABLE, "ingested_at")?,
        enriched_at: row_helpers::parse_ts_opt(enriched_at, TABLE, "enriched_at")?,
        annotations: Annotations {
            location_name: row_helpers::get_opt(row, 8, TABLE, "location_name")?,
            location_country: row_helpers::get_opt(row, 9, TABLE, "location_country")?,
            location_confidence: row_helpers::get_opt(row, 10, TABLE, "location_confidence")?,
            location_justification: row_helpers::get_opt(row, 11, TABLE, "location_justification")?,
            topic: row_helpers::get_opt(row, 12, TABLE, "topic")?,
            topic_confidence: row_helpers::get_opt(row, 13, TABLE, "topic_confidence")?,
            topic_supporting_points: row_helpers::get_opt(row, 14, TABLE, "topic_supporting_points")?,
            category: row_helpers::get_opt(row, 15, TABLE, "category")?,
            subcategory: row_helpers::get_opt(row, 16, TABLE, "subcategory")?,
            category_confidence: row_helpers::get_opt(row, 17, TABLE, "category_confidence")?,
            category_rationale: row_helpers::get_opt(row, 18, TABLE, "category_rationale")?,
            brief_summary: row_helpers::get_opt(row, 19, TABLE, "brief_summary")?,
        },
    })
}
