/// SQL DDL for the nerv-store database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    summary TEXT,
    content TEXT,
    published_at TEXT,
    ingested_at TEXT NOT NULL,
    enriched_at TEXT,
    location_name TEXT,
    location_country TEXT,
    location_confidence REAL,
    location_justification TEXT,
    topic TEXT,
    topic_confidence REAL,
    topic_supporting_points TEXT,
    category TEXT,
    subcategory TEXT,
    category_confidence REAL,
    category_rationale TEXT,
    brief_summary TEXT
);

CREATE TABLE IF NOT EXISTS synthesis_records (
    id TEXT PRIMARY KEY,
    window_start TEXT NOT NULL,
    window_end TEXT NOT NULL,
    document_ids_json TEXT NOT NULL,
    draft_json TEXT,
    feedback_json TEXT,
    final_json TEXT,
    iteration_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'draft',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS synthesis_evaluations (
    id TEXT PRIMARY KEY,
    synthesis_id TEXT NOT NULL REFERENCES synthesis_records(id),
    profile_title TEXT NOT NULL,
    overall_relevance REAL,
    overall_criticality REAL,
    ratings_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_enriched ON documents(enriched_at);
CREATE INDEX IF NOT EXISTS idx_documents_topic ON documents(topic, enriched_at);
CREATE INDEX IF NOT EXISTS idx_synthesis_status_end ON synthesis_records(status, window_end);
CREATE INDEX IF NOT EXISTS idx_evaluations_synthesis ON synthesis_evaluations(synthesis_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
