use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{DocumentId, EvaluationId, SynthesisId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStatus {
    Draft,
    Completed,
    Error,
}

impl SynthesisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SynthesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SynthesisStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown synthesis status: {other}")),
        }
    }
}

/// Half-open time range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SynthesisWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Human-readable range used in writer prompts.
    pub fn describe(&self) -> String {
        format!(
            "{} \u{2013} {}",
            self.start.format("%Y-%m-%d %H:%M UTC"),
            self.end.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

impl fmt::Display for SynthesisWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// One summarization cycle's artifact, owned by the orchestrator that opened it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRecord {
    pub id: SynthesisId,
    pub window: SynthesisWindow,
    pub document_ids: Vec<DocumentId>,
    pub draft: Option<Value>,
    pub feedback: Option<Value>,
    pub final_payload: Option<Value>,
    pub iteration_count: u32,
    pub status: SynthesisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SynthesisRecord {
    pub fn open(window: SynthesisWindow, document_ids: Vec<DocumentId>, now: DateTime<Utc>) -> Self {
        Self {
            id: SynthesisId::new(),
            window,
            document_ids,
            draft: None,
            feedback: None,
            final_payload: None,
            iteration_count: 0,
            status: SynthesisStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Relevance rating of a completed synthesis against an audience profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthesisEvaluation {
    pub id: EvaluationId,
    pub synthesis_id: SynthesisId,
    pub profile_title: String,
    pub overall_relevance: Option<f64>,
    pub overall_criticality: Option<f64>,
    pub ratings: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn window_describe_format() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let window = SynthesisWindow::new(start, start + Duration::hours(1));
        assert_eq!(window.describe(), "2024-05-01 08:00 UTC \u{2013} 2024-05-01 09:00 UTC");
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in [SynthesisStatus::Draft, SynthesisStatus::Completed, SynthesisStatus::Error] {
            assert_eq!(status.as_str().parse::<SynthesisStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<SynthesisStatus>().is_err());
    }

    #[test]
    fn open_record_starts_as_draft() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let window = SynthesisWindow::new(now - Duration::hours(1), now);
        let record = SynthesisRecord::open(window, vec![DocumentId(3)], now);
        assert_eq!(record.status, SynthesisStatus::Draft);
        assert_eq!(record.iteration_count, 0);
        assert!(record.final_payload.is_none());
    }
}
