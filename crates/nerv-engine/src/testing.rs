//! Contract-routed generator stub and document fixtures for engine tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use nerv_core::contract::{PromptContract, PromptVars};
use nerv_core::document::{Annotations, Document};
use nerv_core::errors::{AttemptError, GenerationError};
use nerv_core::ids::DocumentId;
use nerv_llm::StructuredGenerator;

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub contract: String,
    pub vars: PromptVars,
    pub max_attempts: Option<u32>,
}

/// Replies are scripted per contract name and consumed in order.
/// An exhausted script is a generation failure.
pub struct ScriptedGenerator {
    context_window: u32,
    scripts: Mutex<HashMap<String, VecDeque<Option<Value>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    pub fn new(context_window: u32) -> Self {
        Self {
            context_window,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, contract: &PromptContract, payload: Value) -> Self {
        self.push(contract, Some(payload))
    }

    pub fn fail(self, contract: &PromptContract) -> Self {
        self.push(contract, None)
    }

    fn push(self, contract: &PromptContract, entry: Option<Value>) -> Self {
        self.scripts
            .lock()
            .entry(contract.name.clone())
            .or_default()
            .push_back(entry);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, contract: &PromptContract) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.contract == contract.name)
            .collect()
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    fn context_window(&self) -> u32 {
        self.context_window
    }

    async fn generate(
        &self,
        contract: &PromptContract,
        vars: &PromptVars,
        max_attempts: Option<u32>,
    ) -> Result<Map<String, Value>, GenerationError> {
        self.calls.lock().push(RecordedCall {
            contract: contract.name.clone(),
            vars: vars.clone(),
            max_attempts,
        });
        let next = self
            .scripts
            .lock()
            .get_mut(&contract.name)
            .and_then(VecDeque::pop_front)
            .flatten();
        match next {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(GenerationError {
                contract: contract.name.clone(),
                attempts: max_attempts.unwrap_or(3),
                source: AttemptError::EmptyResponse,
                diagnostic: Box::default(),
            }),
        }
    }
}

pub fn document(id: i64, at: DateTime<Utc>) -> Document {
    Document {
        id: DocumentId(id),
        url: format!("https://news.example/{id}"),
        title: Some(format!("Story {id}")),
        summary: Some(format!("Summary {id}")),
        content: Some(format!("Body of story {id}")),
        published_at: None,
        ingested_at: at,
        enriched_at: None,
        annotations: Annotations::default(),
    }
}
