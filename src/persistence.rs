//! Persistence sink for finalized results.
//!
//! The engine hands results over fire-and-forget; a sink failure is logged
//! by the caller and never changes the outcome of an assessment.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::TriageResult;

const SUBSCRIPTION_CAPACITY: usize = 32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// One stored assessment, keyed by patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAssessment {
    pub patient_id: String,
    pub result: TriageResult,
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Stores the result; the vitals snapshot travels inside it.
    async fn store(&self, patient_id: &str, result: &TriageResult) -> Result<(), PersistenceError>;

    /// All results for a patient, newest first.
    async fn query_by_patient(&self, patient_id: &str) -> Result<Vec<TriageResult>, PersistenceError>;

    /// Live feed of results stored for a patient after this call.
    fn subscribe(&self, patient_id: &str) -> broadcast::Receiver<TriageResult>;
}

/// In-process sink used by the CLI and tests.
#[derive(Default)]
pub struct InMemorySink {
    records: Mutex<Vec<StoredAssessment>>,
    channels: Mutex<HashMap<String, broadcast::Sender<TriageResult>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceSink for InMemorySink {
    async fn store(&self, patient_id: &str, result: &TriageResult) -> Result<(), PersistenceError> {
        if patient_id.trim().is_empty() {
            return Err(PersistenceError::Rejected("patient id is empty".into()));
        }
        {
            let mut records = self
                .records
                .lock()
                .map_err(|_| PersistenceError::Unavailable("record lock poisoned".into()))?;
            if records
                .iter()
                .any(|r| r.result.assessment_id == result.assessment_id)
            {
                return Err(PersistenceError::Rejected(format!(
                    "assessment {} already stored",
                    result.assessment_id
                )));
            }
            records.push(StoredAssessment {
                patient_id: patient_id.to_string(),
                result: result.clone(),
            });
        }

        if let Ok(channels) = self.channels.lock() {
            if let Some(tx) = channels.get(patient_id) {
                // No live subscribers is not an error.
                let _ = tx.send(result.clone());
            }
        }
        tracing::debug!(assessment_id = %result.assessment_id, "Triage result stored");
        Ok(())
    }

    async fn query_by_patient(&self, patient_id: &str) -> Result<Vec<TriageResult>, PersistenceError> {
        let records = self
            .records
            .lock()
            .map_err(|_| PersistenceError::Unavailable("record lock poisoned".into()))?;
        let mut results: Vec<TriageResult> = records
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .map(|r| r.result.clone())
            .collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(results)
    }

    fn subscribe(&self, patient_id: &str) -> broadcast::Receiver<TriageResult> {
        match self.channels.lock() {
            Ok(mut channels) => channels
                .entry(patient_id.to_string())
                .or_insert_with(|| broadcast::channel(SUBSCRIPTION_CAPACITY).0)
                .subscribe(),
            // Poisoned map: hand back a receiver that will only ever see Closed.
            Err(_) => broadcast::channel(1).1,
        }
    }
}
