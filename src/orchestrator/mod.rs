//! Triage workflow driver.
//!
//! Sequences optional vitals retrieval, the permission dance, the AI
//! assessment and fusion, publishing every state change to subscribers.
//! One request at a time per orchestrator; `reset` abandons the current one
//! by bumping the generation, so late transitions from it are dropped.
//! Dropping an `assess` future mid-request abandons it the same way.

pub mod state;

pub use state::{Event, InvalidTransition, OrchestrationState, StateSnapshot};

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::assessment::{AssessmentClient, AssessmentError, Demographics};
use crate::fusion::FusionEngine;
use crate::health::{HealthDataError, HealthDataProvider, PermissionOutcome};
use crate::models::{TriageResult, VitalsSnapshot};
use crate::persistence::PersistenceSink;

const STATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriageError {
    #[error("An assessment is already in progress")]
    ConcurrentAssessment,

    #[error("Assessment was abandoned by a reset")]
    Superseded,

    #[error(transparent)]
    Assessment(#[from] AssessmentError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// One triage request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRequest {
    pub symptoms: String,
    #[serde(default)]
    pub vitals: Option<VitalsSnapshot>,
    /// Ask the health-data provider when `vitals` is absent.
    #[serde(default)]
    pub retrieve_vitals: bool,
    #[serde(default)]
    pub demographics: Option<Demographics>,
    /// Persist the result under this id when a sink is configured.
    #[serde(default)]
    pub patient_id: Option<String>,
}

impl AssessmentRequest {
    pub fn new(symptoms: impl Into<String>) -> Self {
        Self {
            symptoms: symptoms.into(),
            ..Self::default()
        }
    }

    pub fn with_vitals(mut self, vitals: VitalsSnapshot) -> Self {
        self.vitals = Some(vitals);
        self
    }

    pub fn retrieving_vitals(mut self) -> Self {
        self.retrieve_vitals = true;
        self
    }

    pub fn with_demographics(mut self, demographics: Demographics) -> Self {
        self.demographics = Some(demographics);
        self
    }

    pub fn for_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    fn fetches_vitals(&self) -> bool {
        self.vitals.is_none() && self.retrieve_vitals
    }
}

struct Inner {
    state: OrchestrationState,
    generation: u64,
}

/// Held for the life of one `assess` call.
struct InFlight<'a> {
    orchestrator: &'a TriageOrchestrator,
    generation: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.orchestrator.abandon(self.generation);
    }
}

pub struct TriageOrchestrator {
    client: AssessmentClient,
    fusion: FusionEngine,
    health: Option<Arc<dyn HealthDataProvider>>,
    sink: Option<Arc<dyn PersistenceSink>>,
    inner: Mutex<Inner>,
    updates: broadcast::Sender<StateSnapshot>,
}

impl TriageOrchestrator {
    pub fn new(client: AssessmentClient) -> Self {
        let fusion = FusionEngine::new(client.model_version());
        let (updates, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            client,
            fusion,
            health: None,
            sink: None,
            inner: Mutex::new(Inner {
                state: OrchestrationState::Idle,
                generation: 0,
            }),
            updates,
        }
    }

    pub fn with_health_data(mut self, health: Arc<dyn HealthDataProvider>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn current_state(&self) -> StateSnapshot {
        let inner = self.lock_inner();
        StateSnapshot {
            generation: inner.generation,
            state: inner.state.clone(),
        }
    }

    /// Every state change from now on, tagged with its generation.
    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.updates.subscribe()
    }

    /// Return to Idle from any state. An in-flight request keeps running
    /// but can no longer change state; its caller gets `Superseded`.
    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        inner.generation += 1;
        inner.state = OrchestrationState::Idle;
        tracing::info!(generation = inner.generation, "Triage workflow reset");
        self.publish(&inner);
    }

    /// Run one request to Complete or Failed.
    pub async fn assess(&self, request: AssessmentRequest) -> Result<TriageResult, TriageError> {
        let in_flight = self.begin(&request)?;
        let generation = in_flight.generation;
        let span = tracing::info_span!("triage", generation);
        self.run(generation, request).instrument(span).await
    }

    fn begin(&self, request: &AssessmentRequest) -> Result<InFlight<'_>, TriageError> {
        let mut inner = self.lock_inner();
        if inner.state.is_in_flight() {
            tracing::warn!(state = inner.state.name(), "Rejected concurrent assessment request");
            return Err(TriageError::ConcurrentAssessment);
        }
        let next = inner.state.apply(Event::Start {
            fetch_vitals: request.fetches_vitals(),
        })?;
        inner.generation += 1;
        inner.state = next;
        self.publish(&inner);
        Ok(InFlight {
            orchestrator: self,
            generation: inner.generation,
        })
    }

    /// Back to Idle if `generation` is current and never settled.
    fn abandon(&self, generation: u64) {
        let mut inner = self.lock_inner();
        if inner.generation != generation || !inner.state.is_in_flight() {
            return;
        }
        let Ok(next) = inner.state.apply(Event::Reset) else {
            return;
        };
        tracing::warn!(
            generation,
            state = inner.state.name(),
            "Assessment dropped before completion"
        );
        inner.generation += 1;
        inner.state = next;
        self.publish(&inner);
    }

    async fn run(&self, generation: u64, request: AssessmentRequest) -> Result<TriageResult, TriageError> {
        let fetch_vitals = request.fetches_vitals();
        let AssessmentRequest {
            symptoms,
            vitals,
            demographics,
            patient_id,
            ..
        } = request;

        let vitals = match vitals {
            Some(supplied) => Some(supplied),
            None if fetch_vitals => {
                let resolved = self.resolve_vitals(generation).await?;
                self.transition(generation, Event::BeginAssessment)?;
                resolved
            }
            None => None,
        };

        let outcome = self
            .client
            .assess(&symptoms, vitals.as_ref(), demographics.as_ref())
            .await;

        match outcome {
            Ok(verdict) => {
                let result = self.fusion.fuse(verdict, vitals);
                self.transition(generation, Event::AssessmentSucceeded(Box::new(result.clone())))?;
                tracing::info!(
                    assessment_id = %result.assessment_id,
                    severity = result.severity_score,
                    urgency = result.urgency_level.as_str(),
                    vitals_contribution = result.vitals_contribution,
                    critical_vitals = result.critical_vitals,
                    "Triage complete"
                );
                if let Some(patient_id) = patient_id {
                    self.persist(patient_id, &result);
                }
                Ok(result)
            }
            Err(error) => {
                self.transition(
                    generation,
                    Event::AssessmentFailed {
                        kind: error.kind(),
                        message: error.to_string(),
                    },
                )?;
                Err(TriageError::Assessment(error))
            }
        }
    }

    /// AwaitingVitals through to a state that can begin assessment.
    async fn resolve_vitals(&self, generation: u64) -> Result<Option<VitalsSnapshot>, TriageError> {
        let Some(health) = self.health.clone() else {
            self.transition(generation, Event::VitalsMissing("no health data provider".into()))?;
            return Ok(None);
        };

        if !health.has_permission() {
            self.transition(generation, Event::PermissionRequired)?;
            return self.request_permission(generation, health.as_ref()).await;
        }

        match health.get_latest_vitals().await {
            Err(HealthDataError::PermissionMissing) => {
                self.transition(generation, Event::PermissionRequired)?;
                self.request_permission(generation, health.as_ref()).await
            }
            other => self.record_fetch(generation, other),
        }
    }

    async fn request_permission(
        &self,
        generation: u64,
        health: &dyn HealthDataProvider,
    ) -> Result<Option<VitalsSnapshot>, TriageError> {
        match health.request_permission().await {
            Ok(PermissionOutcome::Granted) => {
                self.transition(generation, Event::PermissionGranted)?;
                let retry = health.get_latest_vitals().await;
                self.record_fetch(generation, retry)
            }
            Ok(PermissionOutcome::Denied) => {
                tracing::info!("Health data permission denied, assessing without vitals");
                self.transition(generation, Event::PermissionDenied)?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Permission request failed, assessing without vitals");
                self.transition(generation, Event::PermissionDenied)?;
                Ok(None)
            }
        }
    }

    fn record_fetch(
        &self,
        generation: u64,
        fetched: Result<Option<VitalsSnapshot>, HealthDataError>,
    ) -> Result<Option<VitalsSnapshot>, TriageError> {
        match fetched {
            Ok(Some(snapshot)) => {
                tracing::debug!(readings = snapshot.readings().len(), "Vitals retrieved");
                self.transition(generation, Event::VitalsReceived(snapshot.clone()))?;
                Ok(Some(snapshot))
            }
            Ok(None) => {
                self.transition(generation, Event::VitalsMissing("no data".into()))?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Vitals unavailable, assessing without them");
                self.transition(generation, Event::VitalsMissing(e.to_string()))?;
                Ok(None)
            }
        }
    }

    /// Apply `event` if `generation` is still current.
    fn transition(&self, generation: u64, event: Event) -> Result<(), TriageError> {
        let mut inner = self.lock_inner();
        if inner.generation != generation {
            tracing::debug!(
                generation,
                current = inner.generation,
                event = event.name(),
                "Dropping transition from abandoned request"
            );
            return Err(TriageError::Superseded);
        }
        let next = inner.state.apply(event)?;
        tracing::debug!(from = inner.state.name(), to = next.name(), "State transition");
        inner.state = next;
        self.publish(&inner);
        Ok(())
    }

    fn publish(&self, inner: &Inner) {
        // Nobody listening is fine.
        let _ = self.updates.send(StateSnapshot {
            generation: inner.generation,
            state: inner.state.clone(),
        });
    }

    fn persist(&self, patient_id: String, result: &TriageResult) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let result = result.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.store(&patient_id, &result).await {
                tracing::warn!(
                    assessment_id = %result.assessment_id,
                    error = %e,
                    "Failed to persist triage result"
                );
            }
        });
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        // State is replaced wholesale under the lock, so a poisoned guard
        // still holds a consistent value.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{ErrorKind, MockAiProvider, ModelParams, ProviderError, RetryPolicy};
    use crate::health::MockHealthData;
    use crate::models::UrgencyLevel;
    use crate::persistence::{InMemorySink, PersistenceError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const VERDICT: &str = r#"{"severity_score": 6, "confidence_lower": 5, "confidence_upper": 7,
        "explanation": "Chest pain needs prompt evaluation", "key_symptoms": ["chest pain"],
        "concerning_findings": [], "recommended_actions": ["Go to urgent care"],
        "urgency_level": "urgent", "time_to_treatment": "within 2 hours"}"#;

    fn orchestrator(provider: Arc<MockAiProvider>) -> TriageOrchestrator {
        let client = AssessmentClient::new(provider, ModelParams::default())
            .with_retry_policy(RetryPolicy::immediate(3));
        TriageOrchestrator::new(client)
    }

    fn drain(rx: &mut broadcast::Receiver<StateSnapshot>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            names.push(snapshot.state.name());
        }
        names
    }

    #[tokio::test]
    async fn supplied_vitals_go_straight_to_assessing() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let health = Arc::new(MockHealthData::empty());
        let orch = orchestrator(provider).with_health_data(health.clone());
        let mut rx = orch.subscribe();

        let request = AssessmentRequest::new("chest pain")
            .with_vitals(VitalsSnapshot::now().with_heart_rate(130))
            .retrieving_vitals();
        let result = orch.assess(request).await.unwrap();

        assert_eq!(result.severity_score, 8.0);
        assert_eq!(result.urgency_level, UrgencyLevel::HighPriority);
        assert_eq!(health.fetch_calls(), 0);
        assert_eq!(drain(&mut rx), vec!["assessing", "complete"]);
    }

    #[tokio::test]
    async fn retrieved_vitals_feed_fusion() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let health = Arc::new(MockHealthData::with_vitals(
            VitalsSnapshot::now().with_oxygen_saturation(88.0),
        ));
        let orch = orchestrator(provider.clone()).with_health_data(health);
        let mut rx = orch.subscribe();

        let result = orch
            .assess(AssessmentRequest::new("short of breath").retrieving_vitals())
            .await
            .unwrap();

        assert_eq!(result.vitals_contribution, 3.0);
        assert_eq!(result.severity_score, 9.0);
        assert!(result.critical_vitals);
        assert_eq!(
            drain(&mut rx),
            vec!["awaiting_vitals", "vitals_ready", "assessing", "complete"]
        );
        let prompt = provider.last_prompt().unwrap();
        assert!(prompt.user.contains("Oxygen saturation"));
    }

    #[tokio::test]
    async fn no_data_still_assesses() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let orch = orchestrator(provider).with_health_data(Arc::new(MockHealthData::empty()));
        let mut rx = orch.subscribe();

        let result = orch
            .assess(AssessmentRequest::new("headache").retrieving_vitals())
            .await
            .unwrap();
        assert!(result.vitals.is_none());
        assert_eq!(result.vitals_contribution, 0.0);
        assert_eq!(
            drain(&mut rx),
            vec!["awaiting_vitals", "vitals_unavailable", "assessing", "complete"]
        );
    }

    #[tokio::test]
    async fn health_provider_error_is_recovered() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let health = Arc::new(MockHealthData::failing(HealthDataError::Provider(
            "sensor offline".into(),
        )));
        let orch = orchestrator(provider).with_health_data(health);

        let result = orch
            .assess(AssessmentRequest::new("headache").retrieving_vitals())
            .await
            .unwrap();
        assert!(result.vitals.is_none());
        assert_eq!(orch.current_state().state.name(), "complete");
    }

    #[tokio::test]
    async fn missing_health_provider_means_no_vitals() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let orch = orchestrator(provider);
        let result = orch
            .assess(AssessmentRequest::new("headache").retrieving_vitals())
            .await
            .unwrap();
        assert!(result.vitals.is_none());
    }

    #[tokio::test]
    async fn permission_denial_assesses_without_vitals() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let health = Arc::new(
            MockHealthData::without_permission(Some(VitalsSnapshot::now().with_heart_rate(45)))
                .with_permission_answer(Ok(PermissionOutcome::Denied)),
        );
        let orch = orchestrator(provider).with_health_data(health.clone());
        let mut rx = orch.subscribe();

        let result = orch
            .assess(AssessmentRequest::new("dizzy").retrieving_vitals())
            .await
            .unwrap();

        assert!(result.vitals.is_none());
        assert_eq!(health.fetch_calls(), 0);
        let states = drain(&mut rx);
        assert_eq!(
            states,
            vec![
                "awaiting_vitals",
                "awaiting_permission",
                "permission_denied",
                "assessing",
                "complete"
            ]
        );
        assert!(!states.contains(&"failed"));
    }

    #[tokio::test]
    async fn permission_request_error_counts_as_denial() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let health = Arc::new(
            MockHealthData::without_permission(None)
                .with_permission_answer(Err(HealthDataError::Provider("dialog crashed".into()))),
        );
        let orch = orchestrator(provider).with_health_data(health);
        let result = orch
            .assess(AssessmentRequest::new("dizzy").retrieving_vitals())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn granted_permission_retries_retrieval_once() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let health = Arc::new(MockHealthData::without_permission(Some(
            VitalsSnapshot::now().with_heart_rate(45),
        )));
        let orch = orchestrator(provider).with_health_data(health.clone());
        let mut rx = orch.subscribe();

        let result = orch
            .assess(AssessmentRequest::new("dizzy").retrieving_vitals())
            .await
            .unwrap();

        assert!(result.critical_vitals);
        assert_eq!(result.vitals_contribution, 2.5);
        assert_eq!(health.permission_requests(), 1);
        assert_eq!(health.fetch_calls(), 1);
        assert_eq!(
            drain(&mut rx),
            vec![
                "awaiting_vitals",
                "awaiting_permission",
                "permission_granted",
                "vitals_ready",
                "assessing",
                "complete"
            ]
        );
    }

    #[tokio::test]
    async fn permission_error_from_fetch_triggers_prompt() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let health = Arc::new(
            MockHealthData::with_vitals(VitalsSnapshot::now().with_heart_rate(70))
                .with_fetch_script(vec![Err(HealthDataError::PermissionMissing)]),
        );
        let orch = orchestrator(provider).with_health_data(health.clone());

        let result = orch
            .assess(AssessmentRequest::new("tired").retrieving_vitals())
            .await
            .unwrap();
        assert_eq!(result.vitals.and_then(|v| v.heart_rate()), Some(70));
        assert_eq!(health.fetch_calls(), 2);
        assert_eq!(health.permission_requests(), 1);
    }

    #[tokio::test]
    async fn provider_failure_ends_in_failed_state() {
        let provider = Arc::new(MockAiProvider::failing(ProviderError::Server {
            status: 503,
            body: "overloaded".into(),
        }));
        let orch = orchestrator(provider.clone());

        let err = orch.assess(AssessmentRequest::new("fever")).await.unwrap_err();
        match err {
            TriageError::Assessment(e) => assert_eq!(e.kind(), ErrorKind::ProviderUnavailable),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.calls(), 4);
        match orch.current_state().state {
            OrchestrationState::Failed { kind, message } => {
                assert_eq!(kind, ErrorKind::ProviderUnavailable);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_symptoms_fail_without_provider_call() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let orch = orchestrator(provider.clone());
        let err = orch.assess(AssessmentRequest::new("   ")).await.unwrap_err();
        assert!(matches!(
            err,
            TriageError::Assessment(AssessmentError::InvalidInput(_))
        ));
        assert_eq!(provider.calls(), 0);
        assert_eq!(orch.current_state().state.name(), "failed");
    }

    #[tokio::test]
    async fn concurrent_request_rejected_without_disturbing_first() {
        let provider = Arc::new(MockAiProvider::new(VERDICT).with_delay(Duration::from_millis(50)));
        let orch = Arc::new(orchestrator(provider.clone()));

        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.assess(AssessmentRequest::new("chest pain")).await }
        });
        tokio::task::yield_now().await;
        while !orch.current_state().state.is_in_flight() {
            tokio::task::yield_now().await;
        }

        let second = orch.assess(AssessmentRequest::new("headache")).await;
        assert_eq!(second.unwrap_err(), TriageError::ConcurrentAssessment);

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.severity_score, 6.0);
        assert_eq!(provider.calls(), 1);
        assert_eq!(orch.current_state().state.name(), "complete");
    }

    #[tokio::test]
    async fn new_request_allowed_after_completion() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let orch = orchestrator(provider);
        let a = orch.assess(AssessmentRequest::new("cough")).await.unwrap();
        let b = orch.assess(AssessmentRequest::new("cough")).await.unwrap();
        assert_ne!(a.assessment_id, b.assessment_id);
        assert_eq!(orch.current_state().generation, 2);
    }

    #[tokio::test]
    async fn reset_discards_late_result() {
        let provider = Arc::new(MockAiProvider::new(VERDICT).with_delay(Duration::from_millis(50)));
        let sink = Arc::new(InMemorySink::new());
        let orch = Arc::new(orchestrator(provider).with_sink(sink.clone()));

        let pending = tokio::spawn({
            let orch = orch.clone();
            async move {
                orch.assess(AssessmentRequest::new("chest pain").for_patient("p-1"))
                    .await
            }
        });
        while orch.current_state().state != OrchestrationState::Assessing {
            tokio::task::yield_now().await;
        }

        orch.reset();
        assert_eq!(orch.current_state().state, OrchestrationState::Idle);

        let outcome = pending.await.unwrap();
        assert_eq!(outcome.unwrap_err(), TriageError::Superseded);
        let after = orch.current_state();
        assert_eq!(after.state, OrchestrationState::Idle);
        assert_eq!(after.generation, 2);
        tokio::task::yield_now().await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn completed_result_is_persisted_for_patient() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let sink = Arc::new(InMemorySink::new());
        let mut feed = sink.subscribe("p-7");
        let orch = orchestrator(provider).with_sink(sink.clone());

        let result = orch
            .assess(AssessmentRequest::new("rash").for_patient("p-7"))
            .await
            .unwrap();

        let stored = tokio::time::timeout(Duration::from_secs(1), feed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.assessment_id, result.assessment_id);
        assert_eq!(sink.query_by_patient("p-7").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_without_patient_is_not_persisted() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let sink = Arc::new(InMemorySink::new());
        let orch = orchestrator(provider).with_sink(sink.clone());
        orch.assess(AssessmentRequest::new("rash")).await.unwrap();
        tokio::task::yield_now().await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn dropped_request_frees_the_orchestrator() {
        let provider = Arc::new(MockAiProvider::new(VERDICT).with_delay(Duration::from_millis(50)));
        let orch = orchestrator(provider);
        let mut rx = orch.subscribe();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            orch.assess(AssessmentRequest::new("chest pain")),
        )
        .await;
        assert!(timed_out.is_err());

        let after = orch.current_state();
        assert_eq!(after.state, OrchestrationState::Idle);
        assert_eq!(after.generation, 2);
        assert_eq!(drain(&mut rx), vec!["assessing", "idle"]);

        let next = orch.assess(AssessmentRequest::new("chest pain")).await.unwrap();
        assert_eq!(next.severity_score, 6.0);
        assert_eq!(orch.current_state().state.name(), "complete");
    }

    #[tokio::test]
    async fn dropped_request_during_vitals_fetch_returns_to_idle() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let health = Arc::new(
            MockHealthData::with_vitals(VitalsSnapshot::now().with_heart_rate(72))
                .with_delay(Duration::from_millis(50)),
        );
        let orch = orchestrator(provider.clone()).with_health_data(health.clone());

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            orch.assess(AssessmentRequest::new("tired").retrieving_vitals()),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(health.fetch_calls(), 1);
        assert_eq!(provider.calls(), 0);
        assert_eq!(orch.current_state().state, OrchestrationState::Idle);

        let result = orch
            .assess(AssessmentRequest::new("tired").retrieving_vitals())
            .await
            .unwrap();
        assert_eq!(result.vitals.and_then(|v| v.heart_rate()), Some(72));
    }

    #[tokio::test]
    async fn aborting_an_abandoned_request_leaves_the_next_one_alone() {
        let provider = Arc::new(MockAiProvider::new(VERDICT).with_delay(Duration::from_millis(50)));
        let orch = Arc::new(orchestrator(provider));

        let stale = tokio::spawn({
            let orch = orch.clone();
            async move { orch.assess(AssessmentRequest::new("chest pain")).await }
        });
        while orch.current_state().state != OrchestrationState::Assessing {
            tokio::task::yield_now().await;
        }
        orch.reset();

        let current = tokio::spawn({
            let orch = orch.clone();
            async move { orch.assess(AssessmentRequest::new("headache")).await }
        });
        while orch.current_state().generation != 3 {
            tokio::task::yield_now().await;
        }
        stale.abort();
        let _ = stale.await;

        assert_eq!(orch.current_state().state, OrchestrationState::Assessing);
        assert!(current.await.unwrap().is_ok());
        let after = orch.current_state();
        assert_eq!(after.state.name(), "complete");
        assert_eq!(after.generation, 3);
    }

    struct UnavailableSink {
        attempts: AtomicU32,
        feed: broadcast::Sender<TriageResult>,
    }

    impl UnavailableSink {
        fn new() -> Self {
            Self {
                attempts: AtomicU32::new(0),
                feed: broadcast::channel(1).0,
            }
        }
    }

    #[async_trait]
    impl PersistenceSink for UnavailableSink {
        async fn store(&self, _patient_id: &str, _result: &TriageResult) -> Result<(), PersistenceError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::Unavailable("disk full".into()))
        }

        async fn query_by_patient(&self, _patient_id: &str) -> Result<Vec<TriageResult>, PersistenceError> {
            Err(PersistenceError::Unavailable("disk full".into()))
        }

        fn subscribe(&self, _patient_id: &str) -> broadcast::Receiver<TriageResult> {
            self.feed.subscribe()
        }
    }

    #[tokio::test]
    async fn sink_failure_keeps_completed_result() {
        let provider = Arc::new(MockAiProvider::new(VERDICT));
        let sink = Arc::new(UnavailableSink::new());
        let orch = orchestrator(provider).with_sink(sink.clone());

        let result = orch
            .assess(AssessmentRequest::new("rash").for_patient("p-9"))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while sink.attempts.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(result.severity_score, 6.0);
        match orch.current_state().state {
            OrchestrationState::Complete(stored) => {
                assert_eq!(stored.assessment_id, result.assessment_id)
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn request_deserializes_camel_case() {
        let request: AssessmentRequest = serde_json::from_value(serde_json::json!({
            "symptoms": "chest pain",
            "retrieveVitals": true,
            "patientId": "p-1",
            "demographics": {"age": "54"}
        }))
        .unwrap();
        assert!(request.fetches_vitals());
        assert_eq!(request.patient_id.as_deref(), Some("p-1"));
        assert_eq!(request.demographics.unwrap()["age"], "54");
    }
}
