//! Workflow states and the pure transition function.
//!
//! The driver never assigns a state directly: it feeds an `Event` to
//! `OrchestrationState::apply` and stores whatever comes back.

use serde::Serialize;
use thiserror::Error;

use crate::assessment::ErrorKind;
use crate::models::{TriageResult, VitalsSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum OrchestrationState {
    Idle,
    AwaitingVitals,
    VitalsReady(VitalsSnapshot),
    VitalsUnavailable(String),
    AwaitingPermission,
    PermissionGranted,
    PermissionDenied,
    Assessing,
    Complete(Box<TriageResult>),
    Failed { kind: ErrorKind, message: String },
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// New request. `fetch_vitals` is false when vitals were supplied or
    /// retrieval was not asked for.
    Start { fetch_vitals: bool },
    VitalsReceived(VitalsSnapshot),
    VitalsMissing(String),
    PermissionRequired,
    PermissionGranted,
    PermissionDenied,
    BeginAssessment,
    AssessmentSucceeded(Box<TriageResult>),
    AssessmentFailed { kind: ErrorKind, message: String },
    Reset,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::VitalsReceived(_) => "vitals_received",
            Event::VitalsMissing(_) => "vitals_missing",
            Event::PermissionRequired => "permission_required",
            Event::PermissionGranted => "permission_granted",
            Event::PermissionDenied => "permission_denied",
            Event::BeginAssessment => "begin_assessment",
            Event::AssessmentSucceeded(_) => "assessment_succeeded",
            Event::AssessmentFailed { .. } => "assessment_failed",
            Event::Reset => "reset",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid transition: {event} in state {from}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub event: &'static str,
}

impl OrchestrationState {
    pub fn name(&self) -> &'static str {
        match self {
            OrchestrationState::Idle => "idle",
            OrchestrationState::AwaitingVitals => "awaiting_vitals",
            OrchestrationState::VitalsReady(_) => "vitals_ready",
            OrchestrationState::VitalsUnavailable(_) => "vitals_unavailable",
            OrchestrationState::AwaitingPermission => "awaiting_permission",
            OrchestrationState::PermissionGranted => "permission_granted",
            OrchestrationState::PermissionDenied => "permission_denied",
            OrchestrationState::Assessing => "assessing",
            OrchestrationState::Complete(_) => "complete",
            OrchestrationState::Failed { .. } => "failed",
        }
    }

    /// True while a request owns the orchestrator.
    pub fn is_in_flight(&self) -> bool {
        !matches!(
            self,
            OrchestrationState::Idle
                | OrchestrationState::Complete(_)
                | OrchestrationState::Failed { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestrationState::Complete(_) | OrchestrationState::Failed { .. }
        )
    }

    pub fn apply(&self, event: Event) -> Result<OrchestrationState, InvalidTransition> {
        use OrchestrationState as S;

        let next = match (self, event) {
            (_, Event::Reset) => S::Idle,

            (S::Idle | S::Complete(_) | S::Failed { .. }, Event::Start { fetch_vitals }) => {
                if fetch_vitals {
                    S::AwaitingVitals
                } else {
                    S::Assessing
                }
            }

            (S::AwaitingVitals | S::PermissionGranted, Event::VitalsReceived(snapshot)) => {
                S::VitalsReady(snapshot)
            }
            (S::AwaitingVitals | S::PermissionGranted, Event::VitalsMissing(reason)) => {
                S::VitalsUnavailable(reason)
            }
            (S::AwaitingVitals, Event::PermissionRequired) => S::AwaitingPermission,

            (S::AwaitingPermission, Event::PermissionGranted) => S::PermissionGranted,
            (S::AwaitingPermission, Event::PermissionDenied) => S::PermissionDenied,

            (
                S::VitalsReady(_) | S::VitalsUnavailable(_) | S::PermissionDenied,
                Event::BeginAssessment,
            ) => S::Assessing,

            (S::Assessing, Event::AssessmentSucceeded(result)) => S::Complete(result),
            (S::Assessing, Event::AssessmentFailed { kind, message }) => S::Failed { kind, message },

            (from, event) => {
                return Err(InvalidTransition {
                    from: from.name(),
                    event: event.name(),
                })
            }
        };
        Ok(next)
    }
}

/// State plus the request generation that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub generation: u64,
    pub state: OrchestrationState,
}
