pub mod assessment; // AI symptom assessment: prompt, provider calls, validation
pub mod config;
pub mod fusion;
pub mod health; // Wearable vitals source
pub mod models;
pub mod orchestrator; // Triage workflow state machine
pub mod persistence;
pub mod vitals_risk;

use tracing_subscriber::EnvFilter;

pub use assessment::{AssessmentClient, AssessmentError, ErrorKind};
pub use config::TriageConfig;
pub use fusion::FusionEngine;
pub use models::{TriageResult, TriageVerdict, UrgencyLevel, VitalsSnapshot};
pub use orchestrator::{AssessmentRequest, OrchestrationState, TriageError, TriageOrchestrator};

/// Install the global tracing subscriber. `RUST_LOG` wins over
/// `config::default_log_filter()`. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
