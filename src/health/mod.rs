//! Health-data provider boundary: where wearable vitals come from.
//!
//! The orchestrator only ever sees this trait. Permission and data errors
//! are recovered locally by assessing without vitals.

pub mod file;
pub mod mock;

pub use file::{JsonFileHealthData, StaticHealthData};
pub use mock::MockHealthData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::VitalsSnapshot;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealthDataError {
    #[error("Health data permission has not been granted")]
    PermissionMissing,

    #[error("Health data provider error: {0}")]
    Provider(String),
}

/// Answer to a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

#[async_trait]
pub trait HealthDataProvider: Send + Sync {
    /// Latest snapshot, or `None` when the source holds no readings.
    async fn get_latest_vitals(&self) -> Result<Option<VitalsSnapshot>, HealthDataError>;

    /// Cheap synchronous check, consulted before any fetch.
    fn has_permission(&self) -> bool;

    async fn request_permission(&self) -> Result<PermissionOutcome, HealthDataError>;
}
