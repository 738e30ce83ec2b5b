use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::{HealthDataError, HealthDataProvider, PermissionOutcome};
use crate::models::VitalsSnapshot;

/// Reads a wearable export from disk.
///
/// The file holds either one snapshot or an array of snapshots; the one with
/// the newest timestamp wins. A missing file means "no data".
pub struct JsonFileHealthData {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExportFile {
    Many(Vec<VitalsSnapshot>),
    One(VitalsSnapshot),
}

impl JsonFileHealthData {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn latest_from_export(raw: &str) -> Result<Option<VitalsSnapshot>, HealthDataError> {
    let export: ExportFile = serde_json::from_str(raw)
        .map_err(|e| HealthDataError::Provider(format!("invalid vitals export: {e}")))?;

    Ok(match export {
        ExportFile::One(snapshot) => Some(snapshot),
        ExportFile::Many(snapshots) => snapshots.into_iter().max_by_key(|s| s.timestamp()),
    })
}

#[async_trait]
impl HealthDataProvider for JsonFileHealthData {
    async fn get_latest_vitals(&self) -> Result<Option<VitalsSnapshot>, HealthDataError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No vitals export on disk");
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(HealthDataError::PermissionMissing);
            }
            Err(e) => return Err(HealthDataError::Provider(e.to_string())),
        };
        latest_from_export(&raw)
    }

    fn has_permission(&self) -> bool {
        true
    }

    async fn request_permission(&self) -> Result<PermissionOutcome, HealthDataError> {
        Ok(PermissionOutcome::Granted)
    }
}

/// Fixed snapshot, e.g. readings typed on the command line.
pub struct StaticHealthData {
    snapshot: Option<VitalsSnapshot>,
}

impl StaticHealthData {
    pub fn new(snapshot: Option<VitalsSnapshot>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl HealthDataProvider for StaticHealthData {
    async fn get_latest_vitals(&self) -> Result<Option<VitalsSnapshot>, HealthDataError> {
        Ok(self.snapshot.clone())
    }

    fn has_permission(&self) -> bool {
        true
    }

    async fn request_permission(&self) -> Result<PermissionOutcome, HealthDataError> {
        Ok(PermissionOutcome::Granted)
    }
}
