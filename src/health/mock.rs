use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{HealthDataError, HealthDataProvider, PermissionOutcome};
use crate::models::VitalsSnapshot;

type FetchResult = Result<Option<VitalsSnapshot>, HealthDataError>;

/// Mock health-data provider for testing.
///
/// Fetches replay a script, then repeat the fallback. A granted permission
/// request flips `has_permission` to true.
pub struct MockHealthData {
    permitted: AtomicBool,
    fetches: Mutex<VecDeque<FetchResult>>,
    fallback: FetchResult,
    permission_answer: Result<PermissionOutcome, HealthDataError>,
    delay: Option<Duration>,
    fetch_calls: AtomicU32,
    permission_requests: AtomicU32,
}

impl MockHealthData {
    /// Permission granted, always returns `snapshot`.
    pub fn with_vitals(snapshot: VitalsSnapshot) -> Self {
        Self::build(true, Ok(Some(snapshot)))
    }

    /// Permission granted, source holds no readings.
    pub fn empty() -> Self {
        Self::build(true, Ok(None))
    }

    /// Permission granted, every fetch fails with `error`.
    pub fn failing(error: HealthDataError) -> Self {
        Self::build(true, Err(error))
    }

    /// Permission not yet granted; fetches return `snapshot` once it is.
    pub fn without_permission(snapshot: Option<VitalsSnapshot>) -> Self {
        Self::build(false, Ok(snapshot))
    }

    fn build(permitted: bool, fallback: FetchResult) -> Self {
        Self {
            permitted: AtomicBool::new(permitted),
            fetches: Mutex::new(VecDeque::new()),
            fallback,
            permission_answer: Ok(PermissionOutcome::Granted),
            delay: None,
            fetch_calls: AtomicU32::new(0),
            permission_requests: AtomicU32::new(0),
        }
    }

    /// Answer returned by `request_permission`.
    pub fn with_permission_answer(
        mut self,
        answer: Result<PermissionOutcome, HealthDataError>,
    ) -> Self {
        self.permission_answer = answer;
        self
    }

    /// Results returned by the first fetches, before the fallback.
    pub fn with_fetch_script(self, script: Vec<FetchResult>) -> Self {
        if let Ok(mut fetches) = self.fetches.lock() {
            *fetches = script.into();
        }
        self
    }

    /// Sleep before answering each fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn permission_requests(&self) -> u32 {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthDataProvider for MockHealthData {
    async fn get_latest_vitals(&self) -> Result<Option<VitalsSnapshot>, HealthDataError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .fetches
            .lock()
            .ok()
            .and_then(|mut f| f.pop_front())
            .unwrap_or_else(|| {
                if self.permitted.load(Ordering::SeqCst) {
                    self.fallback.clone()
                } else {
                    Err(HealthDataError::PermissionMissing)
                }
            });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next
    }

    fn has_permission(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> Result<PermissionOutcome, HealthDataError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        if let Ok(PermissionOutcome::Granted) = self.permission_answer {
            self.permitted.store(true, Ordering::SeqCst);
        }
        self.permission_answer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn granting_permission_unlocks_fetch() {
        let mock = MockHealthData::without_permission(Some(VitalsSnapshot::now().with_heart_rate(72)));
        assert!(!mock.has_permission());
        assert_eq!(
            mock.get_latest_vitals().await,
            Err(HealthDataError::PermissionMissing)
        );

        assert_eq!(mock.request_permission().await, Ok(PermissionOutcome::Granted));
        assert!(mock.has_permission());
        let snapshot = mock.get_latest_vitals().await.unwrap().unwrap();
        assert_eq!(snapshot.heart_rate(), Some(72));
        assert_eq!(mock.fetch_calls(), 2);
        assert_eq!(mock.permission_requests(), 1);
    }

    #[tokio::test]
    async fn denied_permission_stays_locked() {
        let mock = MockHealthData::without_permission(None)
            .with_permission_answer(Ok(PermissionOutcome::Denied));
        assert_eq!(mock.request_permission().await, Ok(PermissionOutcome::Denied));
        assert!(!mock.has_permission());
    }

    #[tokio::test]
    async fn fetch_script_runs_before_fallback() {
        let mock = MockHealthData::empty()
            .with_fetch_script(vec![Err(HealthDataError::Provider("sensor offline".into()))]);
        assert!(mock.get_latest_vitals().await.is_err());
        assert_eq!(mock.get_latest_vitals().await, Ok(None));
    }
}
