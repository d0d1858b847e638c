//! Two-phase photo capture: request, then poll on a fixed schedule
//!
//! The device takes the photo asynchronously after the registry accepts the
//! request. The poller waits `schedule[n-1]` before attempt `n` and stops at
//! the first URL, at the end of the schedule, on a registry error, or when
//! cancelled.

use std::future::Future;
use std::time::Duration;

use camfleet_core::DeviceId;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{DeviceApi, RegistryError};

/// Delay before each fetch attempt, in seconds
pub const DEFAULT_SCHEDULE_SECS: [u64; 12] = [3, 4, 5, 5, 5, 5, 6, 6, 7, 7, 8, 9];

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("Photo capture request failed: {0}")]
    CaptureRequest(#[source] RegistryError),
    #[error("No photo after {attempts} attempts over {waited:?}")]
    Timeout { attempts: usize, waited: Duration },
    #[error("Photo capture cancelled")]
    Cancelled,
    #[error("Photo polling failed: {0}")]
    Registry(#[source] RegistryError),
}

/// Source of delays, replaceable in tests
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    delays: Vec<Duration>,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from_secs(&DEFAULT_SCHEDULE_SECS)
    }
}

impl PollSchedule {
    pub fn from_secs(secs: &[u64]) -> Self {
        Self {
            delays: secs.iter().map(|s| Duration::from_secs(*s)).collect(),
        }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    /// Total wait if every attempt comes back empty
    pub fn total(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Progress of one capture
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhotoState {
    Idle,
    Requested,
    Polling { attempt: usize },
    Ready { url: String },
    Exhausted { reason: String },
    Cancelled,
}


/// Drives one capture at a time and publishes its state
pub struct PhotoPoller<C = TokioClock> {
    clock: C,
    schedule: PollSchedule,
    state_tx: watch::Sender<PhotoState>,
}

impl PhotoPoller<TokioClock> {
    pub fn new(schedule: PollSchedule) -> Self {
        Self::with_clock(TokioClock, schedule)
    }
}

impl<C: Clock> PhotoPoller<C> {
    pub fn with_clock(clock: C, schedule: PollSchedule) -> Self {
        let (state_tx, _) = watch::channel(PhotoState::Idle);
        Self {
            clock,
            schedule,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PhotoState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> PhotoState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, device: &DeviceId, state: PhotoState) {
        debug!(device = %device, state = ?state, "Photo state");
        self.state_tx.send_replace(state);
    }

    fn fail(&self, device: &DeviceId, error: PhotoError) -> PhotoError {
        let state = match &error {
            PhotoError::Cancelled => PhotoState::Cancelled,
            other => PhotoState::Exhausted {
                reason: other.to_string(),
            },
        };
        self.set_state(device, state);
        error
    }

    /// Request a photo and poll until a URL is available
    pub async fn capture<A: DeviceApi>(
        &self,
        api: &A,
        device: &DeviceId,
        cancel: &CancellationToken,
    ) -> Result<String, PhotoError> {
        if cancel.is_cancelled() {
            return Err(self.fail(device, PhotoError::Cancelled));
        }

        self.set_state(device, PhotoState::Requested);
        let requested = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.fail(device, PhotoError::Cancelled)),
            result = api.request_photo_capture(device) => result,
        };
        if let Err(e) = requested {
            warn!(device = %device, error = %e, "Photo capture request failed");
            return Err(self.fail(device, PhotoError::CaptureRequest(e)));
        }

        for (index, delay) in self.schedule.delays().iter().enumerate() {
            let attempt = index + 1;
            self.set_state(device, PhotoState::Polling { attempt });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.fail(device, PhotoError::Cancelled)),
                _ = self.clock.sleep(*delay) => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.fail(device, PhotoError::Cancelled)),
                result = api.fetch_last_photo(device) => result,
            };
            match fetched {
                Ok(Some(url)) => {
                    info!(device = %device, attempt, "Photo ready");
                    self.set_state(device, PhotoState::Ready { url: url.clone() });
                    return Ok(url);
                }
                Ok(None) => debug!(device = %device, attempt, "Photo not ready yet"),
                // half-written photo record
                Err(RegistryError::Decode(e)) => {
                    debug!(device = %device, attempt, error = %e, "Photo response unreadable, polling on")
                }
                Err(e) => {
                    warn!(device = %device, attempt, error = %e, "Photo polling aborted");
                    return Err(self.fail(device, PhotoError::Registry(e)));
                }
            }
        }

        let attempts = self.schedule.attempts();
        let waited = self.schedule.total();
        warn!(device = %device, attempts, waited = ?waited, "No photo within the polling budget");
        Err(self.fail(device, PhotoError::Timeout { attempts, waited }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl RecordingClock {
        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    impl Clock for RecordingClock {
        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            if let Some((n, token)) = &self.cancel_after {
                if sleeps.len() >= *n {
                    token.cancel();
                }
            }
            std::future::ready(())
        }
    }

    fn poller(clock: RecordingClock) -> PhotoPoller<RecordingClock> {
        PhotoPoller::with_clock(clock, PollSchedule::default())
    }

    fn device() -> DeviceId {
        DeviceId::from("dev-1")
    }

    #[test]
    fn test_default_schedule() {
        let schedule = PollSchedule::default();
        assert_eq!(schedule.attempts(), 12);
        assert_eq!(schedule.total(), Duration::from_secs(70));
    }

    #[tokio::test]
    async fn test_rejected_request_never_polls() {
        let api = FakeApi::new(1).with_capture_status(200);
        let p = poller(RecordingClock::default());
        let err = p
            .capture(&api, &device(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PhotoError::CaptureRequest(RegistryError::ContractViolation { actual: 200, .. })
        ));
        assert_eq!(api.fetch_calls(), 0);
        assert!(p.clock.sleeps().is_empty());
        assert!(matches!(p.state(), PhotoState::Exhausted { .. }));
    }

    #[tokio::test]
    async fn test_url_on_last_attempt() {
        let mut photos: Vec<_> = (0..11).map(|_| Ok(None)).collect();
        photos.push(Ok(Some("https://photos.test/1.jpg".to_string())));
        let api = FakeApi::new(1).with_photos(photos);
        let p = poller(RecordingClock::default());

        let url = p
            .capture(&api, &device(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(url, "https://photos.test/1.jpg");
        assert_eq!(api.fetch_calls(), 12);
        assert_eq!(p.clock.sleeps(), PollSchedule::default().delays());
        assert_eq!(
            p.state(),
            PhotoState::Ready {
                url: "https://photos.test/1.jpg".into()
            }
        );
    }

    #[tokio::test]
    async fn test_exhausted_schedule_is_timeout() {
        let api = FakeApi::new(1);
        let p = PhotoPoller::with_clock(RecordingClock::default(), PollSchedule::from_secs(&[1, 2]));
        let err = p
            .capture(&api, &device(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PhotoError::Timeout { attempts, waited } => {
                assert_eq!(attempts, 2);
                assert_eq!(waited, Duration::from_secs(3));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(api.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_registry_error_aborts_polling() {
        let api = FakeApi::new(1).with_photos(vec![
            Ok(None),
            Err(RegistryError::Status {
                status: 500,
                body: "boom".into(),
            }),
            Ok(Some("never".into())),
        ]);
        let p = poller(RecordingClock::default());
        let err = p
            .capture(&api, &device(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PhotoError::Registry(RegistryError::Status { status: 500, .. })));
        assert_eq!(api.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_photo_response_keeps_polling() {
        let unreadable = serde_json::from_str::<serde_json::Value>("").unwrap_err();
        let api = FakeApi::new(1).with_photos(vec![
            Err(RegistryError::Decode(unreadable)),
            Ok(Some("https://photos.test/2.jpg".into())),
        ]);
        let p = poller(RecordingClock::default());
        let url = p
            .capture(&api, &device(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(url, "https://photos.test/2.jpg");
        assert_eq!(api.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_fetching() {
        let token = CancellationToken::new();
        let clock = RecordingClock {
            cancel_after: Some((3, token.clone())),
            ..Default::default()
        };
        let api = FakeApi::new(1);
        let p = poller(clock);
        let mut states = p.subscribe();

        let err = p.capture(&api, &device(), &token).await.unwrap_err();

        assert!(matches!(err, PhotoError::Cancelled));
        assert_eq!(api.fetch_calls(), 2);
        assert_eq!(*states.borrow_and_update(), PhotoState::Cancelled);
    }

    #[tokio::test]
    async fn test_already_cancelled_sends_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let api = FakeApi::new(1);
        let p = poller(RecordingClock::default());
        assert!(matches!(
            p.capture(&api, &device(), &token).await,
            Err(PhotoError::Cancelled)
        ));
        assert!(api.calls().is_empty());
    }
}
