//! Push and pull polling around a shared `IquaClient`.
//!
//! Push mode runs a background task that polls, stores the latest snapshot,
//! and sleeps for the configured interval. Failures are logged and the loop
//! keeps going. Pull mode performs one fetch per `refresh()` call and reports
//! a typed failure so the caller can pick its own retry cadence.
//!
//! Both modes lock the same client, so polls never overlap.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, IquaClient};
use crate::models::DeviceSnapshot;

use super::PollInterval;

/// Lifecycle of the background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerStatus {
    Idle,
    Running,
    Stopping,
}

/// Pull-mode failure, split by the recovery it needs upstream.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// Communication or payload fault; keep showing the last good value
    #[error("Refresh failed: {0}")]
    UpdateFailed(#[source] ApiError),

    /// Credentials were rejected; an operator has to fix them
    #[error("Credentials require attention: {0}")]
    ReauthRequired(#[source] ApiError),
}

impl RefreshError {
    pub fn api_error(&self) -> &ApiError {
        match self {
            RefreshError::UpdateFailed(e) | RefreshError::ReauthRequired(e) => e,
        }
    }
}

impl From<ApiError> for RefreshError {
    fn from(err: ApiError) -> Self {
        if err.is_auth() {
            RefreshError::ReauthRequired(err)
        } else {
            RefreshError::UpdateFailed(err)
        }
    }
}

struct Running {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polling driver for one device.
///
/// Dropping a running `Poller` drops its cancellation sender, which ends the
/// background loop at its next suspension point. Call `stop()` to also wait
/// for it.
pub struct Poller {
    client: Arc<Mutex<IquaClient>>,
    interval: PollInterval,
    latest: Arc<watch::Sender<Option<DeviceSnapshot>>>,
    status: watch::Sender<PollerStatus>,
    task: Mutex<Option<Running>>,
}

impl Poller {
    pub fn new(client: IquaClient, interval: PollInterval) -> Self {
        let (latest, _) = watch::channel(None);
        let (status, _) = watch::channel(PollerStatus::Idle);
        Self {
            client: Arc::new(Mutex::new(client)),
            interval,
            latest: Arc::new(latest),
            status,
            task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> PollerStatus {
        *self.status.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.status() == PollerStatus::Running
    }

    /// Most recent successful snapshot from either mode
    pub fn latest(&self) -> Option<DeviceSnapshot> {
        self.latest.borrow().clone()
    }

    /// Receiver notified whenever a new snapshot is stored
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceSnapshot>> {
        self.latest.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PollerStatus> {
        self.status.subscribe()
    }

    /// Start the background loop. No-op if it is already running.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                debug!("Poller already running");
                return;
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.client),
            self.interval,
            Arc::clone(&self.latest),
            cancel_rx,
        ));

        *task = Some(Running {
            cancel: cancel_tx,
            handle,
        });
        self.status.send_replace(PollerStatus::Running);
        info!(interval = ?self.interval, "Poller started");
    }

    /// Cancel the background loop and wait for it to exit.
    /// Interrupts both the sleep and an in-flight request.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        let Some(running) = task.take() else {
            return;
        };

        info!("Stopping poller");
        self.status.send_replace(PollerStatus::Stopping);
        running.cancel.send_replace(true);

        if let Err(e) = running.handle.await {
            if e.is_panic() {
                error!(error = %e, "Polling task panicked");
            }
        }

        self.status.send_replace(PollerStatus::Idle);
        info!("Poller stopped");
    }

    /// Pull mode: one fetch, stored on success.
    pub async fn refresh(&self) -> Result<DeviceSnapshot, RefreshError> {
        let result = self.client.lock().await.get_device_data().await;
        match result {
            Ok(snapshot) => {
                self.latest.send_replace(Some(snapshot.clone()));
                Ok(snapshot)
            }
            Err(e) => {
                let err = RefreshError::from(e);
                warn!(error = %err, "Refresh failed");
                Err(err)
            }
        }
    }
}

async fn poll_once(client: &Mutex<IquaClient>) -> Result<DeviceSnapshot, ApiError> {
    client.lock().await.get_device_data().await
}

async fn run_loop(
    client: Arc<Mutex<IquaClient>>,
    interval: PollInterval,
    latest: Arc<watch::Sender<Option<DeviceSnapshot>>>,
    mut cancel: watch::Receiver<bool>,
) {
    debug!("Polling loop started");

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.changed() => break,
            result = poll_once(&client) => result,
        };

        match result {
            Ok(snapshot) => {
                debug!(fetched_at = %snapshot.fetched_at(), "Snapshot updated");
                latest.send_replace(Some(snapshot));
            }
            Err(e) if e.is_auth() => {
                error!(error = %e, "Poll failed, credentials need attention");
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Poll failed, retrying next interval");
            }
            Err(e) => {
                error!(error = %e, "Poll failed");
            }
        }

        let delay = interval.next_delay();
        debug!(delay_secs = delay.as_secs(), "Next poll scheduled");

        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Polling loop exited");
}
