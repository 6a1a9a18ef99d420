use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use config::UploadConfig;
use core_types::{
    IngestResponse, NotificationKind, RagTransport, UploadError, UploadFile, ValidationError,
};
use i18n::I18n;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{Instant, interval_at, sleep_until};
use tracing::{debug, info, warn};

use crate::notifications::NotificationCenter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadState {
    pub is_uploading: bool,
    /// 0..=100. Synthetic while the request is outstanding.
    pub progress: u8,
}

pub struct UploadSession {
    transport: Arc<dyn RagTransport>,
    notifications: Arc<NotificationCenter>,
    i18n: I18n,
    config: UploadConfig,
    state: Arc<watch::Sender<UploadState>>,
    in_flight: AtomicBool,
    /// Bumped whenever an upload starts; a completion reset only applies to
    /// the upload that scheduled it.
    epoch: Arc<AtomicU64>,
    reset_timer: Mutex<Option<AbortHandle>>,
}

impl UploadSession {
    pub fn new(
        transport: Arc<dyn RagTransport>,
        notifications: Arc<NotificationCenter>,
        i18n: I18n,
        config: UploadConfig,
    ) -> Self {
        Self {
            transport,
            notifications,
            i18n,
            config,
            state: Arc::new(watch::Sender::new(UploadState::default())),
            in_flight: AtomicBool::new(false),
            epoch: Arc::new(AtomicU64::new(0)),
            reset_timer: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> UploadState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    /// Type first, then size. Neither check touches the network.
    pub fn validate(&self, file: &UploadFile) -> Result<(), ValidationError> {
        if !self.config.allows(&file.mime_type) {
            return Err(ValidationError::UnsupportedType {
                mime_type: file.mime_type.clone(),
            });
        }
        if file.size() > self.config.max_bytes {
            return Err(ValidationError::TooLarge {
                size: file.size(),
                limit: self.config.max_bytes,
            });
        }
        Ok(())
    }

    pub async fn upload_file(&self, file: UploadFile) -> Result<IngestResponse, UploadError> {
        self.validate(&file)?;
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(UploadError::Busy);
        }
        let _flight = FlightGuard {
            in_flight: &self.in_flight,
            state: &self.state,
        };

        if let Some(reset) = self.reset_timer.lock().take() {
            reset.abort();
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(UploadState {
            is_uploading: true,
            progress: 0,
        });

        let file_name = file.file_name.clone();
        let ticker = self.spawn_ticker();
        let result = self.transport.upload_file(file).await;
        drop(ticker);

        match result {
            Ok(response) => {
                info!(
                    file_name = %file_name,
                    document_id = %response.document_id,
                    chunks = response.chunks_processed,
                    "document ingested"
                );
                self.state.send_modify(|state| state.progress = 100);
                self.schedule_reset();
                Ok(response)
            }
            Err(err) => {
                warn!(file_name = %file_name, error = %err, "document upload failed");
                self.state.send_replace(UploadState::default());
                Err(err.into())
            }
        }
    }

    /// Runs `upload_file` and reports the outcome as a notification.
    pub async fn upload_and_notify(&self, file: UploadFile) -> Result<IngestResponse, UploadError> {
        let result = self.upload_file(file).await;
        match &result {
            Ok(response) => {
                self.notifications
                    .add(response.message.clone(), NotificationKind::Success);
            }
            Err(err) => {
                self.notifications
                    .add(self.describe(err), NotificationKind::Error);
            }
        }
        result
    }

    fn describe(&self, err: &UploadError) -> String {
        let key = match err {
            UploadError::Validation(ValidationError::UnsupportedType { .. }) => {
                "upload.invalid_type"
            }
            UploadError::Validation(ValidationError::TooLarge { .. }) => "upload.too_large",
            UploadError::Busy => "upload.busy",
            UploadError::Transport(_) => "upload.failed",
        };
        self.i18n.t(key).to_string()
    }

    fn spawn_ticker(&self) -> AbortOnDrop {
        let period = self
            .config
            .progress_interval()
            .max(Duration::from_millis(1));
        let step = self.config.progress_step();
        let ceiling = self.config.progress_ceiling.min(100);
        let state = Arc::downgrade(&self.state);
        let start = Instant::now() + period;

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(start, period);
            loop {
                interval.tick().await;
                let Some(state) = state.upgrade() else {
                    break;
                };
                let mut reached = false;
                state.send_if_modified(|state| {
                    let next = state.progress.saturating_add(step).min(ceiling);
                    reached = next >= ceiling || next <= state.progress;
                    if next > state.progress {
                        state.progress = next;
                        true
                    } else {
                        false
                    }
                });
                if reached {
                    break;
                }
            }
        });
        AbortOnDrop(handle.abort_handle())
    }

    fn schedule_reset(&self) {
        let deadline = Instant::now() + self.config.completion_hold();
        let state = Arc::downgrade(&self.state);
        let epoch = self.epoch.clone();
        let scheduled = epoch.load(Ordering::SeqCst);
        let mut slot = self.reset_timer.lock();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(state) = state.upgrade()
                && reset_if_current(&state, &epoch, scheduled)
            {
                debug!("upload progress reset");
            }
        });
        if let Some(previous) = slot.replace(handle.abort_handle()) {
            previous.abort();
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if let Some(reset) = self.reset_timer.lock().take() {
            reset.abort();
        }
    }
}

/// Clears the progress of the upload that started at `scheduled`. A newer
/// upload's state is left alone.
fn reset_if_current(
    state: &watch::Sender<UploadState>,
    epoch: &AtomicU64,
    scheduled: u64,
) -> bool {
    state.send_if_modified(|state| {
        let current = epoch.load(Ordering::SeqCst) == scheduled;
        if current && state.is_uploading {
            *state = UploadState::default();
            true
        } else {
            false
        }
    })
}

/// Releases the single-flight slot. An upload abandoned before completing
/// leaves no stale progress behind.
struct FlightGuard<'a> {
    in_flight: &'a AtomicBool,
    state: &'a watch::Sender<UploadState>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            let stale = state.is_uploading && state.progress < 100;
            if stale {
                *state = UploadState::default();
            }
            stale
        });
        self.in_flight.store(false, Ordering::Release);
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
