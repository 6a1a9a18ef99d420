use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use core_types::{Notification, NotificationId, NotificationKind};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

type Timers = Arc<Mutex<HashMap<NotificationId, AbortHandle>>>;

/// Transient user-facing messages. Each one removes itself after the TTL
/// unless dismissed first; dropping the center cancels every pending expiry.
///
/// `add` spawns onto the ambient tokio runtime.
pub struct NotificationCenter {
    ttl: Duration,
    state: Arc<watch::Sender<Vec<Notification>>>,
    timers: Timers,
}

impl NotificationCenter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Arc::new(watch::Sender::new(Vec::new())),
            timers: Timers::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn add(&self, message: impl Into<String>, kind: NotificationKind) -> NotificationId {
        let notification = Notification {
            id: NotificationId::new_v4(),
            message: message.into(),
            kind,
        };
        let id = notification.id;
        debug!(notification_id = %id, ?kind, message = %notification.message, "notification added");
        self.state.send_modify(|list| list.push(notification));

        let deadline = Instant::now() + self.ttl;
        let state = Arc::downgrade(&self.state);
        let timers = Arc::downgrade(&self.timers);
        let mut pending = self.timers.lock();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(timers) = timers.upgrade() {
                timers.lock().remove(&id);
            }
            if let Some(state) = state.upgrade()
                && remove_from(&state, id)
            {
                debug!(notification_id = %id, "notification expired");
            }
        });
        pending.insert(id, handle.abort_handle());
        id
    }

    pub fn add_info(&self, message: impl Into<String>) -> NotificationId {
        self.add(message, NotificationKind::default())
    }

    /// Dismisses `id`. Unknown ids are ignored. Returns whether anything was
    /// removed.
    pub fn remove(&self, id: NotificationId) -> bool {
        if let Some(timer) = self.timers.lock().remove(&id) {
            timer.abort();
        }
        remove_from(&self.state, id)
    }

    /// Dismisses the most recently added notification still on screen.
    pub fn dismiss_latest(&self) -> Option<NotificationId> {
        let id = self.state.borrow().last().map(|notification| notification.id)?;
        self.remove(id).then_some(id)
    }

    pub fn clear(&self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.abort();
        }
        self.state.send_if_modified(|list| {
            let changed = !list.is_empty();
            list.clear();
            changed
        });
    }

    pub fn contains(&self, id: NotificationId) -> bool {
        self.state.borrow().iter().any(|notification| notification.id == id)
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.state.subscribe()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.lock().len()
    }
}

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.abort();
        }
    }
}

fn remove_from(state: &watch::Sender<Vec<Notification>>, id: NotificationId) -> bool {
    state.send_if_modified(|list| {
        let before = list.len();
        list.retain(|notification| notification.id != id);
        list.len() != before
    })
}
