//! Notification dispatcher shared by every mutation binding.

use chrono::{DateTime, Utc};
use meridian_core::{NotificationEvent, NotificationId, NotificationSettings};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const CHANNEL_CAPACITY: usize = 64;

struct Shown {
    event: NotificationEvent,
    /// Monotonic time the event became visible.
    since: Instant,
}

impl Shown {
    fn has_elapsed(&self, now: Instant, default_duration: Duration) -> bool {
        let duration = self.event.duration.unwrap_or(default_duration);
        match self.since.checked_add(duration) {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

type Visible = Arc<Mutex<VecDeque<Shown>>>;

fn lock_visible(visible: &Mutex<VecDeque<Shown>>) -> MutexGuard<'_, VecDeque<Shown>> {
    visible.lock().unwrap_or_else(PoisonError::into_inner)
}

fn drop_elapsed(visible: &Mutex<VecDeque<Shown>>, default_duration: Duration) -> usize {
    let now = Instant::now();
    let mut visible = lock_visible(visible);
    let before = visible.len();
    visible.retain(|shown| !shown.has_elapsed(now, default_duration));
    before - visible.len()
}

/// Bounded queue of visible notifications plus a broadcast feed for UI sinks.
///
/// Cloning is cheap and every clone pushes into the same queue.
#[derive(Clone)]
pub struct NotificationCenter {
    visible: Visible,
    sender: broadcast::Sender<NotificationEvent>,
    settings: NotificationSettings,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(NotificationSettings::default())
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("visible", &self.lock().len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl NotificationCenter {
    pub fn new(settings: NotificationSettings) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            visible: Arc::new(Mutex::new(VecDeque::new())),
            sender,
            settings,
        }
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Shown>> {
        lock_visible(&self.visible)
    }

    /// Show `event`, evicting the oldest visible ones beyond `max_visible`.
    pub fn push(&self, event: NotificationEvent) -> NotificationId {
        let id = event.id;
        {
            let mut visible = self.lock();
            visible.push_back(Shown {
                event: event.clone(),
                since: Instant::now(),
            });
            while visible.len() > self.settings.max_visible {
                visible.pop_front();
            }
        }
        tracing::debug!(severity = ?event.severity, title = %event.title, "Notification pushed");
        // No subscribers is fine.
        let _ = self.sender.send(event);
        id
    }

    pub fn success(&self, title: impl Into<String>, description: Option<String>) -> NotificationId {
        self.push(with_description(NotificationEvent::success(title), description))
    }

    pub fn error(&self, title: impl Into<String>, description: Option<String>) -> NotificationId {
        self.push(with_description(NotificationEvent::error(title), description))
    }

    pub fn info(&self, title: impl Into<String>, description: Option<String>) -> NotificationId {
        self.push(with_description(NotificationEvent::info(title), description))
    }

    pub fn warning(&self, title: impl Into<String>, description: Option<String>) -> NotificationId {
        self.push(with_description(NotificationEvent::warning(title), description))
    }

    /// Close one notification. Returns false when it is no longer visible.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let mut visible = self.lock();
        let before = visible.len();
        visible.retain(|shown| shown.event.id != id);
        visible.len() != before
    }

    /// Drop notifications whose duration, counted from `created_at`, has
    /// elapsed at `now`.
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let default_duration = self.settings.default_duration();
        let mut visible = self.lock();
        let before = visible.len();
        visible.retain(|shown| !shown.event.is_expired(now, default_duration));
        before - visible.len()
    }

    /// Drop notifications that have been visible for their full duration.
    pub fn expire_elapsed(&self) -> usize {
        drop_elapsed(&self.visible, self.settings.default_duration())
    }

    /// Run [`NotificationCenter::expire_elapsed`] every `interval` until the
    /// center is dropped.
    pub fn spawn_expiry(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Mutex<VecDeque<Shown>>> = Arc::downgrade(&self.visible);
        let default_duration = self.settings.default_duration();
        let period = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(visible) = weak.upgrade() else {
                    break;
                };
                let dismissed = drop_elapsed(&visible, default_duration);
                if dismissed > 0 {
                    tracing::debug!(dismissed, "Notifications auto-dismissed");
                }
            }
        })
    }

    /// Visible notifications, oldest first.
    pub fn visible(&self) -> Vec<NotificationEvent> {
        self.lock().iter().map(|shown| shown.event.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }
}

fn with_description(event: NotificationEvent, description: Option<String>) -> NotificationEvent {
    match description {
        Some(description) => event.with_description(description),
        None => event,
    }
}
