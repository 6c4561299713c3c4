//! Notifier
//!
//! Shows one transient message at a time. A new message replaces the visible
//! one; each message auto-dismisses after its duration, with a fade-out phase
//! before removal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::runtime::spawn_detached;

pub const MIN_DURATION_MS: u64 = 3000;
pub const MAX_DURATION_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPhase {
    Visible,
    FadingOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub kind: NotificationKind,
    pub duration_ms: u64,
    pub phase: NotificationPhase,
}

/// Where notifications are rendered.
pub trait NotificationSink: Send + Sync {
    fn present(&self, notification: &Notification);

    fn fade_out(&self, _id: u64) {}

    fn dismiss(&self, id: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPolicy {
    pub default_duration_ms: u64,
    pub error_duration_ms: u64,
    pub fade_ms: u64,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            default_duration_ms: 4000,
            error_duration_ms: 5000,
            fade_ms: 300,
        }
    }
}

impl NotificationPolicy {
    fn duration_for(&self, kind: NotificationKind, requested: Option<Duration>) -> u64 {
        let ms = requested
            .map(|d| d.as_millis() as u64)
            .unwrap_or(match kind {
                NotificationKind::Error => self.error_duration_ms,
                _ => self.default_duration_ms,
            });
        ms.clamp(MIN_DURATION_MS, MAX_DURATION_MS)
    }
}

pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    policy: NotificationPolicy,
    current: Mutex<Option<Notification>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, policy: NotificationPolicy) -> Self {
        Self {
            sink,
            policy,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Show `message`, replacing whatever is visible. `duration` defaults per
    /// kind and is clamped to 3–5 s. Returns the notification id.
    pub fn show(
        self: &Arc<Self>,
        message: impl Into<String>,
        kind: NotificationKind,
        duration: Option<Duration>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notification = Notification {
            id,
            message: message.into(),
            kind,
            duration_ms: self.policy.duration_for(kind, duration),
            phase: NotificationPhase::Visible,
        };
        let replaced = self.current.lock().replace(notification.clone());
        if let Some(old) = replaced {
            debug!(id = old.id, "replacing visible notification");
            self.sink.dismiss(old.id);
        }
        self.sink.present(&notification);

        let notifier = Arc::clone(self);
        let visible_for = Duration::from_millis(notification.duration_ms);
        let fade = Duration::from_millis(self.policy.fade_ms);
        let scheduled = spawn_detached(async move {
            sleep(visible_for).await;
            if !notifier.begin_fade(id) {
                return;
            }
            sleep(fade).await;
            notifier.finish(id);
        });
        if scheduled.is_none() {
            warn!(id, "no async runtime; notification will not auto-dismiss");
        }
        id
    }

    pub fn current(&self) -> Option<Notification> {
        self.current.lock().clone()
    }

    /// Remove the visible notification immediately.
    pub fn dismiss_current(&self) {
        if let Some(old) = self.current.lock().take() {
            self.sink.dismiss(old.id);
        }
    }

    fn begin_fade(&self, id: u64) -> bool {
        let mut current = self.current.lock();
        match current.as_mut() {
            Some(n) if n.id == id => {
                n.phase = NotificationPhase::FadingOut;
            }
            _ => return false,
        }
        drop(current);
        self.sink.fade_out(id);
        true
    }

    fn finish(&self, id: u64) {
        let mut current = self.current.lock();
        if current.as_ref().map(|n| n.id) != Some(id) {
            return;
        }
        current.take();
        drop(current);
        self.sink.dismiss(id);
    }
}

/// Renders notifications as log events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn present(&self, notification: &Notification) {
        match notification.kind {
            NotificationKind::Error => {
                error!(id = notification.id, message = %notification.message, "notification")
            }
            _ => info!(
                id = notification.id,
                kind = notification.kind.as_str(),
                message = %notification.message,
                "notification"
            ),
        }
    }

    fn dismiss(&self, id: u64) {
        debug!(id, "notification dismissed");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Present(Notification),
    FadeOut(u64),
    Dismiss(u64),
}

/// Records every sink call; for headless hosts and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    calls: Mutex<Vec<SinkCall>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn presented(&self) -> Vec<Notification> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Present(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }
}

impl NotificationSink for MemorySink {
    fn present(&self, notification: &Notification) {
        self.calls.lock().push(SinkCall::Present(notification.clone()));
    }

    fn fade_out(&self, id: u64) {
        self.calls.lock().push(SinkCall::FadeOut(id));
    }

    fn dismiss(&self, id: u64) {
        self.calls.lock().push(SinkCall::Dismiss(id));
    }
}
