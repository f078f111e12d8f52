//! Dispatch policy: decides whether a detection notifies the user and/or runs
//! its remediation callback.
//!
//! Two cooldowns are tracked independently. The application emits bursts of
//! identical error lines within milliseconds of a real failure, and each burst
//! must produce at most one remediation and at most one popup.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::entry::LogEntry;
use crate::error::CallbackError;
use crate::time::{Clock, SystemClock};
use crate::trigger::{InvocationContext, TriggerDefinition};

/// Default minimum spacing between user notifications.
pub const DEFAULT_NOTIFY_COOLDOWN: Duration = Duration::from_secs(30);
/// Default minimum spacing between callback invocations.
pub const DEFAULT_CALLBACK_COOLDOWN: Duration = Duration::from_secs(15);

/// Receives notification requests.
///
/// A panic inside `notify` is caught and counts as "not shown".
pub trait Notifier: Send + Sync {
    /// Requests a user-visible notification. Returns whether one was shown.
    fn notify(&self, reason: &str) -> bool;
}

/// Notifier that writes the request to the log and always reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, reason: &str) -> bool {
        info!(reason, "notification requested");
        true
    }
}

/// Cooldown durations for the dispatch policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Minimum time between notifications.
    pub notify_cooldown: Duration,
    /// Minimum time between callback invocations, across all triggers.
    pub callback_cooldown: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            notify_cooldown: DEFAULT_NOTIFY_COOLDOWN,
            callback_cooldown: DEFAULT_CALLBACK_COOLDOWN,
        }
    }
}

/// A last-fired timestamp guarded by a lock.
///
/// `None` means the cooldown has never fired and is ready.
#[derive(Debug)]
pub struct Cooldown {
    window: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl Cooldown {
    /// Creates a ready cooldown.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: Mutex::new(None),
        }
    }

    /// Configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// True if the cooldown would allow firing at `now`.
    #[must_use]
    pub fn is_ready(&self, now: Instant) -> bool {
        ready(*self.lock(), self.window, now)
    }

    /// Claims the cooldown at `now` if it is ready.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last = self.lock();
        if !ready(*last, self.window, now) {
            return false;
        }
        *last = Some(now);
        true
    }

    /// Runs `fire` if the cooldown is ready and stamps `now` only when `fire`
    /// returns true. Returns false without calling `fire` when not ready.
    ///
    /// The lock is released while `fire` runs, so `fire` may query this
    /// cooldown. Two callers racing here can both fire.
    pub fn acquire_if(&self, now: Instant, fire: impl FnOnce() -> bool) -> bool {
        if !self.is_ready(now) {
            return false;
        }
        let fired = fire();
        if fired {
            *self.lock() = Some(now);
        }
        fired
    }

    /// Forgets the last firing.
    pub fn reset(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_fired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ready(last: Option<Instant>, window: Duration, now: Instant) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= window,
    }
}

/// What happened to the callback for one detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CallbackStatus {
    /// The callback ran and returned `Ok`.
    Invoked,
    /// The callback ran and failed or panicked.
    Failed(String),
    /// The callback cooldown was active; the occurrence was dropped.
    Suppressed,
    /// No callback is bound to the trigger.
    Unbound,
}

/// Outcome of dispatching one detection.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    /// Unique id for this detection.
    pub event_id: Uuid,
    /// Trigger name.
    pub trigger: String,
    /// The matching entry.
    pub entry: LogEntry,
    /// Whether a notification was shown.
    pub notified: bool,
    /// Callback outcome.
    pub callback: CallbackStatus,
    /// Detection time.
    pub detected_at: DateTime<Utc>,
}

/// Applies the notification and callback cooldowns to detections.
pub struct DispatchPolicy {
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    notify_cooldown: Cooldown,
    callback_cooldown: Cooldown,
}

impl fmt::Debug for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchPolicy")
            .field("notify_cooldown", &self.notify_cooldown)
            .field("callback_cooldown", &self.callback_cooldown)
            .finish_non_exhaustive()
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::new(
            DispatchConfig::default(),
            Arc::new(TracingNotifier),
            Arc::new(SystemClock),
        )
    }
}

impl DispatchPolicy {
    /// Creates a policy with both cooldowns ready.
    #[must_use]
    pub fn new(config: DispatchConfig, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            notifier,
            clock,
            notify_cooldown: Cooldown::new(config.notify_cooldown),
            callback_cooldown: Cooldown::new(config.callback_cooldown),
        }
    }

    /// The notification cooldown.
    #[must_use]
    pub fn notify_cooldown(&self) -> &Cooldown {
        &self.notify_cooldown
    }

    /// The callback cooldown.
    #[must_use]
    pub fn callback_cooldown(&self) -> &Cooldown {
        &self.callback_cooldown
    }

    /// Dispatches one detection of `trigger`.
    ///
    /// The notifier and the callback run synchronously on the calling
    /// thread. Errors and panics from either are logged, never propagated.
    pub fn dispatch(&self, trigger: &TriggerDefinition, ctx: &InvocationContext) -> DispatchRecord {
        let now = self.clock.instant();
        let name = trigger.name();

        let repairing = trigger.callback().is_some() && self.callback_cooldown.is_ready(now);
        let reason = if repairing {
            format!("{name} detected, attempting automatic repair")
        } else {
            format!("{name} detected")
        };
        let notified = self.notify_cooldown.acquire_if(now, || self.notify(name, &reason));
        if !notified {
            debug!(trigger = %name, "notification skipped");
        }

        let callback = match trigger.callback() {
            None => {
                debug!(trigger = %name, "no callback bound");
                CallbackStatus::Unbound
            }
            Some(_) if !self.callback_cooldown.try_acquire(now) => {
                debug!(trigger = %name, "callback suppressed by cooldown");
                CallbackStatus::Suppressed
            }
            Some(callback) => {
                info!(trigger = %name, timestamp = %ctx.entry.timestamp(), "invoking callback");
                match run_callback(|| callback.invoke(ctx)) {
                    Ok(()) => CallbackStatus::Invoked,
                    Err(e) => {
                        error!(trigger = %name, error = %e, "callback failed");
                        CallbackStatus::Failed(e.to_string())
                    }
                }
            }
        };

        DispatchRecord {
            event_id: Uuid::new_v4(),
            trigger: name.to_string(),
            entry: ctx.entry.clone(),
            notified,
            callback,
            detected_at: ctx.detected_at,
        }
    }
}

impl DispatchPolicy {
    fn notify(&self, trigger: &str, reason: &str) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| self.notifier.notify(reason))) {
            Ok(shown) => shown,
            Err(payload) => {
                error!(trigger, panic = %panic_message(payload.as_ref()), "notifier panicked");
                false
            }
        }
    }
}

fn run_callback(f: impl FnOnce() -> Result<(), CallbackError>) -> Result<(), CallbackError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(CallbackError::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
