//! Mock implementations of the engine's collaborator traits.

use boxoffice_core::BoxFuture;
use boxoffice_core::environment::Clock;
use boxoffice_core::fees::FeeCalculator;
use boxoffice_core::notifier::{Notification, NotificationKind, Notifier, NotifyError};
use boxoffice_core::types::{BasisPoints, Order, OrderId, Ticket, UserId};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed clock for deterministic tests
///
/// Returns the same time until a test moves it with [`FixedClock::advance`]
/// or [`FixedClock::set`]. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut time = lock(&self.time);
        *time += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *lock(&self.time) = to;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.time)
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_735_689_600))
}

#[derive(Debug, Default)]
struct NotifierLog {
    notifications: Vec<Notification>,
    deliveries: Vec<(OrderId, usize)>,
}

/// Notifier that records everything it is asked to send.
///
/// Optionally fails every call, to prove side-effect failures never leak into
/// engine results.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    log: Arc<Mutex<NotifierLog>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every call fails (after recording it).
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Everything notified so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.log).notifications.clone()
    }

    /// Notifications of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        lock(&self.log)
            .notifications
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// `(order, ticket count)` for every delivery attempt.
    #[must_use]
    pub fn deliveries(&self) -> Vec<(OrderId, usize)> {
        lock(&self.log).deliveries.clone()
    }

    fn outcome(&self) -> Result<(), NotifyError> {
        if self.fail {
            Err(NotifyError::new("recording notifier configured to fail"))
        } else {
            Ok(())
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
        lock(&self.log).notifications.push(notification);
        let outcome = self.outcome();
        Box::pin(async move { outcome })
    }

    fn deliver_tickets(&self, order: &Order, tickets: &[Ticket]) -> BoxFuture<'_, Result<(), NotifyError>> {
        lock(&self.log).deliveries.push((order.id, tickets.len()));
        let outcome = self.outcome();
        Box::pin(async move { outcome })
    }
}

/// Fee calculator returning the same rate for everyone.
#[derive(Debug, Clone, Copy)]
pub struct FlatFeeCalculator(pub BasisPoints);

impl FeeCalculator for FlatFeeCalculator {
    fn fee_percentage(&self, _organizer_id: Option<UserId>) -> BoxFuture<'_, BasisPoints> {
        let rate = self.0;
        Box::pin(async move { rate })
    }
}
