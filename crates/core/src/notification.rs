//! In-app notifications and their deduplication window.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::{NotificationId, NotificationKind, OrderId, UserId};

/// Default deduplication window.
pub const DEFAULT_DEDUP_SECONDS: i64 = 300;

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub message: String,
    pub related_order_id: Option<OrderId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Who a transition's notification goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// The order's owner.
    Customer(UserId),
    /// Every admin in the user directory.
    Admins,
}

/// A notification a transition wants sent once it has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationIntent {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub message: String,
    pub related_order_id: OrderId,
}

/// Window within which a repeated `(user, kind, order)` notification is
/// considered a duplicate of the earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupWindow(Duration);

impl DedupWindow {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self(window)
    }

    #[must_use]
    pub fn from_seconds(seconds: i64) -> Self {
        Self(Duration::seconds(seconds.max(0)))
    }

    #[must_use]
    pub const fn duration(self) -> Duration {
        self.0
    }

    /// Oldest creation time that still counts as a duplicate at `now`.
    #[must_use]
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.0
    }

    /// Whether a notification created at `created_at` suppresses a new one.
    #[must_use]
    pub fn is_duplicate(self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at > self.cutoff(now)
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::from_seconds(DEFAULT_DEDUP_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_five_minutes() {
        assert_eq!(DedupWindow::default().duration(), Duration::minutes(5));
    }

    #[test]
    fn test_is_duplicate_inside_window_only() {
        let window = DedupWindow::default();
        let now = Utc::now();
        assert!(window.is_duplicate(now, now));
        assert!(window.is_duplicate(now - Duration::seconds(299), now));
        assert!(!window.is_duplicate(now - Duration::seconds(300), now));
        assert!(!window.is_duplicate(now - Duration::hours(1), now));
    }

    #[test]
    fn test_zero_window_never_deduplicates() {
        let window = DedupWindow::from_seconds(-5);
        let now = Utc::now();
        assert!(!window.is_duplicate(now, now));
    }
}
