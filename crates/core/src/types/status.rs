//! Status enums for orders, notifications and image owners.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// `new → processing → completed` is the main line. The delivery-date
/// negotiation moves between `pending_admin_review` and
/// `pending_customer_review` until a date is accepted or forced by an admin.
/// Soft deletion is tracked separately on the order and is not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    New,
    Processing,
    Completed,
    Cancelled,
    /// The customer proposed a date, waiting for an admin.
    PendingAdminReview,
    /// An admin suggested a date, waiting for the customer.
    PendingCustomerReview,
    DateAccepted,
    /// An admin fixed the date; the order is locked for the customer.
    DateForced,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 8] = [
        Self::New,
        Self::Processing,
        Self::Completed,
        Self::Cancelled,
        Self::PendingAdminReview,
        Self::PendingCustomerReview,
        Self::DateAccepted,
        Self::DateForced,
    ];

    /// Terminal statuses accept no further negotiation or cancellation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::PendingAdminReview => "pending_admin_review",
            Self::PendingCustomerReview => "pending_customer_review",
            Self::DateAccepted => "date_accepted",
            Self::DateForced => "date_forced",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Kind of an in-app notification.
///
/// Part of the deduplication key `(user, kind, related order)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "notification_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrder,
    StatusChanged,
    DateSuggested,
    DateProposed,
    DateAccepted,
    DateForced,
    OrderCancelled,
    OrderDeleted,
    OrderRestored,
    OrderUpdated,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewOrder => "new_order",
            Self::StatusChanged => "status_changed",
            Self::DateSuggested => "date_suggested",
            Self::DateProposed => "date_proposed",
            Self::DateAccepted => "date_accepted",
            Self::DateForced => "date_forced",
            Self::OrderCancelled => "order_cancelled",
            Self::OrderDeleted => "order_deleted",
            Self::OrderRestored => "order_restored",
            Self::OrderUpdated => "order_updated",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator for the two kinds of image owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "image_owner_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ImageOwnerKind {
    OrderItem,
    CartItem,
}

impl std::fmt::Display for ImageOwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderItem => write!(f, "order_item"),
            Self::CartItem => write!(f, "cart_item"),
        }
    }
}
