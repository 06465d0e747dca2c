//! Notification delivery.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};

use grocer_core::{
    DedupWindow, Notification, NotificationIntent, NotificationKind, OrderId, Recipient, UserId,
};

use super::{NotificationSink, UserDirectory};
use crate::db::notifications::{self, Stored};
use crate::db::RepositoryError;

/// Stores notifications in the `notifications` table, deduplicated within a
/// window.
#[derive(Debug, Clone)]
pub struct PgNotificationSink {
    pool: PgPool,
    window: DedupWindow,
}

impl PgNotificationSink {
    #[must_use]
    pub const fn new(pool: PgPool, window: DedupWindow) -> Self {
        Self { pool, window }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    #[instrument(skip(self, message), fields(user_id = %user_id, kind = %kind))]
    async fn notify(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        message: &str,
        related_order_id: Option<OrderId>,
    ) -> Result<Notification, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let stored = notifications::create_deduplicated(
            &mut *tx,
            user_id,
            kind,
            message,
            related_order_id,
            self.window,
            Utc::now(),
        )
        .await?;
        tx.commit().await?;

        match &stored {
            Stored::Created(n) => debug!(notification_id = %n.id, "Notification created"),
            Stored::Existing(n) => {
                debug!(notification_id = %n.id, "Duplicate notification suppressed");
            }
        }
        Ok(stored.into_inner())
    }
}

/// Send a committed transition's notification to its recipients.
///
/// Delivery failures are logged and swallowed: the transition has already
/// happened and must not be reported as failed.
pub(crate) async fn deliver(
    sink: &dyn NotificationSink,
    users: &dyn UserDirectory,
    intent: NotificationIntent,
) {
    let recipients = match intent.recipient {
        Recipient::Customer(user_id) => vec![user_id],
        Recipient::Admins => match users.list_admins().await {
            Ok(admins) => admins.into_iter().map(|admin| admin.id).collect(),
            Err(e) => {
                warn!(
                    error = %e,
                    kind = %intent.kind,
                    order_id = %intent.related_order_id,
                    "Could not resolve admins for notification"
                );
                return;
            }
        },
    };

    for user_id in recipients {
        if let Err(e) = sink
            .notify(
                user_id,
                intent.kind,
                &intent.message,
                Some(intent.related_order_id),
            )
            .await
        {
            warn!(
                error = %e,
                user_id = %user_id,
                kind = %intent.kind,
                order_id = %intent.related_order_id,
                "Notification delivery failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use grocer_core::{NotificationId, User};

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(UserId, NotificationKind, String)>>,
        fail_for: Option<UserId>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(
            &self,
            user_id: UserId,
            kind: NotificationKind,
            message: &str,
            related_order_id: Option<OrderId>,
        ) -> Result<Notification, RepositoryError> {
            if self.fail_for == Some(user_id) {
                return Err(RepositoryError::DataCorruption("sink down".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id, kind, message.to_owned()));
            Ok(Notification {
                id: NotificationId::new(1),
                user_id,
                kind,
                message: message.to_owned(),
                related_order_id,
                is_read: false,
                created_at: Utc::now(),
            })
        }
    }

    struct Admins(Vec<i32>);

    #[async_trait]
    impl UserDirectory for Admins {
        async fn get(&self, user_id: UserId) -> Result<Option<User>, RepositoryError> {
            Ok(self.0.contains(&user_id.as_i32()).then(|| admin(user_id.as_i32())))
        }

        async fn list_admins(&self) -> Result<Vec<User>, RepositoryError> {
            Ok(self.0.iter().copied().map(admin).collect())
        }
    }

    fn admin(id: i32) -> User {
        User {
            id: UserId::new(id),
            email: format!("admin{id}@example.com"),
            display_name: None,
            is_admin: true,
        }
    }

    fn intent(recipient: Recipient) -> NotificationIntent {
        NotificationIntent {
            recipient,
            kind: NotificationKind::NewOrder,
            message: "New order ORD-2025-0001".into(),
            related_order_id: OrderId::new(9),
        }
    }

    #[tokio::test]
    async fn test_admin_intent_reaches_every_admin() {
        let sink = RecordingSink::default();
        deliver(&sink, &Admins(vec![1, 2]), intent(Recipient::Admins)).await;

        let sent = sink.sent.lock().unwrap();
        let users: Vec<_> = sent.iter().map(|(user, _, _)| user.as_i32()).collect();
        assert_eq!(users, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_customer_intent_reaches_only_the_customer() {
        let sink = RecordingSink::default();
        deliver(
            &sink,
            &Admins(vec![1]),
            intent(Recipient::Customer(UserId::new(7))),
        )
        .await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, UserId::new(7));
    }

    #[tokio::test]
    async fn test_one_failing_recipient_does_not_stop_the_rest() {
        let sink = RecordingSink {
            fail_for: Some(UserId::new(1)),
            ..RecordingSink::default()
        };
        deliver(&sink, &Admins(vec![1, 2]), intent(Recipient::Admins)).await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, UserId::new(2));
    }
}
