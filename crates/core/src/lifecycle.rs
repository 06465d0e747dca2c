//! Order lifecycle state machine.
//!
//! Admins and customers act on the same machine with different privileges.
//! Each event has one [`Rule`] in [`RULES`] stating who may trigger it, from
//! which statuses, and whether the order lock applies. [`evaluate`] checks the
//! rule and computes the change set plus the notification to send; it never
//! touches storage, so the caller applies the result inside its transaction.
//!
//! Lock invariants: entering `date_forced` always locks the order, entering
//! `date_accepted` always unlocks it. The lock only restricts customers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::{ValidationError, non_blank};
use crate::notification::{NotificationIntent, Recipient};
use crate::order::{AddressSnapshot, DeliveryWindow, Order, OrderPatch};
use crate::types::{AddressId, NotificationKind, OrderStatus, UserId};

/// Who is acting on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "user_id", rename_all = "snake_case")]
pub enum Actor {
    Admin(UserId),
    Customer(UserId),
}

impl Actor {
    #[must_use]
    pub const fn user_id(self) -> UserId {
        match self {
            Self::Admin(id) | Self::Customer(id) => id,
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin(_))
    }
}

/// Something that happens to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// Overwrite the desired delivery date and/or slot.
    EditDelivery {
        date: Option<NaiveDate>,
        slot: Option<String>,
    },
    /// Point the order at another address of its owner.
    ChangeAddress {
        address_id: AddressId,
        snapshot: AddressSnapshot,
    },
    UpdateInstructions(Option<String>),
    SetStatus(OrderStatus),
    SuggestDate(DeliveryWindow),
    AcceptSuggestion,
    ProposeDate(DeliveryWindow),
    AcceptDesired,
    ForceDate(DeliveryWindow),
    Cancel,
    SoftDelete,
    Restore,
}

impl OrderEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::EditDelivery { .. } => EventKind::EditDelivery,
            Self::ChangeAddress { .. } => EventKind::ChangeAddress,
            Self::UpdateInstructions(_) => EventKind::UpdateInstructions,
            Self::SetStatus(_) => EventKind::SetStatus,
            Self::SuggestDate(_) => EventKind::SuggestDate,
            Self::AcceptSuggestion => EventKind::AcceptSuggestion,
            Self::ProposeDate(_) => EventKind::ProposeDate,
            Self::AcceptDesired => EventKind::AcceptDesired,
            Self::ForceDate(_) => EventKind::ForceDate,
            Self::Cancel => EventKind::Cancel,
            Self::SoftDelete => EventKind::SoftDelete,
            Self::Restore => EventKind::Restore,
        }
    }
}

/// Payload-free discriminant of [`OrderEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EditDelivery,
    ChangeAddress,
    UpdateInstructions,
    SetStatus,
    SuggestDate,
    AcceptSuggestion,
    ProposeDate,
    AcceptDesired,
    ForceDate,
    Cancel,
    SoftDelete,
    Restore,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EditDelivery => "edit_delivery",
            Self::ChangeAddress => "change_address",
            Self::UpdateInstructions => "update_instructions",
            Self::SetStatus => "set_status",
            Self::SuggestDate => "suggest_date",
            Self::AcceptSuggestion => "accept_suggestion",
            Self::ProposeDate => "propose_date",
            Self::AcceptDesired => "accept_desired",
            Self::ForceDate => "force_date",
            Self::Cancel => "cancel",
            Self::SoftDelete => "soft_delete",
            Self::Restore => "restore",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may trigger an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permitted {
    Admin,
    Owner,
    AdminOrOwner,
}

/// Statuses an event may start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Any,
    NonTerminal,
    Exactly(OrderStatus),
    /// `pending_customer_review`, or any open order that carries an admin
    /// suggestion and has no accepted date yet.
    AwaitingReply,
}

impl Source {
    fn admits(self, order: &Order) -> bool {
        match self {
            Self::Any => true,
            Self::NonTerminal => !order.status.is_terminal(),
            Self::Exactly(status) => order.status == status,
            Self::AwaitingReply => {
                order.status == OrderStatus::PendingCustomerReview
                    || (!order.status.is_terminal()
                        && order.status != OrderStatus::DateAccepted
                        && order.suggested().is_some())
            }
        }
    }
}

/// Guard on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub event: EventKind,
    pub permitted: Permitted,
    pub source: Source,
    /// Whether the event applies to soft-deleted orders instead of live ones.
    pub on_deleted: bool,
    /// Whether a locked order rejects this event from a customer.
    pub lock_guarded: bool,
}

const fn rule(event: EventKind, permitted: Permitted, source: Source, lock_guarded: bool) -> Rule {
    Rule {
        event,
        permitted,
        source,
        on_deleted: false,
        lock_guarded,
    }
}

/// The transition table.
pub const RULES: &[Rule] = &[
    rule(EventKind::EditDelivery, Permitted::AdminOrOwner, Source::NonTerminal, true),
    rule(EventKind::ChangeAddress, Permitted::AdminOrOwner, Source::NonTerminal, true),
    rule(EventKind::UpdateInstructions, Permitted::AdminOrOwner, Source::NonTerminal, false),
    rule(EventKind::SetStatus, Permitted::Admin, Source::Any, false),
    rule(EventKind::SuggestDate, Permitted::Admin, Source::NonTerminal, false),
    rule(EventKind::AcceptSuggestion, Permitted::Owner, Source::AwaitingReply, false),
    rule(EventKind::ProposeDate, Permitted::Owner, Source::NonTerminal, true),
    rule(
        EventKind::AcceptDesired,
        Permitted::Admin,
        Source::Exactly(OrderStatus::PendingAdminReview),
        false,
    ),
    rule(EventKind::ForceDate, Permitted::Admin, Source::NonTerminal, false),
    rule(EventKind::Cancel, Permitted::AdminOrOwner, Source::NonTerminal, false),
    rule(EventKind::SoftDelete, Permitted::Admin, Source::Any, false),
    Rule {
        on_deleted: true,
        ..rule(EventKind::Restore, Permitted::Admin, Source::Any, false)
    },
];

/// Look up the rule for an event.
#[must_use]
pub fn rule_for(event: EventKind) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.event == event)
}

/// Why a transition was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The order does not exist for this actor.
    #[error("order not found")]
    NotFound,
    #[error("not allowed to {event} this order")]
    Forbidden { event: EventKind },
    #[error("order is locked; delivery details can no longer be changed")]
    Locked,
    #[error("cannot {event} an order that is {status}")]
    InvalidTransition {
        event: EventKind,
        status: OrderStatus,
    },
    #[error("cannot {event} a deleted order")]
    Deleted { event: EventKind },
    #[error("cannot {event} an order that is not deleted")]
    NotDeleted { event: EventKind },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The accepted result of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub patch: OrderPatch,
    pub notify: Option<NotificationIntent>,
}

/// Check `event` by `actor` against `order` and compute its effects.
///
/// # Errors
///
/// Returns a [`TransitionError`] if the actor may not trigger the event, the
/// order is in the wrong status or deletion state, a customer hits the lock,
/// or the event payload is invalid.
pub fn evaluate(
    order: &Order,
    actor: Actor,
    event: &OrderEvent,
    now: DateTime<Utc>,
) -> Result<Transition, TransitionError> {
    let kind = event.kind();
    let rule = rule_for(kind).ok_or(TransitionError::Forbidden { event: kind })?;

    if let Actor::Customer(user_id) = actor {
        if order.is_deleted {
            return Err(TransitionError::NotFound);
        }
        if !order.is_owned_by(user_id) || rule.permitted == Permitted::Admin {
            return Err(TransitionError::Forbidden { event: kind });
        }
    } else if rule.permitted == Permitted::Owner {
        return Err(TransitionError::Forbidden { event: kind });
    }

    match (rule.on_deleted, order.is_deleted) {
        (false, true) => return Err(TransitionError::Deleted { event: kind }),
        (true, false) => return Err(TransitionError::NotDeleted { event: kind }),
        _ => {}
    }

    if !rule.source.admits(order) {
        return Err(TransitionError::InvalidTransition {
            event: kind,
            status: order.status,
        });
    }

    if rule.lock_guarded && order.is_locked && !actor.is_admin() {
        return Err(TransitionError::Locked);
    }

    effects(order, actor, event, now)
}

fn effects(
    order: &Order,
    actor: Actor,
    event: &OrderEvent,
    now: DateTime<Utc>,
) -> Result<Transition, TransitionError> {
    let number = &order.order_number;
    let customer = Recipient::Customer(order.user_id);
    let mut patch = OrderPatch::default();
    // Customers editing their own order notify nobody.
    let updated_by_admin = |message: String| {
        actor
            .is_admin()
            .then_some((customer, NotificationKind::OrderUpdated, message))
    };

    let notify = match event {
        OrderEvent::EditDelivery { date, slot } => {
            if let Some(slot) = slot {
                patch.desired_time_slot = Some(checked_slot(slot)?);
            }
            patch.desired_delivery_date = *date;
            updated_by_admin(format!("The delivery date of order {number} was changed"))
        }
        OrderEvent::ChangeAddress {
            address_id,
            snapshot,
        } => {
            patch.address = Some((*address_id, snapshot.clone()));
            updated_by_admin(format!("The delivery address of order {number} was changed"))
        }
        OrderEvent::UpdateInstructions(text) => {
            patch.additional_instructions =
                Some(non_blank(text.as_deref()).map(str::to_owned));
            updated_by_admin(format!("The instructions for order {number} were changed"))
        }
        OrderEvent::SetStatus(status) => {
            set_status(&mut patch, *status, now);
            Some((
                customer,
                NotificationKind::StatusChanged,
                format!("Order {number} is now {status}"),
            ))
        }
        OrderEvent::SuggestDate(window) => {
            let window = checked_window(window)?;
            let message = format!("A delivery date was suggested for order {number}: {window}");
            set_status(&mut patch, OrderStatus::PendingCustomerReview, now);
            patch.suggested = Some(window);
            Some((customer, NotificationKind::DateSuggested, message))
        }
        OrderEvent::AcceptSuggestion => {
            let window = order.suggested().ok_or(TransitionError::InvalidTransition {
                event: EventKind::AcceptSuggestion,
                status: order.status,
            })?;
            let message = format!("The customer accepted {window} for order {number}");
            set_status(&mut patch, OrderStatus::DateAccepted, now);
            patch.final_window = Some(window);
            Some((Recipient::Admins, NotificationKind::DateAccepted, message))
        }
        OrderEvent::ProposeDate(window) => {
            let window = checked_window(window)?;
            let message = format!("The customer proposed {window} for order {number}");
            set_status(&mut patch, OrderStatus::PendingAdminReview, now);
            patch.desired_delivery_date = Some(window.date);
            patch.desired_time_slot = Some(window.slot);
            Some((Recipient::Admins, NotificationKind::DateProposed, message))
        }
        OrderEvent::AcceptDesired => {
            let window = order.desired();
            let message = format!("Your delivery date {window} for order {number} was accepted");
            set_status(&mut patch, OrderStatus::DateAccepted, now);
            patch.final_window = Some(window);
            Some((customer, NotificationKind::DateAccepted, message))
        }
        OrderEvent::ForceDate(window) => {
            let window = checked_window(window)?;
            let message = format!("Delivery for order {number} was set to {window}");
            set_status(&mut patch, OrderStatus::DateForced, now);
            patch.suggested = Some(window.clone());
            patch.final_window = Some(window);
            Some((customer, NotificationKind::DateForced, message))
        }
        OrderEvent::Cancel => {
            set_status(&mut patch, OrderStatus::Cancelled, now);
            let recipient = if actor.is_admin() {
                customer
            } else {
                Recipient::Admins
            };
            Some((
                recipient,
                NotificationKind::OrderCancelled,
                format!("Order {number} was cancelled"),
            ))
        }
        OrderEvent::SoftDelete => {
            patch.is_deleted = Some(true);
            Some((
                customer,
                NotificationKind::OrderDeleted,
                format!("Order {number} was deleted"),
            ))
        }
        OrderEvent::Restore => {
            patch.is_deleted = Some(false);
            Some((
                customer,
                NotificationKind::OrderRestored,
                format!("Order {number} was restored"),
            ))
        }
    };

    Ok(Transition {
        patch,
        notify: notify.map(|(recipient, kind, message)| NotificationIntent {
            recipient,
            kind,
            message,
            related_order_id: order.id,
        }),
    })
}

/// Status change with the lock and cancellation side effects it implies.
fn set_status(patch: &mut OrderPatch, status: OrderStatus, now: DateTime<Utc>) {
    patch.status = Some(status);
    match status {
        OrderStatus::DateForced => patch.is_locked = Some(true),
        OrderStatus::DateAccepted => patch.is_locked = Some(false),
        OrderStatus::Cancelled => patch.cancelled_at = Some(now),
        _ => {}
    }
}

fn checked_slot(slot: &str) -> Result<String, ValidationError> {
    non_blank(Some(slot))
        .map(str::to_owned)
        .ok_or(ValidationError::EmptyTimeSlot)
}

fn checked_window(window: &DeliveryWindow) -> Result<DeliveryWindow, ValidationError> {
    Ok(DeliveryWindow::new(window.date, checked_slot(&window.slot)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::order::tests::sample_order;

    const ADMIN: Actor = Actor::Admin(UserId::new(1));
    const OWNER: Actor = Actor::Customer(UserId::new(7));
    const STRANGER: Actor = Actor::Customer(UserId::new(8));

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    /// Evaluate and apply, like the service does inside its transaction.
    fn fire(order: &mut Order, actor: Actor, event: OrderEvent) -> Result<Transition, TransitionError> {
        let now = Utc::now();
        let transition = evaluate(order, actor, &event, now)?;
        order.apply(transition.patch.clone(), now);
        Ok(transition)
    }

    fn edit_date(day: u32) -> OrderEvent {
        OrderEvent::EditDelivery {
            date: Some(date(day)),
            slot: None,
        }
    }

    #[test]
    fn test_every_event_has_one_rule() {
        let kinds = [
            EventKind::EditDelivery,
            EventKind::ChangeAddress,
            EventKind::UpdateInstructions,
            EventKind::SetStatus,
            EventKind::SuggestDate,
            EventKind::AcceptSuggestion,
            EventKind::ProposeDate,
            EventKind::AcceptDesired,
            EventKind::ForceDate,
            EventKind::Cancel,
            EventKind::SoftDelete,
            EventKind::Restore,
        ];
        for kind in kinds {
            assert_eq!(RULES.iter().filter(|rule| rule.event == kind).count(), 1, "{kind}");
        }
        assert_eq!(RULES.len(), kinds.len());
    }

    #[test]
    fn test_suggest_then_accept() {
        let mut order = sample_order();

        let suggested = fire(
            &mut order,
            ADMIN,
            OrderEvent::SuggestDate(DeliveryWindow::new(date(10), "morning")),
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::PendingCustomerReview);
        assert_eq!(order.suggested_delivery_date, Some(date(10)));
        let intent = suggested.notify.unwrap();
        assert_eq!(intent.recipient, Recipient::Customer(order.user_id));
        assert_eq!(intent.kind, NotificationKind::DateSuggested);

        let accepted = fire(&mut order, OWNER, OrderEvent::AcceptSuggestion).unwrap();
        assert_eq!(order.status, OrderStatus::DateAccepted);
        assert_eq!(order.final_delivery_date, Some(date(10)));
        assert_eq!(order.final_time_slot.as_deref(), Some("morning"));
        assert!(!order.is_locked);
        assert_eq!(accepted.notify.unwrap().recipient, Recipient::Admins);
    }

    #[test]
    fn test_force_locks_out_customer_edits() {
        let mut order = sample_order();

        fire(
            &mut order,
            ADMIN,
            OrderEvent::ForceDate(DeliveryWindow::new(date(12), "noon")),
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::DateForced);
        assert!(order.is_locked);
        assert_eq!(order.final_delivery_date, Some(date(12)));
        assert_eq!(order.suggested_delivery_date, Some(date(12)));

        assert_eq!(
            fire(&mut order, OWNER, edit_date(20)),
            Err(TransitionError::Locked)
        );
        assert_eq!(order.desired_delivery_date, date(8));
    }

    #[test]
    fn test_lock_never_stops_admin() {
        let mut order = sample_order();
        order.is_locked = true;

        for event in [
            edit_date(20),
            OrderEvent::ChangeAddress {
                address_id: AddressId::new(4),
                snapshot: AddressSnapshot::default(),
            },
        ] {
            assert_eq!(
                evaluate(&order, OWNER, &event, Utc::now()),
                Err(TransitionError::Locked)
            );
            assert!(evaluate(&order, ADMIN, &event, Utc::now()).is_ok());
        }

        assert_eq!(
            evaluate(
                &order,
                OWNER,
                &OrderEvent::ProposeDate(DeliveryWindow::new(date(9), "morning")),
                Utc::now()
            ),
            Err(TransitionError::Locked)
        );
    }

    #[test]
    fn test_admin_edits_notify_the_customer() {
        let order = sample_order();
        let events = [
            edit_date(20),
            OrderEvent::ChangeAddress {
                address_id: AddressId::new(4),
                snapshot: AddressSnapshot::default(),
            },
            OrderEvent::UpdateInstructions(Some("ring twice".into())),
        ];

        for event in &events {
            let intent = evaluate(&order, ADMIN, event, Utc::now())
                .unwrap()
                .notify
                .unwrap();
            assert_eq!(intent.recipient, Recipient::Customer(order.user_id));
            assert_eq!(intent.kind, NotificationKind::OrderUpdated);
            assert!(intent.message.contains("ORD-2025-0001"), "{}", intent.message);
        }

        for event in &events {
            let transition = evaluate(&order, OWNER, event, Utc::now()).unwrap();
            assert!(transition.notify.is_none());
        }
    }

    #[test]
    fn test_lock_does_not_cover_instructions_or_cancel() {
        let mut order = sample_order();
        order.is_locked = true;

        fire(
            &mut order,
            OWNER,
            OrderEvent::UpdateInstructions(Some("leave at the door".into())),
        )
        .unwrap();
        assert_eq!(
            order.additional_instructions.as_deref(),
            Some("leave at the door")
        );
        assert!(fire(&mut order, OWNER, OrderEvent::Cancel).is_ok());
    }

    #[test]
    fn test_customer_accepts_forced_date_and_unlocks() {
        let mut order = sample_order();
        fire(
            &mut order,
            ADMIN,
            OrderEvent::ForceDate(DeliveryWindow::new(date(12), "noon")),
        )
        .unwrap();

        fire(&mut order, OWNER, OrderEvent::AcceptSuggestion).unwrap();
        assert_eq!(order.status, OrderStatus::DateAccepted);
        assert!(!order.is_locked);

        assert!(matches!(
            fire(&mut order, OWNER, OrderEvent::AcceptSuggestion),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_accept_suggestion_needs_a_suggestion() {
        let order = sample_order();
        assert_eq!(
            evaluate(&order, OWNER, &OrderEvent::AcceptSuggestion, Utc::now()),
            Err(TransitionError::InvalidTransition {
                event: EventKind::AcceptSuggestion,
                status: OrderStatus::New,
            })
        );
    }

    #[test]
    fn test_propose_then_admin_accepts_desired() {
        let mut order = sample_order();
        order.is_locked = false;

        let proposed = fire(
            &mut order,
            OWNER,
            OrderEvent::ProposeDate(DeliveryWindow::new(date(15), "afternoon")),
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::PendingAdminReview);
        assert_eq!(order.desired_delivery_date, date(15));
        assert_eq!(proposed.notify.unwrap().kind, NotificationKind::DateProposed);

        fire(&mut order, ADMIN, OrderEvent::AcceptDesired).unwrap();
        assert_eq!(order.status, OrderStatus::DateAccepted);
        assert_eq!(order.final_delivery_date, Some(date(15)));
        assert_eq!(order.final_time_slot.as_deref(), Some("afternoon"));
    }

    #[test]
    fn test_accept_desired_only_from_admin_review() {
        let order = sample_order();
        assert!(matches!(
            evaluate(&order, ADMIN, &OrderEvent::AcceptDesired, Utc::now()),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_set_status_enforces_lock_invariants() {
        let mut order = sample_order();

        fire(&mut order, ADMIN, OrderEvent::SetStatus(OrderStatus::DateForced)).unwrap();
        assert!(order.is_locked);

        fire(&mut order, ADMIN, OrderEvent::SetStatus(OrderStatus::DateAccepted)).unwrap();
        assert!(!order.is_locked);

        let transition =
            fire(&mut order, ADMIN, OrderEvent::SetStatus(OrderStatus::Cancelled)).unwrap();
        assert!(order.cancelled_at.is_some());
        assert_eq!(
            transition.notify.unwrap().kind,
            NotificationKind::StatusChanged
        );

        // Admins may move terminal orders back.
        fire(&mut order, ADMIN, OrderEvent::SetStatus(OrderStatus::Processing)).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[test]
    fn test_customers_cannot_use_admin_events() {
        let order = sample_order();
        for event in [
            OrderEvent::SetStatus(OrderStatus::Completed),
            OrderEvent::SuggestDate(DeliveryWindow::new(date(9), "morning")),
            OrderEvent::ForceDate(DeliveryWindow::new(date(9), "morning")),
            OrderEvent::AcceptDesired,
            OrderEvent::SoftDelete,
        ] {
            assert!(matches!(
                evaluate(&order, OWNER, &event, Utc::now()),
                Err(TransitionError::Forbidden { .. })
            ));
        }
    }

    #[test]
    fn test_admin_cannot_answer_for_customer() {
        let mut order = sample_order();
        order.status = OrderStatus::PendingCustomerReview;
        order.suggested_delivery_date = Some(date(9));
        order.suggested_time_slot = Some("morning".into());
        assert_eq!(
            evaluate(&order, ADMIN, &OrderEvent::AcceptSuggestion, Utc::now()),
            Err(TransitionError::Forbidden {
                event: EventKind::AcceptSuggestion
            })
        );
    }

    #[test]
    fn test_other_customers_are_forbidden() {
        let order = sample_order();
        assert_eq!(
            evaluate(&order, STRANGER, &OrderEvent::Cancel, Utc::now()),
            Err(TransitionError::Forbidden {
                event: EventKind::Cancel
            })
        );
    }

    #[test]
    fn test_terminal_orders_reject_negotiation() {
        for status in [OrderStatus::Cancelled, OrderStatus::Completed] {
            let mut order = sample_order();
            order.status = status;
            for event in [
                OrderEvent::SuggestDate(DeliveryWindow::new(date(9), "morning")),
                OrderEvent::ForceDate(DeliveryWindow::new(date(9), "morning")),
                OrderEvent::Cancel,
            ] {
                assert_eq!(
                    evaluate(&order, ADMIN, &event, Utc::now()),
                    Err(TransitionError::InvalidTransition {
                        event: event.kind(),
                        status,
                    })
                );
            }
            assert!(matches!(
                evaluate(&order, OWNER, &edit_date(9), Utc::now()),
                Err(TransitionError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn test_cancel_notifies_the_other_party() {
        let order = sample_order();

        let by_customer = evaluate(&order, OWNER, &OrderEvent::Cancel, Utc::now()).unwrap();
        assert_eq!(by_customer.notify.unwrap().recipient, Recipient::Admins);

        let by_admin = evaluate(&order, ADMIN, &OrderEvent::Cancel, Utc::now()).unwrap();
        assert_eq!(
            by_admin.notify.unwrap().recipient,
            Recipient::Customer(order.user_id)
        );
        assert_eq!(by_admin.patch.status, Some(OrderStatus::Cancelled));
        assert!(by_admin.patch.cancelled_at.is_some());
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let mut order = sample_order();
        order.status = OrderStatus::Processing;

        fire(&mut order, ADMIN, OrderEvent::SoftDelete).unwrap();
        assert!(order.is_deleted);
        assert_eq!(order.status, OrderStatus::Processing);

        assert_eq!(
            evaluate(&order, OWNER, &OrderEvent::Cancel, Utc::now()),
            Err(TransitionError::NotFound)
        );
        assert_eq!(
            evaluate(
                &order,
                ADMIN,
                &OrderEvent::ForceDate(DeliveryWindow::new(date(9), "morning")),
                Utc::now()
            ),
            Err(TransitionError::Deleted {
                event: EventKind::ForceDate
            })
        );
        assert_eq!(
            evaluate(&order, ADMIN, &OrderEvent::SoftDelete, Utc::now()),
            Err(TransitionError::Deleted {
                event: EventKind::SoftDelete
            })
        );

        let restored = fire(&mut order, ADMIN, OrderEvent::Restore).unwrap();
        assert!(!order.is_deleted);
        assert_eq!(restored.notify.unwrap().kind, NotificationKind::OrderRestored);

        assert_eq!(
            evaluate(&order, ADMIN, &OrderEvent::Restore, Utc::now()),
            Err(TransitionError::NotDeleted {
                event: EventKind::Restore
            })
        );
    }

    #[test]
    fn test_blank_slot_is_rejected() {
        let order = sample_order();
        assert_eq!(
            evaluate(
                &order,
                ADMIN,
                &OrderEvent::SuggestDate(DeliveryWindow::new(date(9), "  ")),
                Utc::now()
            ),
            Err(TransitionError::Validation(ValidationError::EmptyTimeSlot))
        );
        assert_eq!(
            evaluate(
                &order,
                OWNER,
                &OrderEvent::EditDelivery {
                    date: None,
                    slot: Some(String::new()),
                },
                Utc::now()
            ),
            Err(TransitionError::Validation(ValidationError::EmptyTimeSlot))
        );
    }

    #[test]
    fn test_intents_reference_the_order() {
        let order = sample_order();
        let transition = evaluate(
            &order,
            ADMIN,
            &OrderEvent::SuggestDate(DeliveryWindow::new(date(10), "morning")),
            Utc::now(),
        )
        .unwrap();
        let intent = transition.notify.unwrap();
        assert_eq!(intent.related_order_id, order.id);
        assert_eq!(
            intent.message,
            "A delivery date was suggested for order ORD-2025-0001: 2025-01-10 (morning)"
        );
    }
}
