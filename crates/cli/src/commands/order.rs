//! Order commands.
//!
//! # Usage
//!
//! ```bash
//! # Check out the active cart to address 3
//! grocer --user 7 order checkout 3 2025-01-08 evening --store Edeka
//!
//! # Check out explicit items
//! grocer --user 7 order checkout 3 2025-01-08 evening \
//!     --items '[{"productName":"Milk","quantity":"1","store":"Edeka"}]'
//!
//! # Negotiate the delivery date
//! grocer --user 1 order suggest 42 2025-01-10 morning
//! grocer --user 7 order propose 42 2025-01-09 afternoon
//! grocer --user 1 order accept-desired 42
//! ```

use chrono::NaiveDate;
use clap::Subcommand;
use grocer_core::{AddressId, CartItemDraft, DeliveryWindow, OrderId, OrderStatus};
use grocer_orders::{AppState, Checkout};

use super::{CliError, print_json, require_actor, require_user};

#[derive(Subcommand)]
pub enum OrderAction {
    /// Create an order from the active cart or from explicit items
    Checkout {
        address_id: i32,
        /// Desired delivery date (YYYY-MM-DD)
        date: NaiveDate,
        /// Desired time slot, e.g. "morning"
        slot: String,
        /// Store for items that name none
        #[arg(short, long)]
        store: Option<String>,
        #[arg(short, long)]
        instructions: Option<String>,
        /// JSON array of items; the active cart is used when omitted
        #[arg(long)]
        items: Option<String>,
    },
    /// Show one order by id or number
    Show {
        /// Order id, or an order number like ORD-2025-0001
        order: String,
    },
    /// List orders: your own, or every order with --all (admins)
    List {
        #[arg(long)]
        all: bool,
        #[arg(long, requires = "all")]
        include_deleted: bool,
    },
    /// Set the status (admins)
    Status {
        order_id: i32,
        status: OrderStatus,
    },
    /// Suggest a delivery date to the customer (admins)
    Suggest {
        order_id: i32,
        date: NaiveDate,
        slot: String,
    },
    /// Accept the suggested delivery date (owner)
    AcceptSuggestion {
        order_id: i32,
    },
    /// Propose a different delivery date (owner)
    Propose {
        order_id: i32,
        date: NaiveDate,
        slot: String,
    },
    /// Accept the customer's desired delivery date (admins)
    AcceptDesired {
        order_id: i32,
    },
    /// Set the final delivery date and lock the order (admins)
    Force {
        order_id: i32,
        date: NaiveDate,
        slot: String,
    },
    /// Change the desired delivery date and/or slot
    EditDelivery {
        order_id: i32,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        slot: Option<String>,
    },
    /// Deliver to another address of the order's owner
    Address {
        order_id: i32,
        address_id: i32,
    },
    /// Cancel the order
    Cancel {
        order_id: i32,
    },
    /// Soft-delete the order (admins)
    Delete {
        order_id: i32,
    },
    /// Restore a soft-deleted order (admins)
    Restore {
        order_id: i32,
    },
    /// Replace the additional instructions; omit the text to clear them
    Instructions {
        order_id: i32,
        text: Option<String>,
    },
}

#[allow(clippy::too_many_lines)]
pub async fn run(state: &AppState, user: Option<i32>, action: OrderAction) -> Result<(), CliError> {
    let orders = state.orders();

    match action {
        OrderAction::Checkout {
            address_id,
            date,
            slot,
            store,
            instructions,
            items,
        } => {
            let user_id = require_user(user)?;
            let items = items
                .map(|json| serde_json::from_str::<Vec<CartItemDraft>>(&json))
                .transpose()?;
            let checkout = Checkout {
                address_id: AddressId::new(address_id),
                desired_date: date,
                desired_slot: slot,
                store,
                instructions,
                items,
            };
            print_json(&orders.create(user_id, checkout).await?)
        }
        OrderAction::Show { order } => {
            let actor = require_actor(state, user).await?;
            let found = match order.parse::<i32>() {
                Ok(id) => orders.get(actor, OrderId::new(id)).await?,
                Err(_) => orders.get_by_number(actor, &order).await?,
            };
            print_json(&found)
        }
        OrderAction::List {
            all,
            include_deleted,
        } => {
            let actor = require_actor(state, user).await?;
            let list = if all {
                orders.list_all(actor, include_deleted).await?
            } else {
                orders.list_for_user(actor.user_id()).await?
            };
            print_json(&list)
        }
        OrderAction::Status { order_id, status } => {
            let actor = require_actor(state, user).await?;
            print_json(&orders.set_status(actor, OrderId::new(order_id), status).await?)
        }
        OrderAction::Suggest {
            order_id,
            date,
            slot,
        } => {
            let actor = require_actor(state, user).await?;
            let window = DeliveryWindow::new(date, slot);
            print_json(&orders.suggest_date(actor, OrderId::new(order_id), window).await?)
        }
        OrderAction::AcceptSuggestion { order_id } => {
            let actor = require_actor(state, user).await?;
            print_json(&orders.accept_suggestion(actor, OrderId::new(order_id)).await?)
        }
        OrderAction::Propose {
            order_id,
            date,
            slot,
        } => {
            let actor = require_actor(state, user).await?;
            let window = DeliveryWindow::new(date, slot);
            print_json(&orders.propose_date(actor, OrderId::new(order_id), window).await?)
        }
        OrderAction::AcceptDesired { order_id } => {
            let actor = require_actor(state, user).await?;
            print_json(&orders.accept_desired(actor, OrderId::new(order_id)).await?)
        }
        OrderAction::Force {
            order_id,
            date,
            slot,
        } => {
            let actor = require_actor(state, user).await?;
            let window = DeliveryWindow::new(date, slot);
            print_json(&orders.force_date(actor, OrderId::new(order_id), window).await?)
        }
        OrderAction::EditDelivery {
            order_id,
            date,
            slot,
        } => {
            if date.is_none() && slot.is_none() {
                return Err(CliError::Usage(
                    "give --date, --slot or both".to_string(),
                ));
            }
            let actor = require_actor(state, user).await?;
            print_json(
                &orders
                    .edit_delivery(actor, OrderId::new(order_id), date, slot)
                    .await?,
            )
        }
        OrderAction::Address {
            order_id,
            address_id,
        } => {
            let actor = require_actor(state, user).await?;
            print_json(
                &orders
                    .change_address(actor, OrderId::new(order_id), AddressId::new(address_id))
                    .await?,
            )
        }
        OrderAction::Cancel { order_id } => {
            let actor = require_actor(state, user).await?;
            print_json(&orders.cancel(actor, OrderId::new(order_id)).await?)
        }
        OrderAction::Delete { order_id } => {
            let actor = require_actor(state, user).await?;
            print_json(&orders.soft_delete(actor, OrderId::new(order_id)).await?)
        }
        OrderAction::Restore { order_id } => {
            let actor = require_actor(state, user).await?;
            print_json(&orders.restore(actor, OrderId::new(order_id)).await?)
        }
        OrderAction::Instructions { order_id, text } => {
            let actor = require_actor(state, user).await?;
            print_json(
                &orders
                    .update_instructions(actor, OrderId::new(order_id), text)
                    .await?,
            )
        }
    }
}
