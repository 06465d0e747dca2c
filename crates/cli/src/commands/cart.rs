//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! grocer --user 7 cart show
//! grocer --user 7 cart add "Bread" 2 --notes "sliced"
//! grocer --user 7 cart remove-item 12
//! grocer --user 7 cart clear
//! ```

use clap::Subcommand;
use grocer_core::{CartItemDraft, CartItemId};
use grocer_orders::AppState;

use super::{CliError, print_json, require_user};

#[derive(Subcommand)]
pub enum CartAction {
    /// Show the active cart with its items and images
    Show,
    /// Add an item
    Add {
        /// Product name
        product: String,
        /// Free-form quantity, e.g. "2" or "500 g"
        quantity: String,
        /// Store to buy from; inherited from the cart when omitted
        #[arg(short, long)]
        store: Option<String>,
        #[arg(short, long)]
        notes: Option<String>,
        /// Image transport string or a single image url
        #[arg(long)]
        image_url: Option<String>,
    },
    /// Delete every item
    Clear,
    /// Delete one item
    RemoveItem {
        item_id: i32,
    },
    /// Set the default store for items without one
    Store {
        /// Omit to clear the default store
        store: Option<String>,
    },
}

pub async fn run(state: &AppState, user: Option<i32>, action: CartAction) -> Result<(), CliError> {
    let user_id = require_user(user)?;
    let carts = state.carts();

    match action {
        CartAction::Show => print_json(&carts.get_active(user_id).await?),
        CartAction::Add {
            product,
            quantity,
            store,
            notes,
            image_url,
        } => {
            let draft = CartItemDraft {
                product_name: product,
                quantity,
                store,
                notes,
                image_url,
            };
            print_json(&carts.add_item(user_id, draft).await?)
        }
        CartAction::Clear => {
            let removed = carts.clear(user_id).await?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
        CartAction::RemoveItem { item_id } => {
            carts.remove_item(user_id, CartItemId::new(item_id)).await?;
            print_json(&serde_json::json!({ "removed": item_id }))
        }
        CartAction::Store { store } => print_json(&carts.set_store(user_id, store).await?),
    }
}
