//! Image commands.
//!
//! # Usage
//!
//! ```bash
//! # Upload a photo for cart item 12
//! grocer --user 7 image upload cart-item 12 ./milk.jpg
//!
//! # Inspect or build transport strings (no database needed)
//! grocer image decode 'MULTI:JTVCJTdCJTIy...'
//! grocer image encode '[{"url":"/uploads/a.jpg","isMain":true,"sortOrder":0}]'
//!
//! # Ingest legacy image strings of historical items
//! grocer image backfill --limit 1000
//! ```

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use grocer_core::image::{decode_detailed, encode};
use grocer_core::{CartItemId, ImageId, ImageOwner, ImageRef, OrderItemId};
use grocer_orders::AppState;

use super::{CliError, print_json, require_actor};

/// Which kind of item an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OwnerKind {
    CartItem,
    OrderItem,
}

impl OwnerKind {
    const fn owner(self, item_id: i32) -> ImageOwner {
        match self {
            Self::CartItem => ImageOwner::CartItem(CartItemId::new(item_id)),
            Self::OrderItem => ImageOwner::OrderItem(OrderItemId::new(item_id)),
        }
    }
}

#[derive(Subcommand)]
pub enum ImageAction {
    /// Upload an image file for an item
    Upload {
        kind: OwnerKind,
        item_id: i32,
        path: PathBuf,
    },
    /// Make an image the item's main image
    SetMain {
        kind: OwnerKind,
        item_id: i32,
        image_id: i32,
    },
    /// Delete an image
    Remove {
        image_id: i32,
    },
    /// List an item's images
    List {
        kind: OwnerKind,
        item_id: i32,
    },
    /// Decode a transport string into its images
    Decode {
        value: String,
    },
    /// Encode a JSON array of images as a transport string
    Encode {
        json: String,
    },
    /// Ingest legacy image strings into the image table
    Backfill {
        /// Items per kind to process
        #[arg(long, default_value_t = 500)]
        limit: i64,
    },
}

/// Run the commands that need no database. Returns `None` for the others.
pub fn run_offline(action: &ImageAction) -> Option<Result<(), CliError>> {
    match action {
        ImageAction::Decode { value } => {
            let (images, decoding) = decode_detailed(Some(value));
            Some(print_json(&serde_json::json!({
                "decoding": format!("{decoding:?}").to_lowercase(),
                "images": images,
            })))
        }
        ImageAction::Encode { json } => Some(
            serde_json::from_str::<Vec<ImageRef>>(json)
                .map_err(CliError::from)
                .and_then(|images| print_json(&encode(&images))),
        ),
        _ => None,
    }
}

pub async fn run(state: &AppState, user: Option<i32>, action: ImageAction) -> Result<(), CliError> {
    let images = state.images();

    match action {
        ImageAction::Upload {
            kind,
            item_id,
            path,
        } => {
            let actor = require_actor(state, user).await?;
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| CliError::Usage(format!("not a file: {}", path.display())))?
                .to_owned();
            let bytes = tokio::fs::read(&path).await?;
            print_json(
                &images
                    .upload(actor, kind.owner(item_id), &file_name, &bytes)
                    .await?,
            )
        }
        ImageAction::SetMain {
            kind,
            item_id,
            image_id,
        } => {
            let actor = require_actor(state, user).await?;
            images
                .set_main(actor, kind.owner(item_id), ImageId::new(image_id))
                .await?;
            print_json(&images.list(actor, kind.owner(item_id)).await?)
        }
        ImageAction::Remove { image_id } => {
            let actor = require_actor(state, user).await?;
            print_json(&images.remove(actor, ImageId::new(image_id)).await?)
        }
        ImageAction::List { kind, item_id } => {
            let actor = require_actor(state, user).await?;
            print_json(&images.list(actor, kind.owner(item_id)).await?)
        }
        ImageAction::Backfill { limit } => print_json(&images.backfill(limit).await?),
        ImageAction::Decode { .. } | ImageAction::Encode { .. } => {
            run_offline(&action).unwrap_or(Ok(()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_kind_maps_to_owner() {
        assert_eq!(
            OwnerKind::CartItem.owner(5),
            ImageOwner::CartItem(CartItemId::new(5))
        );
        assert_eq!(
            OwnerKind::OrderItem.owner(9).to_string(),
            "order_item:9"
        );
    }
}
