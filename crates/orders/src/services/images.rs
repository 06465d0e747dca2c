//! Item image operations.
//!
//! Uploads land in the [`FileStore`] first and are then recorded in the image
//! table. Reads hydrate items with their records and replace the item's
//! `image_url` by the transport-string projection, ingesting legacy strings
//! of items that have no records yet.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};

use grocer_core::image::encode;
use grocer_core::{
    Actor, CartItem, ImageId, ImageOwner, ImageOwnerKind, ImageRecord, ImageRef, OrderItem,
};

use super::FileStore;
use crate::db::{self, RepositoryError};
use crate::error::{Result, ServiceError};

/// Accepted upload extensions, lowercase.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// The lowercase extension of `file_name` if it is an accepted image type.
#[must_use]
pub fn image_extension(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let extension = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// Counts from a backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BackfillReport {
    pub items: usize,
    pub images: usize,
    pub failed: usize,
}

/// Uploads, lists and edits item images.
#[derive(Clone)]
pub struct ImageService {
    pool: PgPool,
    files: Arc<dyn FileStore>,
    max_bytes: usize,
}

impl ImageService {
    #[must_use]
    pub fn new(pool: PgPool, files: Arc<dyn FileStore>, max_bytes: usize) -> Self {
        Self {
            pool,
            files,
            max_bytes,
        }
    }

    /// Store an uploaded file and attach it to `owner`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an unsupported type or oversized file,
    /// `Forbidden`/`NotFound` when the actor may not touch the item, and
    /// `CapacityExceeded` when the item already has the maximum of images.
    #[instrument(skip(self, bytes), fields(owner = %owner, size = bytes.len()))]
    pub async fn upload(
        &self,
        actor: Actor,
        owner: ImageOwner,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ImageRef> {
        let extension = image_extension(file_name).ok_or_else(|| {
            ServiceError::Validation(format!(
                "unsupported image type; allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;
        if bytes.is_empty() {
            return Err(ServiceError::Validation("image file is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(ServiceError::Validation(format!(
                "image exceeds the limit of {} bytes",
                self.max_bytes
            )));
        }

        {
            let mut conn = self.pool.acquire().await?;
            authorize(&mut conn, actor, owner).await?;
        }

        let url = self.files.save(&extension, bytes).await?;

        match self.attach(owner, &url).await {
            Ok(record) => {
                info!(image_id = %record.id, url = %record.url, "Image uploaded");
                Ok(record.to_ref())
            }
            Err(e) => {
                if let Err(delete_err) = self.files.delete(&url).await {
                    warn!(error = %delete_err, url = %url, "Could not delete orphaned upload");
                }
                Err(e)
            }
        }
    }

    async fn attach(&self, owner: ImageOwner, url: &str) -> Result<ImageRecord> {
        let mut tx = self.pool.begin().await?;
        let record = db::images::add(&mut *tx, owner, url).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Make `image_id` the item's main image.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the image does not belong to `owner`.
    #[instrument(skip(self), fields(owner = %owner, image_id = %image_id))]
    pub async fn set_main(&self, actor: Actor, owner: ImageOwner, image_id: ImageId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        authorize(&mut *tx, actor, owner).await?;
        db::images::set_main(&mut *tx, owner, image_id).await?;
        tx.commit().await?;

        info!("Main image changed");
        Ok(())
    }

    /// Delete an image. Its file goes too once no record references it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the image does not exist.
    #[instrument(skip(self), fields(image_id = %image_id))]
    pub async fn remove(&self, actor: Actor, image_id: ImageId) -> Result<ImageRecord> {
        let mut tx = self.pool.begin().await?;
        let owner = db::images::get(&mut *tx, image_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("image {image_id}")))?
            .owner;
        authorize(&mut *tx, actor, owner).await?;
        let removal = db::images::remove(&mut *tx, image_id).await?;
        tx.commit().await?;

        info!(owner = %owner, promoted = ?removal.promoted, "Image removed");
        release_files(&self.pool, self.files.as_ref(), [removal.removed.url.as_str()]).await;
        Ok(removal.removed)
    }

    /// Images of an item, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden`/`NotFound` when the actor may not see the item.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn list(&self, actor: Actor, owner: ImageOwner) -> Result<Vec<ImageRecord>> {
        let mut conn = self.pool.acquire().await?;
        let legacy = authorize(&mut conn, actor, owner).await?;

        let records = db::images::list_for(&mut conn, owner).await?;
        if !records.is_empty() {
            return Ok(records);
        }
        match legacy {
            Some(encoded) => Ok(backfill_one(&mut conn, owner, &encoded)
                .await
                .unwrap_or_default()),
            None => Ok(records),
        }
    }

    /// Ingest the legacy image strings of up to `limit` items per kind.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the pending items cannot be listed.
    #[instrument(skip(self))]
    pub async fn backfill(&self, limit: i64) -> Result<BackfillReport> {
        let mut conn = self.pool.acquire().await?;
        let mut report = BackfillReport::default();

        for kind in [ImageOwnerKind::CartItem, ImageOwnerKind::OrderItem] {
            let pending = db::images::pending_backfill(&mut conn, kind, limit).await?;
            for item in pending {
                report.items += 1;
                match backfill_one(&mut conn, item.owner, &item.image_url).await {
                    Some(inserted) => report.images += inserted.len(),
                    None => report.failed += 1,
                }
            }
        }

        info!(
            items = report.items,
            images = report.images,
            failed = report.failed,
            "Legacy image backfill finished"
        );
        Ok(report)
    }
}

/// Check that `actor` may touch `owner`'s images. Returns the item's legacy
/// image string.
async fn authorize(
    conn: &mut PgConnection,
    actor: Actor,
    owner: ImageOwner,
) -> Result<Option<String>> {
    let (user_id, order_deleted) = db::images::owner_user(&mut *conn, owner)
        .await?
        .ok_or_else(|| ServiceError::not_found(owner))?;

    if let Actor::Customer(customer) = actor {
        if order_deleted {
            return Err(ServiceError::not_found(owner));
        }
        if customer != user_id {
            return Err(ServiceError::Forbidden(format!(
                "{owner} belongs to another user"
            )));
        }
    }

    legacy_image_url(conn, owner).await.map_err(Into::into)
}

async fn legacy_image_url(
    conn: &mut PgConnection,
    owner: ImageOwner,
) -> std::result::Result<Option<String>, RepositoryError> {
    let query = match owner {
        ImageOwner::CartItem(id) => {
            sqlx::query_scalar::<_, Option<String>>("SELECT image_url FROM cart_items WHERE id = $1")
                .bind(id)
        }
        ImageOwner::OrderItem(id) => {
            sqlx::query_scalar::<_, Option<String>>("SELECT image_url FROM order_items WHERE id = $1")
                .bind(id)
        }
    };
    let value = query.fetch_optional(conn).await?.flatten();
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Ingest one legacy string inside a savepoint. Failures are logged and
/// yield `None`.
pub(crate) async fn backfill_one(
    conn: &mut PgConnection,
    owner: ImageOwner,
    encoded: &str,
) -> Option<Vec<ImageRecord>> {
    match ingest_in_savepoint(conn, owner, encoded).await {
        Ok(records) => Some(records),
        Err(e) => {
            warn!(error = %e, owner = %owner, "Legacy image ingestion failed");
            None
        }
    }
}

/// Delete the files behind `urls` that no record uses any more. Runs after
/// the deleting transaction committed; failures are logged.
pub(crate) async fn release_files<'a>(
    pool: &PgPool,
    files: &dyn FileStore,
    urls: impl IntoIterator<Item = &'a str>,
) {
    for url in urls {
        let references = match pool.acquire().await {
            Ok(mut conn) => db::images::count_references(&mut conn, url).await,
            Err(e) => Err(RepositoryError::Database(e)),
        };
        match references {
            Ok(0) => {
                if let Err(e) = files.delete(url).await {
                    warn!(error = %e, url = %url, "Could not delete image file");
                }
            }
            Ok(count) => {
                info!(url = %url, references = count, "Image file still referenced");
            }
            Err(e) => warn!(error = %e, url = %url, "Could not count image references"),
        }
    }
}

/// Ingest a transport string for `owner` inside a savepoint, returning the
/// owner's images afterwards. Nothing is kept if any step fails.
pub(crate) async fn ingest_in_savepoint(
    conn: &mut PgConnection,
    owner: ImageOwner,
    encoded: &str,
) -> std::result::Result<Vec<ImageRecord>, RepositoryError> {
    let mut savepoint = sqlx::Connection::begin(&mut *conn).await?;
    db::images::ingest_legacy_string(&mut *savepoint, owner, encoded).await?;
    let records = db::images::list_for(&mut *savepoint, owner).await?;
    savepoint.commit().await?;
    Ok(records)
}

/// Copy `from`'s images onto `to` inside a savepoint. Failures are logged and
/// yield no images.
pub(crate) async fn copy_in_savepoint(
    conn: &mut PgConnection,
    from: ImageOwner,
    to: ImageOwner,
) -> Vec<ImageRecord> {
    match try_copy_in_savepoint(conn, from, to).await {
        Ok(copied) => copied,
        Err(e) => {
            warn!(error = %e, from = %from, to = %to, "Could not copy item images");
            Vec::new()
        }
    }
}

async fn try_copy_in_savepoint(
    conn: &mut PgConnection,
    from: ImageOwner,
    to: ImageOwner,
) -> std::result::Result<Vec<ImageRecord>, RepositoryError> {
    let mut savepoint = sqlx::Connection::begin(&mut *conn).await?;
    let copied = db::images::copy_images(&mut *savepoint, from, to).await?;
    savepoint.commit().await?;
    Ok(copied)
}

/// An item whose images are read through the image table.
pub(crate) trait ImageHolder {
    fn owner(&self) -> ImageOwner;

    /// The stored legacy transport string.
    fn legacy_image_url(&self) -> Option<&str>;

    /// Replace the item's images and project them onto `image_url`.
    fn attach(&mut self, images: Vec<ImageRecord>);
}

fn project(images: &[ImageRecord]) -> Option<String> {
    let refs: Vec<ImageRef> = images.iter().map(ImageRecord::to_ref).collect();
    Some(encode(&refs)).filter(|s| !s.is_empty())
}

impl ImageHolder for CartItem {
    fn owner(&self) -> ImageOwner {
        ImageOwner::CartItem(self.id)
    }

    fn legacy_image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn attach(&mut self, images: Vec<ImageRecord>) {
        self.image_url = project(&images);
        self.images = images;
    }
}

impl ImageHolder for OrderItem {
    fn owner(&self) -> ImageOwner {
        ImageOwner::OrderItem(self.id)
    }

    fn legacy_image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn attach(&mut self, images: Vec<ImageRecord>) {
        self.image_url = project(&images);
        self.images = images;
    }
}

/// Load the images of `items`, ingesting legacy strings of items without
/// records. An item whose ingestion fails keeps its legacy string.
pub(crate) async fn hydrate<T: ImageHolder>(
    conn: &mut PgConnection,
    kind: ImageOwnerKind,
    items: &mut [T],
) -> std::result::Result<(), RepositoryError> {
    let ids: Vec<i32> = items
        .iter()
        .map(|item| match item.owner() {
            ImageOwner::CartItem(id) => id.as_i32(),
            ImageOwner::OrderItem(id) => id.as_i32(),
        })
        .collect();

    let mut by_owner: HashMap<ImageOwner, Vec<ImageRecord>> = HashMap::new();
    for record in db::images::list_for_owners(&mut *conn, kind, &ids).await? {
        by_owner.entry(record.owner).or_default().push(record);
    }

    for item in items.iter_mut() {
        let owner = item.owner();
        if let Some(records) = by_owner.remove(&owner) {
            item.attach(records);
            continue;
        }

        let legacy = item
            .legacy_image_url()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        match legacy {
            Some(encoded) => {
                if let Some(records) = backfill_one(&mut *conn, owner, &encoded).await {
                    item.attach(records);
                }
            }
            None => item.attach(Vec::new()),
        }
    }
    Ok(())
}
