//! Invariants of one owner's image set.
//!
//! An [`ImageSet`] holds the records of a single owner, ordered by
//! `sort_order`. Mutating operations keep two invariants: at most
//! [`MAX_IMAGES_PER_ITEM`] images, and exactly one main image whenever the
//! set is non-empty. The repository loads a set under a row lock, asks it for
//! a plan, and persists the result.

use std::collections::HashSet;

use super::{ImageError, ImageOwner, ImageRecord, ImageRef, MAX_IMAGES_PER_ITEM, normalize};
use crate::types::ImageId;

/// An image about to be inserted for an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub url: String,
    pub is_main: bool,
    pub sort_order: i32,
}

/// Result of planning a transport string ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestPlan {
    /// Images to insert, in order.
    pub pending: Vec<PendingImage>,
    /// Decoded images whose url the owner already has.
    pub skipped_existing: usize,
    /// Decoded images that did not fit into the remaining capacity.
    pub dropped_over_capacity: usize,
}

/// Outcome of removing an image from a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: ImageRecord,
    /// Sibling promoted to main because the removed image was main.
    pub promoted: Option<ImageId>,
    /// Siblings whose `sort_order` changed, with their new value.
    pub renumbered: Vec<(ImageId, i32)>,
}

/// The images of one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    owner: ImageOwner,
    images: Vec<ImageRecord>,
}

impl ImageSet {
    /// Build a set from the owner's records, in any order.
    #[must_use]
    pub fn new(owner: ImageOwner, mut images: Vec<ImageRecord>) -> Self {
        images.retain(|image| image.owner == owner);
        images.sort_by_key(|image| image.sort_order);
        Self { owner, images }
    }

    #[must_use]
    pub const fn owner(&self) -> ImageOwner {
        self.owner
    }

    /// Records ordered by `sort_order`.
    #[must_use]
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.images.len() >= MAX_IMAGES_PER_ITEM
    }

    #[must_use]
    pub fn main(&self) -> Option<&ImageRecord> {
        self.images.iter().find(|image| image.is_main)
    }

    #[must_use]
    pub fn get(&self, id: ImageId) -> Option<&ImageRecord> {
        self.images.iter().find(|image| image.id == id)
    }

    #[must_use]
    pub fn contains_url(&self, url: &str) -> bool {
        self.images.iter().any(|image| image.url == url)
    }

    /// The set as transport refs.
    #[must_use]
    pub fn refs(&self) -> Vec<ImageRef> {
        self.images.iter().map(ImageRecord::to_ref).collect()
    }

    fn next_sort_order(&self) -> i32 {
        self.images
            .iter()
            .map(|image| image.sort_order)
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    /// Plan appending one image.
    ///
    /// The first image of an owner becomes main; later ones are appended
    /// after the current highest `sort_order`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::CapacityExceeded`] if the owner already has
    /// [`MAX_IMAGES_PER_ITEM`] images.
    pub fn plan_add(&self, url: &str) -> Result<PendingImage, ImageError> {
        if self.is_full() {
            return Err(ImageError::CapacityExceeded {
                max: MAX_IMAGES_PER_ITEM,
            });
        }

        Ok(PendingImage {
            url: url.to_owned(),
            is_main: self.images.is_empty(),
            sort_order: self.next_sort_order(),
        })
    }

    /// Plan persisting decoded refs.
    ///
    /// Refs are normalized first. Urls the owner already has are skipped, so
    /// ingesting the same string twice adds nothing the second time. Refs
    /// beyond the remaining capacity are dropped. If the owner has no main
    /// image yet, the decoded main (or the first new image) becomes main.
    #[must_use]
    pub fn plan_ingest(&self, refs: Vec<ImageRef>) -> IngestPlan {
        let decoded = normalize(refs);
        let mut plan = IngestPlan::default();
        let mut capacity = MAX_IMAGES_PER_ITEM.saturating_sub(self.images.len());
        let mut sort_order = self.next_sort_order();

        let mut fresh = Vec::new();
        for image in decoded {
            if self.contains_url(&image.url) {
                plan.skipped_existing += 1;
            } else if capacity == 0 {
                plan.dropped_over_capacity += 1;
            } else {
                capacity -= 1;
                fresh.push(image);
            }
        }

        let needs_main = self.main().is_none();
        let main_index = fresh.iter().position(|image| image.is_main).unwrap_or(0);

        for (index, image) in fresh.into_iter().enumerate() {
            plan.pending.push(PendingImage {
                url: image.url,
                is_main: needs_main && index == main_index,
                sort_order,
            });
            sort_order = sort_order.saturating_add(1);
        }
        plan
    }

    /// Record a newly persisted image.
    pub fn insert(&mut self, record: ImageRecord) {
        if record.owner != self.owner {
            return;
        }
        if record.is_main {
            for image in &mut self.images {
                image.is_main = false;
            }
        }
        self.images.push(record);
        self.images.sort_by_key(|image| image.sort_order);
    }

    /// Make `id` the only main image.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::NotFound`] if `id` is not in this set.
    pub fn set_main(&mut self, id: ImageId) -> Result<(), ImageError> {
        if self.get(id).is_none() {
            return Err(ImageError::NotFound(id));
        }
        for image in &mut self.images {
            image.is_main = image.id == id;
        }
        Ok(())
    }

    /// Remove `id`, promoting and renumbering the siblings.
    ///
    /// If the removed image was main, the sibling with the lowest
    /// `sort_order` becomes main. Remaining siblings are renumbered from 0 so
    /// the sequence has no gaps.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::NotFound`] if `id` is not in this set.
    pub fn remove(&mut self, id: ImageId) -> Result<Removal, ImageError> {
        let position = self
            .images
            .iter()
            .position(|image| image.id == id)
            .ok_or(ImageError::NotFound(id))?;
        let removed = self.images.remove(position);

        let mut promoted = None;
        if removed.is_main {
            if let Some(first) = self.images.first_mut() {
                first.is_main = true;
                promoted = Some(first.id);
            }
        }

        let mut renumbered = Vec::new();
        for (sort_order, image) in (0..).zip(self.images.iter_mut()) {
            if image.sort_order != sort_order {
                image.sort_order = sort_order;
                renumbered.push((image.id, sort_order));
            }
        }

        Ok(Removal {
            removed,
            promoted,
            renumbered,
        })
    }

    /// Urls of this set, for reference counting shared files.
    #[must_use]
    pub fn urls(&self) -> HashSet<&str> {
        self.images.iter().map(|image| image.url.as_str()).collect()
    }
}
