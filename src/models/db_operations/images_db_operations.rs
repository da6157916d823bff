use crate::models::db_operations::{
    albums_db_operations, decode, encode, image_categories_db_operations as categories, newest_first, page_slice,
    tags_db_operations as tags, DbError, DbResult, ID_MAX, ID_MIN,
};
use crate::models::{CategoryPosition, Image, ObjectId, Tag, DEFAULT_CATEGORY_HEIGHT, DEFAULT_CATEGORY_WIDTH};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use regex::RegexBuilder;

pub const IMAGES: TableDefinition<&[u8; 12], &str> = TableDefinition::new("images");
pub const IMAGE_URL_UNIQUE: TableDefinition<&str, &[u8; 12]> = TableDefinition::new("image_url_unique");
pub const IMAGE_TAG_INDEX: TableDefinition<(&str, i64, &[u8; 12]), ()> = TableDefinition::new("image_tag_index");
pub const IMAGE_UPLOADED_INDEX: TableDefinition<(i64, &[u8; 12]), ()> = TableDefinition::new("image_uploaded_index");

fn normalized_tags(image_tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> =
        image_tags.iter().map(|t| Tag::normalize_id(t)).filter(|t| !t.is_empty()).collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

fn index_tags_in(txn: &WriteTransaction, image: &Image, image_tags: &[String]) -> DbResult<()> {
    let mut tag_index = txn.open_table(IMAGE_TAG_INDEX)?;
    let uploaded = newest_first(image.uploaded_at);
    for tag in normalized_tags(image_tags) {
        tag_index.insert((tag.as_str(), uploaded, image.id.bytes()), ())?;
    }
    Ok(())
}

fn unindex_tags_in(txn: &WriteTransaction, image: &Image, image_tags: &[String]) -> DbResult<()> {
    let mut tag_index = txn.open_table(IMAGE_TAG_INDEX)?;
    let uploaded = newest_first(image.uploaded_at);
    for tag in normalized_tags(image_tags) {
        tag_index.remove((tag.as_str(), uploaded, image.id.bytes()))?;
    }
    Ok(())
}

fn index_image_in(txn: &WriteTransaction, image: &Image) -> DbResult<()> {
    txn.open_table(IMAGE_URL_UNIQUE)?.insert(image.cos_url.as_str(), image.id.bytes())?;
    txn.open_table(IMAGE_UPLOADED_INDEX)?.insert((newest_first(image.uploaded_at), image.id.bytes()), ())?;
    index_tags_in(txn, image, &image.tags)
}

fn unindex_image_in(txn: &WriteTransaction, image: &Image) -> DbResult<()> {
    txn.open_table(IMAGE_URL_UNIQUE)?.remove(image.cos_url.as_str())?;
    txn.open_table(IMAGE_UPLOADED_INDEX)?.remove((newest_first(image.uploaded_at), image.id.bytes()))?;
    unindex_tags_in(txn, image, &image.tags)
}

fn load_in(txn: &WriteTransaction, id: ObjectId) -> DbResult<Option<Image>> {
    let table = txn.open_table(IMAGES)?;
    let raw = table.get(id.bytes())?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

fn require_in(txn: &WriteTransaction, id: ObjectId) -> DbResult<Image> {
    load_in(txn, id)?.ok_or_else(|| DbError::NotFound(format!("image {}", id)))
}

fn store_in(txn: &WriteTransaction, image: &Image) -> DbResult<()> {
    let json = encode(image)?;
    txn.open_table(IMAGES)?.insert(image.id.bytes(), json.as_str())?;
    Ok(())
}

pub(crate) fn rebuild_indexes_in(txn: &WriteTransaction) -> DbResult<usize> {
    txn.delete_table(IMAGE_URL_UNIQUE)?;
    txn.delete_table(IMAGE_TAG_INDEX)?;
    txn.delete_table(IMAGE_UPLOADED_INDEX)?;

    let images: Vec<Image> = {
        let table = txn.open_table(IMAGES)?;
        let mut images = Vec::new();
        for item in table.iter()? {
            let (_key, value) = item?;
            images.push(decode(value.value())?);
        }
        images
    };
    for image in &images {
        index_image_in(txn, image)?;
    }
    Ok(images.len())
}

// ====================================================================
// ============================ IMAGE CRUD ============================
// ====================================================================

/// Stores a new image document. The storage URL and the id must both be unused.
pub fn insert_image(db: &Database, image: &Image) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    {
        let url_taken = write_txn.open_table(IMAGE_URL_UNIQUE)?.get(image.cos_url.as_str())?.is_some();
        if url_taken {
            return Err(DbError::Conflict(format!("storage url '{}' is already registered", image.cos_url)));
        }
        if load_in(&write_txn, image.id)?.is_some() {
            return Err(DbError::Conflict(format!("image {} already exists", image.id)));
        }
        store_in(&write_txn, image)?;
        index_image_in(&write_txn, image)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn read_image(db: &Database, id: ObjectId) -> DbResult<Option<Image>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(IMAGES)?;
    let raw = table.get(id.bytes())?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

pub fn get_image(db: &Database, id: ObjectId) -> DbResult<Image> {
    read_image(db, id)?.ok_or_else(|| DbError::NotFound(format!("image {}", id)))
}

fn load_many(db: &Database, ids: &[[u8; 12]]) -> DbResult<Vec<Image>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(IMAGES)?;
    let mut images = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(guard) = table.get(id)? {
            images.push(decode::<Image>(guard.value())?);
        }
    }
    Ok(images)
}

/// Newest uploads first, with the total number of images.
pub fn list_images(db: &Database, limit: usize, offset: usize) -> DbResult<(Vec<Image>, i64)> {
    let (ids, total) = {
        let read_txn = db.begin_read()?;
        let uploaded_index = read_txn.open_table(IMAGE_UPLOADED_INDEX)?;
        let total = uploaded_index.len()? as i64;
        let mut ids = Vec::new();
        for item in uploaded_index.iter()?.skip(offset).take(limit) {
            let (key, _) = item?;
            ids.push(*key.value().1);
        }
        (ids, total)
    };
    Ok((load_many(db, &ids)?, total))
}

pub fn find_images_by_tag(db: &Database, tag: &str) -> DbResult<Vec<Image>> {
    let tag = Tag::normalize_id(tag);
    let ids = {
        let read_txn = db.begin_read()?;
        let tag_index = read_txn.open_table(IMAGE_TAG_INDEX)?;
        let mut ids = Vec::new();
        for item in tag_index.range((tag.as_str(), i64::MIN, &ID_MIN)..=(tag.as_str(), i64::MAX, &ID_MAX))? {
            let (key, _) = item?;
            ids.push(*key.value().2);
        }
        ids
    };
    load_many(db, &ids)
}

/// Case-insensitive substring match on the image name, newest first.
pub fn search_images_by_name(db: &Database, keyword: &str) -> DbResult<Vec<Image>> {
    let pattern = RegexBuilder::new(&regex::escape(keyword.trim()))
        .case_insensitive(true)
        .build()
        .map_err(|e| DbError::Validation(e.to_string()))?;

    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(IMAGES)?;
    let mut images = Vec::new();
    for item in table.iter()? {
        let (_key, value) = item?;
        let image: Image = decode(value.value())?;
        if pattern.is_match(&image.name) {
            images.push(image);
        }
    }
    images.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    Ok(images)
}

/// Replaces the image's tag list and returns the previous one.
/// Tag documents are not touched here; see `tag_helpers::sync_image_tags`.
pub fn set_tags(db: &Database, id: ObjectId, new_tags: Vec<String>) -> DbResult<Vec<String>> {
    let write_txn = db.begin_write()?;
    let old_tags = {
        let mut image = require_in(&write_txn, id)?;
        let old_tags = std::mem::replace(&mut image.tags, new_tags);
        unindex_tags_in(&write_txn, &image, &old_tags)?;
        index_tags_in(&write_txn, &image, &image.tags)?;
        store_in(&write_txn, &image)?;
        old_tags
    };
    write_txn.commit()?;
    Ok(old_tags)
}

/// Removes an image and pulls it out of every category, tag and album that lists it.
/// Returns the removed document so the caller can delete the stored objects.
pub fn delete_image(db: &Database, id: ObjectId) -> DbResult<Image> {
    let write_txn = db.begin_write()?;
    let image = {
        let image = require_in(&write_txn, id)?;
        for category_id in image.positions.keys() {
            match categories::remove_image_in(&write_txn, category_id, id) {
                Ok(()) => {}
                Err(DbError::NotFound(_)) | Err(DbError::NotMember(_)) => {
                    log::debug!("Image {} had a stale position for category '{}'", id, category_id);
                }
                Err(e) => return Err(e),
            }
        }
        for tag_id in normalized_tags(&image.tags) {
            match tags::remove_image_in(&write_txn, &tag_id, id) {
                Ok(()) => {}
                Err(DbError::NotFound(_)) | Err(DbError::NotMember(_)) => {
                    log::debug!("Image {} was not listed by tag '{}'", id, tag_id);
                }
                Err(e) => return Err(e),
            }
        }
        albums_db_operations::pull_image_everywhere_in(&write_txn, id)?;
        unindex_image_in(&write_txn, &image)?;
        write_txn.open_table(IMAGES)?.remove(id.bytes())?;
        image
    };
    write_txn.commit()?;
    Ok(image)
}

// ====================================================================
// ======================= CATEGORY PLACEMENT =========================
// ====================================================================

/// Adds the image to the category list and records its position on the image, in one transaction.
/// Without an explicit position an existing one is kept, otherwise a default one is created.
/// The stored position always carries the category's name and the list's sort order.
pub fn place_in_category(
    db: &Database,
    category_id: &str,
    image_id: ObjectId,
    position: Option<CategoryPosition>,
    sort_order: i64,
) -> DbResult<CategoryPosition> {
    let write_txn = db.begin_write()?;
    let placed = {
        let mut image = require_in(&write_txn, image_id)?;
        let (image_ref, category_name) = categories::add_image_in(&write_txn, category_id, image_id, sort_order)?;

        let mut placed = match (position, image.positions.remove(category_id)) {
            (Some(given), _) => given,
            (None, Some(existing)) => existing,
            (None, None) => CategoryPosition::new(DEFAULT_CATEGORY_WIDTH, DEFAULT_CATEGORY_HEIGHT),
        };
        placed.category_name = category_name;
        placed.sort_order = image_ref.sort_order;
        placed.added_at = image_ref.added_at;
        placed.updated_at = image_ref.added_at;
        if placed.version < 1 {
            placed.version = 1;
        }
        image.positions.insert(category_id.to_string(), placed.clone());
        store_in(&write_txn, &image)?;
        placed
    };
    write_txn.commit()?;
    Ok(placed)
}

/// Overwrites the layout of an existing placement. The category name, the time the
/// image was added and the sort order are preserved; the version is bumped.
pub fn update_position(
    db: &Database,
    image_id: ObjectId,
    category_id: &str,
    position: CategoryPosition,
) -> DbResult<CategoryPosition> {
    let write_txn = db.begin_write()?;
    let updated = {
        let mut image = require_in(&write_txn, image_id)?;
        let current = image
            .positions
            .get(category_id)
            .ok_or_else(|| DbError::NotMember(format!("image {} has no position in '{}'", image_id, category_id)))?;

        let mut updated = position;
        updated.category_name = current.category_name.clone();
        updated.added_at = current.added_at;
        updated.sort_order = current.sort_order;
        updated.version = current.version + 1;
        updated.updated_at = Utc::now();
        image.positions.insert(category_id.to_string(), updated.clone());
        store_in(&write_txn, &image)?;
        updated
    };
    write_txn.commit()?;
    Ok(updated)
}

/// Drops the image's position and removes it from the category list, in one transaction.
pub fn remove_from_category(db: &Database, category_id: &str, image_id: ObjectId) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    {
        categories::remove_image_in(&write_txn, category_id, image_id)?;
        if let Some(mut image) = load_in(&write_txn, image_id)? {
            image.positions.remove(category_id);
            store_in(&write_txn, &image)?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

/// Images of a category in sort order. References to deleted images are skipped.
pub fn get_images_by_category(
    db: &Database,
    category_id: &str,
    page: i64,
    page_size: i64,
) -> DbResult<(Vec<Image>, i64)> {
    let category = categories::get_category(db, category_id)?;
    let mut refs = category.images;
    refs.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.added_at.cmp(&b.added_at)));
    let ids: Vec<[u8; 12]> = page_slice(&refs, page, page_size).iter().map(|r| *r.image_id.bytes()).collect();
    let images = load_many(db, &ids)?;
    if images.len() < ids.len() {
        log::warn!("Category '{}' lists {} missing images", category_id, ids.len() - images.len());
    }
    Ok((images, category.image_count))
}
