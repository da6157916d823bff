use crate::models::db_operations::{decode, encode, page_slice, DbError, DbResult};
use crate::models::{
    CategoryImageRef, CategorySettings, ImageCategory, ImageCategoryPatch, LayoutMode, NewImageCategory, ObjectId,
    NEXUS_CATEGORY_ID, NEXUS_CATEGORY_NAME,
};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

pub const IMAGE_CATEGORIES: TableDefinition<&str, &str> = TableDefinition::new("image_categories");

// ====================================================================
// ===================== TRANSACTION-LEVEL HELPERS ====================
// ====================================================================

pub(crate) fn load_in(txn: &WriteTransaction, id: &str) -> DbResult<Option<ImageCategory>> {
    let table = txn.open_table(IMAGE_CATEGORIES)?;
    let raw = table.get(id)?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

pub(crate) fn store_in(txn: &WriteTransaction, category: &ImageCategory) -> DbResult<()> {
    let json = encode(category)?;
    let mut table = txn.open_table(IMAGE_CATEGORIES)?;
    table.insert(category.id.as_str(), json.as_str())?;
    Ok(())
}

fn require_in(txn: &WriteTransaction, id: &str) -> DbResult<ImageCategory> {
    load_in(txn, id)?.ok_or_else(|| DbError::NotFound(format!("image category '{}'", id)))
}

/// Appends `image_id` to the category's image list.
/// A `sort_order` of 0 means "place after the current last image".
pub(crate) fn add_image_in(
    txn: &WriteTransaction,
    category_id: &str,
    image_id: ObjectId,
    sort_order: i64,
) -> DbResult<(CategoryImageRef, String)> {
    let mut category = require_in(txn, category_id)?;
    if category.images.iter().any(|r| r.image_id == image_id) {
        return Err(DbError::Conflict(format!("image {} is already in category '{}'", image_id, category_id)));
    }

    let sort_order = if sort_order == 0 {
        category.images.iter().map(|r| r.sort_order).max().unwrap_or(0) + 1
    } else {
        sort_order
    };

    let now = Utc::now();
    let image_ref = CategoryImageRef { image_id, sort_order, added_at: now };
    category.images.push(image_ref.clone());
    category.image_count = category.images.len() as i64;
    category.updated_at = now;
    store_in(txn, &category)?;
    Ok((image_ref, category.name))
}

pub(crate) fn remove_image_in(txn: &WriteTransaction, category_id: &str, image_id: ObjectId) -> DbResult<()> {
    let mut category = require_in(txn, category_id)?;
    let before = category.images.len();
    category.images.retain(|r| r.image_id != image_id);
    if category.images.len() == before {
        return Err(DbError::NotMember(format!("image {} is not in category '{}'", image_id, category_id)));
    }
    if category.cover_image == Some(image_id) {
        category.cover_image = None;
    }
    category.image_count = category.images.len() as i64;
    category.updated_at = Utc::now();
    store_in(txn, &category)
}

// ====================================================================
// ========================= CATEGORY CRUD ============================
// ====================================================================

pub fn create_category(db: &Database, input: NewImageCategory) -> DbResult<ImageCategory> {
    let id = input.id.trim().to_string();
    if id.is_empty() {
        return Err(DbError::Validation("category id must not be empty".to_string()));
    }
    if input.name.trim().is_empty() {
        return Err(DbError::Validation("category name must not be empty".to_string()));
    }

    let now = Utc::now();
    let category = ImageCategory {
        id: id.clone(),
        name: input.name.trim().to_string(),
        description: input.description,
        image_count: 0,
        cover_image: None,
        settings: input.settings.resolve(),
        images: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let write_txn = db.begin_write()?;
    {
        if load_in(&write_txn, &id)?.is_some() {
            return Err(DbError::Conflict(format!("image category '{}' already exists", id)));
        }
        store_in(&write_txn, &category)?;
    }
    write_txn.commit()?;
    Ok(category)
}

pub fn read_category(db: &Database, id: &str) -> DbResult<Option<ImageCategory>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(IMAGE_CATEGORIES)?;
    let raw = table.get(id)?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

pub fn get_category(db: &Database, id: &str) -> DbResult<ImageCategory> {
    read_category(db, id)?.ok_or_else(|| DbError::NotFound(format!("image category '{}'", id)))
}

pub fn update_category(db: &Database, id: &str, patch: ImageCategoryPatch) -> DbResult<ImageCategory> {
    let write_txn = db.begin_write()?;
    let category = {
        let mut category = require_in(&write_txn, id)?;
        if let Some(name) = patch.name.filter(|n| !n.trim().is_empty()) {
            category.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            category.description = description;
        }
        if let Some(settings) = patch.settings {
            settings.apply_to(&mut category.settings);
        }
        category.updated_at = Utc::now();
        store_in(&write_txn, &category)?;
        category
    };
    write_txn.commit()?;
    Ok(category)
}

pub fn update_layout_mode(db: &Database, id: &str, layout_mode: LayoutMode) -> DbResult<ImageCategory> {
    let write_txn = db.begin_write()?;
    let category = {
        let mut category = require_in(&write_txn, id)?;
        category.settings.layout_mode = layout_mode;
        category.updated_at = Utc::now();
        store_in(&write_txn, &category)?;
        category
    };
    write_txn.commit()?;
    Ok(category)
}

/// The cover must be one of the category's own images.
pub fn set_cover(db: &Database, id: &str, image_id: ObjectId) -> DbResult<ImageCategory> {
    let write_txn = db.begin_write()?;
    let category = {
        let mut category = require_in(&write_txn, id)?;
        if !category.images.iter().any(|r| r.image_id == image_id) {
            return Err(DbError::NotMember(format!("image {} is not in category '{}'", image_id, id)));
        }
        category.cover_image = Some(image_id);
        category.updated_at = Utc::now();
        store_in(&write_txn, &category)?;
        category
    };
    write_txn.commit()?;
    Ok(category)
}

/// Refuses to delete a category that still lists images.
pub fn delete_category(db: &Database, id: &str) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    {
        let category = require_in(&write_txn, id)?;
        if category.image_count > 0 {
            return Err(DbError::NotEmpty(format!(
                "image category '{}' still holds {} images",
                id, category.image_count
            )));
        }
        let mut table = write_txn.open_table(IMAGE_CATEGORIES)?;
        table.remove(id)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn list_categories(db: &Database) -> DbResult<Vec<ImageCategory>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(IMAGE_CATEGORIES)?;
    let mut categories = Vec::new();
    for item in table.iter()? {
        let (_key, value) = item?;
        categories.push(decode::<ImageCategory>(value.value())?);
    }
    categories.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(categories)
}

// ====================================================================
// ===================== INVERTED INDEX OPERATIONS ====================
// ====================================================================

/// Adds the image to the category list only. The image's own position map is untouched.
pub fn add_image(db: &Database, category_id: &str, image_id: ObjectId, sort_order: i64) -> DbResult<CategoryImageRef> {
    let write_txn = db.begin_write()?;
    let (image_ref, _) = add_image_in(&write_txn, category_id, image_id, sort_order)?;
    write_txn.commit()?;
    Ok(image_ref)
}

pub fn remove_image(db: &Database, category_id: &str, image_id: ObjectId) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    remove_image_in(&write_txn, category_id, image_id)?;
    write_txn.commit()?;
    Ok(())
}

/// Images of a category ordered by sort order, plus the category's image count.
pub fn get_category_images(
    db: &Database,
    category_id: &str,
    page: i64,
    page_size: i64,
) -> DbResult<(Vec<CategoryImageRef>, i64)> {
    let category = get_category(db, category_id)?;
    let mut refs = category.images;
    refs.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.added_at.cmp(&b.added_at)));
    Ok((page_slice(&refs, page, page_size), category.image_count))
}

pub fn update_sort_order(db: &Database, category_id: &str, image_id: ObjectId, sort_order: i64) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    {
        let mut category = require_in(&write_txn, category_id)?;
        let image_ref = category
            .images
            .iter_mut()
            .find(|r| r.image_id == image_id)
            .ok_or_else(|| DbError::NotMember(format!("image {} is not in category '{}'", image_id, category_id)))?;
        image_ref.sort_order = sort_order;
        category.updated_at = Utc::now();
        store_in(&write_txn, &category)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn is_image_in_category(db: &Database, category_id: &str, image_id: ObjectId) -> DbResult<bool> {
    Ok(read_category(db, category_id)?
        .map(|c| c.images.iter().any(|r| r.image_id == image_id))
        .unwrap_or(false))
}

/// Creates the `nexus` category when it is missing. Returns whether it was created.
pub fn ensure_default_categories(db: &Database) -> DbResult<bool> {
    let write_txn = db.begin_write()?;
    let created = {
        if load_in(&write_txn, NEXUS_CATEGORY_ID)?.is_some() {
            false
        } else {
            let now = Utc::now();
            let nexus = ImageCategory {
                id: NEXUS_CATEGORY_ID.to_string(),
                name: NEXUS_CATEGORY_NAME.to_string(),
                description: "default category, all images initially belong".to_string(),
                image_count: 0,
                cover_image: None,
                settings: CategorySettings::default(),
                images: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            store_in(&write_txn, &nexus)?;
            true
        }
    };
    write_txn.commit()?;
    if created {
        log::info!("Created default image category '{}'", NEXUS_CATEGORY_ID);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::temp_db;
    use crate::models::CategorySettingsPatch;

    fn new_category(id: &str) -> NewImageCategory {
        NewImageCategory {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: String::new(),
            settings: CategorySettingsPatch::default(),
        }
    }

    #[test]
    fn create_applies_defaults_and_rejects_duplicates() {
        let (_dir, db) = temp_db();
        let created = create_category(&db, new_category("stillness")).unwrap();
        assert_eq!(created.settings, CategorySettings::default());
        assert_eq!(created.image_count, 0);

        let err = create_category(&db, new_category("stillness")).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn count_tracks_adds_and_removes() {
        let (_dir, db) = temp_db();
        create_category(&db, new_category("walls")).unwrap();
        let ids: Vec<ObjectId> = (0..5).map(|_| ObjectId::new()).collect();
        for id in &ids {
            add_image(&db, "walls", *id, 0).unwrap();
        }
        remove_image(&db, "walls", ids[1]).unwrap();
        remove_image(&db, "walls", ids[3]).unwrap();

        let category = get_category(&db, "walls").unwrap();
        assert_eq!(category.image_count, 3);
        assert_eq!(category.images.len(), 3);
    }

    #[test]
    fn duplicate_add_fails_and_leaves_state_unchanged() {
        let (_dir, db) = temp_db();
        create_category(&db, new_category("walls")).unwrap();
        let id = ObjectId::new();
        add_image(&db, "walls", id, 0).unwrap();
        let before = get_category(&db, "walls").unwrap();

        let err = add_image(&db, "walls", id, 0).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(get_category(&db, "walls").unwrap(), before);
    }

    #[test]
    fn removing_a_non_member_is_reported() {
        let (_dir, db) = temp_db();
        create_category(&db, new_category("walls")).unwrap();
        let err = remove_image(&db, "walls", ObjectId::new()).unwrap_err();
        assert!(matches!(err, DbError::NotMember(_)));
    }

    #[test]
    fn delete_blocked_until_empty() {
        let (_dir, db) = temp_db();
        create_category(&db, new_category("walls")).unwrap();
        let id = ObjectId::new();
        add_image(&db, "walls", id, 0).unwrap();

        assert!(matches!(delete_category(&db, "walls").unwrap_err(), DbError::NotEmpty(_)));
        remove_image(&db, "walls", id).unwrap();
        delete_category(&db, "walls").unwrap();
        assert!(read_category(&db, "walls").unwrap().is_none());
    }

    #[test]
    fn first_image_in_nexus_gets_sort_order_one() {
        let (_dir, db) = temp_db();
        let image_ref = add_image(&db, NEXUS_CATEGORY_ID, ObjectId::new(), 0).unwrap();
        assert_eq!(image_ref.sort_order, 1);
        let second = add_image(&db, NEXUS_CATEGORY_ID, ObjectId::new(), 0).unwrap();
        assert_eq!(second.sort_order, 2);
        assert_eq!(get_category(&db, NEXUS_CATEGORY_ID).unwrap().image_count, 2);
    }

    #[test]
    fn ensure_default_categories_is_idempotent() {
        let (_dir, db) = temp_db();
        // setup already created it
        assert!(!ensure_default_categories(&db).unwrap());
        let nexus = get_category(&db, NEXUS_CATEGORY_ID).unwrap();
        assert_eq!(nexus.name, "Nexus");
        assert_eq!(nexus.settings.grid_size, 10);
    }

    #[test]
    fn images_are_listed_by_sort_order_and_paged() {
        let (_dir, db) = temp_db();
        create_category(&db, new_category("walls")).unwrap();
        let a = ObjectId::new();
        let b = ObjectId::new();
        let c = ObjectId::new();
        add_image(&db, "walls", a, 30).unwrap();
        add_image(&db, "walls", b, 10).unwrap();
        add_image(&db, "walls", c, 20).unwrap();

        let (all, total) = get_category_images(&db, "walls", 0, 0).unwrap();
        assert_eq!(total, 3);
        assert_eq!(all.iter().map(|r| r.image_id).collect::<Vec<_>>(), vec![b, c, a]);

        let (page_two, _) = get_category_images(&db, "walls", 2, 2).unwrap();
        assert_eq!(page_two.len(), 1);
        assert_eq!(page_two[0].image_id, a);

        update_sort_order(&db, "walls", a, 1).unwrap();
        let (reordered, _) = get_category_images(&db, "walls", 1, 1).unwrap();
        assert_eq!(reordered[0].image_id, a);
    }

    #[test]
    fn cover_must_be_a_member() {
        let (_dir, db) = temp_db();
        create_category(&db, new_category("walls")).unwrap();
        let member = ObjectId::new();
        add_image(&db, "walls", member, 0).unwrap();

        assert!(matches!(set_cover(&db, "walls", ObjectId::new()).unwrap_err(), DbError::NotMember(_)));
        let category = set_cover(&db, "walls", member).unwrap();
        assert_eq!(category.cover_image, Some(member));
    }
}
