use crate::models::db_operations::{decode, encode, page_slice, DbError, DbResult};
use crate::models::{NewTag, ObjectId, Tag, TagImageRef, TagPatch};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use regex::RegexBuilder;

pub const TAGS: TableDefinition<&str, &str> = TableDefinition::new("tags");

pub const DEFAULT_POPULAR_LIMIT: usize = 20;
pub const SEARCH_LIMIT: usize = 50;

pub(crate) fn load_in(txn: &WriteTransaction, id: &str) -> DbResult<Option<Tag>> {
    let table = txn.open_table(TAGS)?;
    let raw = table.get(id)?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

pub(crate) fn store_in(txn: &WriteTransaction, tag: &Tag) -> DbResult<()> {
    let json = encode(tag)?;
    let mut table = txn.open_table(TAGS)?;
    table.insert(tag.id.as_str(), json.as_str())?;
    Ok(())
}

fn build_tag(input: NewTag) -> DbResult<Tag> {
    let id = Tag::normalize_id(&input.name);
    if id.is_empty() {
        return Err(DbError::Validation("tag name must not be empty".to_string()));
    }
    let name = input.name.trim().to_string();
    let display_name = if input.display_name.trim().is_empty() { name.clone() } else { input.display_name };
    let now = Utc::now();
    Ok(Tag {
        id,
        name,
        display_name,
        description: input.description,
        image_count: 0,
        color: input.color,
        category: input.category,
        images: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn get_or_create_in(
    txn: &WriteTransaction,
    name: &str,
    display_name: &str,
    category: &str,
) -> DbResult<Tag> {
    let id = Tag::normalize_id(name);
    if let Some(existing) = load_in(txn, &id)? {
        return Ok(existing);
    }
    let tag = build_tag(NewTag {
        name: name.to_string(),
        display_name: display_name.to_string(),
        category: category.to_string(),
        ..NewTag::default()
    })?;
    store_in(txn, &tag)?;
    Ok(tag)
}

pub(crate) fn add_image_in(txn: &WriteTransaction, tag_id: &str, image_id: ObjectId, image_name: &str) -> DbResult<()> {
    let mut tag = load_in(txn, tag_id)?.ok_or_else(|| DbError::NotFound(format!("tag '{}'", tag_id)))?;
    if tag.images.iter().any(|r| r.image_id == image_id) {
        return Err(DbError::Conflict(format!("image {} already carries tag '{}'", image_id, tag_id)));
    }
    let now = Utc::now();
    tag.images.push(TagImageRef { image_id, image_name: image_name.to_string(), added_at: now });
    tag.image_count = tag.images.len() as i64;
    tag.updated_at = now;
    store_in(txn, &tag)
}

pub(crate) fn remove_image_in(txn: &WriteTransaction, tag_id: &str, image_id: ObjectId) -> DbResult<()> {
    let mut tag = load_in(txn, tag_id)?.ok_or_else(|| DbError::NotFound(format!("tag '{}'", tag_id)))?;
    let before = tag.images.len();
    tag.images.retain(|r| r.image_id != image_id);
    if tag.images.len() == before {
        return Err(DbError::NotMember(format!("image {} does not carry tag '{}'", image_id, tag_id)));
    }
    tag.image_count = tag.images.len() as i64;
    tag.updated_at = Utc::now();
    store_in(txn, &tag)
}

pub fn create_tag(db: &Database, input: NewTag) -> DbResult<Tag> {
    let tag = build_tag(input)?;
    let write_txn = db.begin_write()?;
    {
        if load_in(&write_txn, &tag.id)?.is_some() {
            return Err(DbError::Conflict(format!("tag '{}' already exists", tag.id)));
        }
        store_in(&write_txn, &tag)?;
    }
    write_txn.commit()?;
    Ok(tag)
}

/// Lookups by id accept any casing and surrounding whitespace, like the name the id came from.
pub fn read_tag(db: &Database, id: &str) -> DbResult<Option<Tag>> {
    let id = Tag::normalize_id(id);
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TAGS)?;
    let raw = table.get(id.as_str())?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

pub fn get_tag(db: &Database, id: &str) -> DbResult<Tag> {
    read_tag(db, id)?.ok_or_else(|| DbError::NotFound(format!("tag '{}'", id)))
}

pub fn get_tag_by_name(db: &Database, name: &str) -> DbResult<Tag> {
    get_tag(db, &Tag::normalize_id(name))
}

pub fn update_tag(db: &Database, id: &str, patch: TagPatch) -> DbResult<Tag> {
    let id = Tag::normalize_id(id);
    let id = id.as_str();
    let write_txn = db.begin_write()?;
    let tag = {
        let mut tag = load_in(&write_txn, id)?.ok_or_else(|| DbError::NotFound(format!("tag '{}'", id)))?;
        if let Some(display_name) = patch.display_name.filter(|d| !d.trim().is_empty()) {
            tag.display_name = display_name;
        }
        if let Some(description) = patch.description {
            tag.description = description;
        }
        if let Some(color) = patch.color {
            tag.color = color;
        }
        if let Some(category) = patch.category {
            tag.category = category;
        }
        tag.updated_at = Utc::now();
        store_in(&write_txn, &tag)?;
        tag
    };
    write_txn.commit()?;
    Ok(tag)
}

/// Refuses to delete a tag that still references images.
pub fn delete_tag(db: &Database, id: &str) -> DbResult<()> {
    let id = Tag::normalize_id(id);
    let id = id.as_str();
    let write_txn = db.begin_write()?;
    {
        let tag = load_in(&write_txn, id)?.ok_or_else(|| DbError::NotFound(format!("tag '{}'", id)))?;
        if tag.image_count > 0 {
            return Err(DbError::NotEmpty(format!("tag '{}' is used by {} images", id, tag.image_count)));
        }
        let mut table = write_txn.open_table(TAGS)?;
        table.remove(id)?;
    }
    write_txn.commit()?;
    Ok(())
}

fn all_tags(db: &Database) -> DbResult<Vec<Tag>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TAGS)?;
    let mut tags = Vec::new();
    for item in table.iter()? {
        let (_key, value) = item?;
        tags.push(decode::<Tag>(value.value())?);
    }
    Ok(tags)
}

/// Tags sorted by name, optionally restricted to one tag category.
pub fn list_tags(db: &Database, category: Option<&str>) -> DbResult<Vec<Tag>> {
    let mut tags: Vec<Tag> = all_tags(db)?
        .into_iter()
        .filter(|t| category.map_or(true, |c| t.category == c))
        .collect();
    tags.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tags)
}

pub fn get_tag_images(db: &Database, id: &str, page: i64, page_size: i64) -> DbResult<(Vec<TagImageRef>, i64)> {
    let tag = get_tag(db, id)?;
    Ok((page_slice(&tag.images, page, page_size), tag.image_count))
}

pub fn is_image_in_tag(db: &Database, id: &str, image_id: ObjectId) -> DbResult<bool> {
    Ok(read_tag(db, id)?
        .map(|t| t.images.iter().any(|r| r.image_id == image_id))
        .unwrap_or(false))
}

pub fn popular_tags(db: &Database, limit: usize, category: Option<&str>) -> DbResult<Vec<Tag>> {
    let limit = if limit == 0 { DEFAULT_POPULAR_LIMIT } else { limit };
    let mut tags: Vec<Tag> = all_tags(db)?
        .into_iter()
        .filter(|t| category.map_or(true, |c| t.category == c))
        .collect();
    tags.sort_by(|a, b| b.image_count.cmp(&a.image_count).then(a.name.cmp(&b.name)));
    tags.truncate(limit);
    Ok(tags)
}

/// Case-insensitive match on name or display name, most used first.
pub fn search_tags(db: &Database, keyword: &str) -> DbResult<Vec<Tag>> {
    let pattern = RegexBuilder::new(&regex::escape(keyword.trim()))
        .case_insensitive(true)
        .build()
        .map_err(|e| DbError::Validation(e.to_string()))?;
    let mut tags: Vec<Tag> = all_tags(db)?
        .into_iter()
        .filter(|t| pattern.is_match(&t.name) || pattern.is_match(&t.display_name))
        .collect();
    tags.sort_by(|a, b| b.image_count.cmp(&a.image_count).then(a.name.cmp(&b.name)));
    tags.truncate(SEARCH_LIMIT);
    Ok(tags)
}

pub fn get_or_create_tag(db: &Database, name: &str, display_name: &str, category: &str) -> DbResult<Tag> {
    let write_txn = db.begin_write()?;
    let tag = get_or_create_in(&write_txn, name, display_name, category)?;
    write_txn.commit()?;
    Ok(tag)
}

pub fn add_image_to_tag(db: &Database, tag_id: &str, image_id: ObjectId, image_name: &str) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    add_image_in(&write_txn, tag_id, image_id, image_name)?;
    write_txn.commit()?;
    Ok(())
}

pub fn remove_image_from_tag(db: &Database, tag_id: &str, image_id: ObjectId) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    remove_image_in(&write_txn, tag_id, image_id)?;
    write_txn.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::temp_db;

    fn tag_named(name: &str) -> NewTag {
        NewTag { name: name.to_string(), ..NewTag::default() }
    }

    #[test]
    fn id_is_normalized_and_display_name_defaults() {
        let (_dir, db) = temp_db();
        let tag = create_tag(&db, tag_named("  Sunset ")).unwrap();
        assert_eq!(tag.id, "sunset");
        assert_eq!(tag.display_name, "Sunset");
        assert!(matches!(create_tag(&db, tag_named("SUNSET")).unwrap_err(), DbError::Conflict(_)));
        assert_eq!(get_tag_by_name(&db, "sunSet").unwrap().id, "sunset");
    }

    #[test]
    fn lookups_by_id_ignore_case() {
        let (_dir, db) = temp_db();
        create_tag(&db, tag_named("sunset")).unwrap();
        let image = ObjectId::new();
        add_image_to_tag(&db, "sunset", image, "s.jpg").unwrap();

        assert_eq!(get_tag(&db, "Sunset").unwrap().id, "sunset");
        assert!(is_image_in_tag(&db, " SUNSET ", image).unwrap());
        assert_eq!(get_tag_images(&db, "SunSet", 1, 20).unwrap().1, 1);
        let patch = TagPatch { color: Some("#ff8800".to_string()), ..TagPatch::default() };
        assert_eq!(update_tag(&db, "SUNSET", patch).unwrap().color, "#ff8800");

        remove_image_from_tag(&db, "sunset", image).unwrap();
        delete_tag(&db, "Sunset").unwrap();
        assert!(read_tag(&db, "sunset").unwrap().is_none());
    }

    #[test]
    fn get_or_create_only_creates_once() {
        let (_dir, db) = temp_db();
        let first = get_or_create_tag(&db, "beach", "", "").unwrap();
        assert_eq!(first.image_count, 0);
        add_image_to_tag(&db, "beach", ObjectId::new(), "a.png").unwrap();
        let second = get_or_create_tag(&db, "Beach", "", "").unwrap();
        assert_eq!(second.image_count, 1);
    }

    #[test]
    fn membership_and_delete_rules() {
        let (_dir, db) = temp_db();
        create_tag(&db, tag_named("night")).unwrap();
        let image = ObjectId::new();
        add_image_to_tag(&db, "night", image, "n.jpg").unwrap();
        assert!(matches!(add_image_to_tag(&db, "night", image, "n.jpg").unwrap_err(), DbError::Conflict(_)));
        assert!(is_image_in_tag(&db, "night", image).unwrap());
        assert!(matches!(delete_tag(&db, "night").unwrap_err(), DbError::NotEmpty(_)));

        remove_image_from_tag(&db, "night", image).unwrap();
        assert!(matches!(
            remove_image_from_tag(&db, "night", image).unwrap_err(),
            DbError::NotMember(_)
        ));
        delete_tag(&db, "night").unwrap();
    }

    #[test]
    fn popular_and_search_sort_by_usage() {
        let (_dir, db) = temp_db();
        for name in ["sea", "seaside", "mountain"] {
            create_tag(&db, tag_named(name)).unwrap();
        }
        for _ in 0..3 {
            add_image_to_tag(&db, "seaside", ObjectId::new(), "x").unwrap();
        }
        add_image_to_tag(&db, "mountain", ObjectId::new(), "y").unwrap();

        let popular = popular_tags(&db, 2, None).unwrap();
        assert_eq!(popular.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["seaside", "mountain"]);

        let found = search_tags(&db, "SEA").unwrap();
        assert_eq!(found.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["seaside", "sea"]);
    }
}
