use crate::helper::text_helpers;
use crate::models::db_operations::{decode, encode, newest_first, DbError, DbResult, ID_MAX, ID_MIN};
use crate::models::{Album, AlbumImageRef, AlbumPatch, AlbumPosition, ObjectId, Visibility};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::Deserialize;
use std::collections::HashMap;

pub const ALBUMS: TableDefinition<&[u8; 12], &str> = TableDefinition::new("albums");
pub const ALBUM_CREATED_INDEX: TableDefinition<(i64, &[u8; 12]), ()> = TableDefinition::new("album_created_index");
pub const ALBUM_TEXT_INDEX: TableDefinition<(&str, &[u8; 12]), ()> = TableDefinition::new("album_text_index");
pub const ALBUM_AUTHOR_INDEX: TableDefinition<(&str, i64, &[u8; 12]), ()> = TableDefinition::new("album_author_index");
pub const ALBUM_TAG_INDEX: TableDefinition<(&str, i64, &[u8; 12]), ()> = TableDefinition::new("album_tag_index");
pub const ALBUM_VISIBILITY_INDEX: TableDefinition<(&str, i64, &[u8; 12]), ()> =
    TableDefinition::new("album_visibility_index");
pub const ALBUM_COVER_INDEX: TableDefinition<(&[u8; 12], &[u8; 12]), ()> = TableDefinition::new("album_cover_index");
pub const ALBUM_IMAGE_REF_INDEX: TableDefinition<(&[u8; 12], &[u8; 12]), ()> =
    TableDefinition::new("album_image_ref_index");

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NewAlbum {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub cover_image: Option<ObjectId>,
}

fn album_tokens(album: &Album) -> Vec<String> {
    text_helpers::unique_tokens(&format!("{} {}", album.title, album.description)).into_iter().collect()
}

fn normalized_tags(album: &Album) -> Vec<String> {
    let mut tags: Vec<String> = album.tags.iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
    tags.sort();
    tags.dedup();
    tags
}

// ====================================================================
// =========================== INDEXING ===============================
// ====================================================================

pub(crate) fn index_album(txn: &WriteTransaction, album: &Album) -> DbResult<()> {
    let id = album.id.bytes();
    let created = newest_first(album.created_at);

    txn.open_table(ALBUM_CREATED_INDEX)?.insert((created, id), ())?;
    {
        let mut text_index = txn.open_table(ALBUM_TEXT_INDEX)?;
        for token in album_tokens(album) {
            text_index.insert((token.as_str(), id), ())?;
        }
    }
    if !album.author.is_empty() {
        txn.open_table(ALBUM_AUTHOR_INDEX)?.insert((album.author.as_str(), created, id), ())?;
    }
    {
        let mut tag_index = txn.open_table(ALBUM_TAG_INDEX)?;
        for tag in normalized_tags(album) {
            tag_index.insert((tag.as_str(), created, id), ())?;
        }
    }
    txn.open_table(ALBUM_VISIBILITY_INDEX)?.insert((album.visibility.as_str(), created, id), ())?;
    if let Some(cover) = album.cover_image {
        txn.open_table(ALBUM_COVER_INDEX)?.insert((cover.bytes(), id), ())?;
    }
    {
        let mut ref_index = txn.open_table(ALBUM_IMAGE_REF_INDEX)?;
        for image_ref in &album.image_refs {
            ref_index.insert((image_ref.image_id.bytes(), id), ())?;
        }
    }
    Ok(())
}

pub(crate) fn unindex_album(txn: &WriteTransaction, album: &Album) -> DbResult<()> {
    let id = album.id.bytes();
    let created = newest_first(album.created_at);

    txn.open_table(ALBUM_CREATED_INDEX)?.remove((created, id))?;
    {
        let mut text_index = txn.open_table(ALBUM_TEXT_INDEX)?;
        for token in album_tokens(album) {
            text_index.remove((token.as_str(), id))?;
        }
    }
    if !album.author.is_empty() {
        txn.open_table(ALBUM_AUTHOR_INDEX)?.remove((album.author.as_str(), created, id))?;
    }
    {
        let mut tag_index = txn.open_table(ALBUM_TAG_INDEX)?;
        for tag in normalized_tags(album) {
            tag_index.remove((tag.as_str(), created, id))?;
        }
    }
    txn.open_table(ALBUM_VISIBILITY_INDEX)?.remove((album.visibility.as_str(), created, id))?;
    if let Some(cover) = album.cover_image {
        txn.open_table(ALBUM_COVER_INDEX)?.remove((cover.bytes(), id))?;
    }
    {
        let mut ref_index = txn.open_table(ALBUM_IMAGE_REF_INDEX)?;
        for image_ref in &album.image_refs {
            ref_index.remove((image_ref.image_id.bytes(), id))?;
        }
    }
    Ok(())
}

fn load_in(txn: &WriteTransaction, id: ObjectId) -> DbResult<Option<Album>> {
    let table = txn.open_table(ALBUMS)?;
    let raw = table.get(id.bytes())?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

fn require_in(txn: &WriteTransaction, id: ObjectId) -> DbResult<Album> {
    load_in(txn, id)?.ok_or_else(|| DbError::NotFound(format!("album {}", id)))
}

/// Replaces the stored album and its index entries.
fn replace_in(txn: &WriteTransaction, old: &Album, new: &Album) -> DbResult<()> {
    unindex_album(txn, old)?;
    let json = encode(new)?;
    txn.open_table(ALBUMS)?.insert(new.id.bytes(), json.as_str())?;
    index_album(txn, new)
}

/// Drops every index table and rebuilds it from the stored albums.
pub(crate) fn rebuild_indexes_in(txn: &WriteTransaction) -> DbResult<usize> {
    txn.delete_table(ALBUM_CREATED_INDEX)?;
    txn.delete_table(ALBUM_TEXT_INDEX)?;
    txn.delete_table(ALBUM_AUTHOR_INDEX)?;
    txn.delete_table(ALBUM_TAG_INDEX)?;
    txn.delete_table(ALBUM_VISIBILITY_INDEX)?;
    txn.delete_table(ALBUM_COVER_INDEX)?;
    txn.delete_table(ALBUM_IMAGE_REF_INDEX)?;

    let albums: Vec<Album> = {
        let table = txn.open_table(ALBUMS)?;
        let mut albums = Vec::new();
        for item in table.iter()? {
            let (_key, value) = item?;
            albums.push(decode(value.value())?);
        }
        albums
    };
    for album in &albums {
        index_album(txn, album)?;
    }
    Ok(albums.len())
}

// ====================================================================
// =========================== ALBUM CRUD =============================
// ====================================================================

pub fn create_album(db: &Database, input: NewAlbum) -> DbResult<Album> {
    if input.title.trim().is_empty() {
        return Err(DbError::Validation("album title must not be empty".to_string()));
    }
    let now = Utc::now();
    let album = Album {
        id: ObjectId::new(),
        title: input.title.trim().to_string(),
        description: input.description,
        cover_image: input.cover_image,
        created_at: now,
        updated_at: now,
        image_refs: Vec::new(),
        tags: input.tags,
        author: input.author,
        visibility: input.visibility.unwrap_or_default(),
    };
    let json = encode(&album)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(ALBUMS)?.insert(album.id.bytes(), json.as_str())?;
        index_album(&write_txn, &album)?;
    }
    write_txn.commit()?;
    Ok(album)
}

pub fn read_album(db: &Database, id: ObjectId) -> DbResult<Option<Album>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(ALBUMS)?;
    let raw = table.get(id.bytes())?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

pub fn get_album(db: &Database, id: ObjectId) -> DbResult<Album> {
    read_album(db, id)?.ok_or_else(|| DbError::NotFound(format!("album {}", id)))
}

pub fn update_album(db: &Database, id: ObjectId, patch: AlbumPatch) -> DbResult<Album> {
    let write_txn = db.begin_write()?;
    let updated = {
        let old = require_in(&write_txn, id)?;
        let mut album = old.clone();
        if let Some(title) = patch.title.filter(|t| !t.trim().is_empty()) {
            album.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            album.description = description;
        }
        if let Some(tags) = patch.tags {
            album.tags = tags;
        }
        if let Some(visibility) = patch.visibility {
            album.visibility = visibility;
        }
        if let Some(cover) = patch.cover_image {
            album.cover_image = Some(cover);
        }
        album.updated_at = Utc::now();
        replace_in(&write_txn, &old, &album)?;
        album
    };
    write_txn.commit()?;
    Ok(updated)
}

pub fn delete_album(db: &Database, id: ObjectId) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    {
        let album = require_in(&write_txn, id)?;
        unindex_album(&write_txn, &album)?;
        write_txn.open_table(ALBUMS)?.remove(id.bytes())?;
    }
    write_txn.commit()?;
    Ok(())
}

// ====================================================================
// ========================= IMAGE REFERENCES =========================
// ====================================================================

fn upsert_ref(album: &mut Album, image_ref: AlbumImageRef) {
    match album.image_refs.iter_mut().find(|r| r.image_id == image_ref.image_id) {
        Some(existing) => *existing = image_ref,
        None => album.image_refs.push(image_ref),
    }
}

/// Updates the reference for the same image in place, or appends it.
pub fn add_or_update_image_ref(db: &Database, album_id: ObjectId, image_ref: AlbumImageRef) -> DbResult<Album> {
    let write_txn = db.begin_write()?;
    let album = {
        let old = require_in(&write_txn, album_id)?;
        let mut album = old.clone();
        upsert_ref(&mut album, image_ref);
        album.updated_at = Utc::now();
        replace_in(&write_txn, &old, &album)?;
        album
    };
    write_txn.commit()?;
    Ok(album)
}

pub fn remove_image_ref(db: &Database, album_id: ObjectId, image_id: ObjectId) -> DbResult<Album> {
    let write_txn = db.begin_write()?;
    let album = {
        let old = require_in(&write_txn, album_id)?;
        let mut album = old.clone();
        album.image_refs.retain(|r| r.image_id != image_id);
        if album.image_refs.len() == old.image_refs.len() {
            return Err(DbError::NotMember(format!("image {} is not in album {}", image_id, album_id)));
        }
        album.updated_at = Utc::now();
        replace_in(&write_txn, &old, &album)?;
        album
    };
    write_txn.commit()?;
    Ok(album)
}

/// Moves an image reference (with its layout) from one album to another in one transaction.
pub fn move_image(db: &Database, from: ObjectId, to: ObjectId, image_id: ObjectId) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    {
        let old_source = require_in(&write_txn, from)?;
        let moved = old_source
            .image_refs
            .iter()
            .find(|r| r.image_id == image_id)
            .cloned()
            .ok_or_else(|| DbError::NotMember(format!("image {} is not in album {}", image_id, from)))?;

        let now = Utc::now();
        let mut source = old_source.clone();
        source.image_refs.retain(|r| r.image_id != image_id);
        source.updated_at = now;
        replace_in(&write_txn, &old_source, &source)?;

        let old_target = require_in(&write_txn, to)?;
        let mut target = old_target.clone();
        upsert_ref(&mut target, moved);
        target.updated_at = now;
        replace_in(&write_txn, &old_target, &target)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn update_image_layout(
    db: &Database,
    album_id: ObjectId,
    image_id: ObjectId,
    position: AlbumPosition,
) -> DbResult<Album> {
    let write_txn = db.begin_write()?;
    let album = {
        let old = require_in(&write_txn, album_id)?;
        let mut album = old.clone();
        let image_ref = album
            .image_refs
            .iter_mut()
            .find(|r| r.image_id == image_id)
            .ok_or_else(|| DbError::NotFound(format!("image {} in album {}", image_id, album_id)))?;
        image_ref.position = Some(position);
        album.updated_at = Utc::now();
        replace_in(&write_txn, &old, &album)?;
        album
    };
    write_txn.commit()?;
    Ok(album)
}

/// Removes an image from every album that references it or uses it as cover.
pub(crate) fn pull_image_everywhere_in(txn: &WriteTransaction, image_id: ObjectId) -> DbResult<usize> {
    let album_ids: Vec<[u8; 12]> = {
        let ref_index = txn.open_table(ALBUM_IMAGE_REF_INDEX)?;
        let cover_index = txn.open_table(ALBUM_COVER_INDEX)?;
        let mut ids = Vec::new();
        for item in ref_index.range((image_id.bytes(), &ID_MIN)..=(image_id.bytes(), &ID_MAX))? {
            let (key, _) = item?;
            ids.push(*key.value().1);
        }
        for item in cover_index.range((image_id.bytes(), &ID_MIN)..=(image_id.bytes(), &ID_MAX))? {
            let (key, _) = item?;
            ids.push(*key.value().1);
        }
        ids.sort();
        ids.dedup();
        ids
    };

    for raw_id in &album_ids {
        let album_id = ObjectId::from_bytes(*raw_id);
        if let Some(old) = load_in(txn, album_id)? {
            let mut album = old.clone();
            album.image_refs.retain(|r| r.image_id != image_id);
            if album.cover_image == Some(image_id) {
                album.cover_image = None;
            }
            album.updated_at = Utc::now();
            replace_in(txn, &old, &album)?;
        }
    }
    Ok(album_ids.len())
}

// ====================================================================
// ============================ QUERIES ===============================
// ====================================================================

fn load_many(db: &Database, ids: &[[u8; 12]]) -> DbResult<Vec<Album>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(ALBUMS)?;
    let mut albums = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(guard) = table.get(id)? {
            albums.push(decode::<Album>(guard.value())?);
        }
    }
    Ok(albums)
}

/// Newest first, with the total number of albums.
pub fn list_albums(db: &Database, limit: usize, offset: usize) -> DbResult<(Vec<Album>, i64)> {
    let (ids, total) = {
        let read_txn = db.begin_read()?;
        let created_index = read_txn.open_table(ALBUM_CREATED_INDEX)?;
        let total = created_index.len()? as i64;
        let mut ids = Vec::new();
        for item in created_index.iter()?.skip(offset).take(limit) {
            let (key, _) = item?;
            ids.push(*key.value().1);
        }
        (ids, total)
    };
    Ok((load_many(db, &ids)?, total))
}

fn ids_with_prefix(
    db: &Database,
    table_def: TableDefinition<(&'static str, i64, &'static [u8; 12]), ()>,
    prefix: &str,
) -> DbResult<Vec<[u8; 12]>> {
    let read_txn = db.begin_read()?;
    let index = read_txn.open_table(table_def)?;
    let mut ids = Vec::new();
    for item in index.range((prefix, i64::MIN, &ID_MIN)..=(prefix, i64::MAX, &ID_MAX))? {
        let (key, _) = item?;
        ids.push(*key.value().2);
    }
    Ok(ids)
}

pub fn find_by_author(db: &Database, author: &str) -> DbResult<Vec<Album>> {
    let ids = ids_with_prefix(db, ALBUM_AUTHOR_INDEX, author)?;
    load_many(db, &ids)
}

pub fn find_by_tag(db: &Database, tag: &str) -> DbResult<Vec<Album>> {
    let ids = ids_with_prefix(db, ALBUM_TAG_INDEX, &tag.trim().to_lowercase())?;
    load_many(db, &ids)
}

pub fn find_by_visibility(db: &Database, visibility: Visibility) -> DbResult<Vec<Album>> {
    let ids = ids_with_prefix(db, ALBUM_VISIBILITY_INDEX, visibility.as_str())?;
    load_many(db, &ids)
}

/// Albums whose title or description share at least one token with `keyword`,
/// best match first, newest first among equals.
pub fn search_by_keyword(db: &Database, keyword: &str) -> DbResult<Vec<Album>> {
    let tokens = text_helpers::unique_tokens(keyword);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let hits: HashMap<[u8; 12], usize> = {
        let read_txn = db.begin_read()?;
        let text_index = read_txn.open_table(ALBUM_TEXT_INDEX)?;
        let mut hits = HashMap::new();
        for token in &tokens {
            for item in text_index.range((token.as_str(), &ID_MIN)..=(token.as_str(), &ID_MAX))? {
                let (key, _) = item?;
                *hits.entry(*key.value().1).or_insert(0) += 1;
            }
        }
        hits
    };

    let ids: Vec<[u8; 12]> = hits.keys().copied().collect();
    let mut albums = load_many(db, &ids)?;
    albums.sort_by(|a, b| {
        let score_a = hits.get(a.id.bytes()).copied().unwrap_or(0);
        let score_b = hits.get(b.id.bytes()).copied().unwrap_or(0);
        score_b.cmp(&score_a).then(b.created_at.cmp(&a.created_at))
    });
    Ok(albums)
}

pub fn albums_containing_image(db: &Database, image_id: ObjectId) -> DbResult<Vec<Album>> {
    let ids = {
        let read_txn = db.begin_read()?;
        let ref_index = read_txn.open_table(ALBUM_IMAGE_REF_INDEX)?;
        let mut ids = Vec::new();
        for item in ref_index.range((image_id.bytes(), &ID_MIN)..=(image_id.bytes(), &ID_MAX))? {
            let (key, _) = item?;
            ids.push(*key.value().1);
        }
        ids
    };
    load_many(db, &ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::temp_db;

    fn album(db: &Database, title: &str, author: &str, tags: &[&str]) -> Album {
        create_album(
            db,
            NewAlbum {
                title: title.to_string(),
                author: author.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..NewAlbum::default()
            },
        )
        .unwrap()
    }

    fn image_ref(image_id: ObjectId, caption: &str) -> AlbumImageRef {
        AlbumImageRef { image_id, position: None, caption: caption.to_string(), description: String::new() }
    }

    #[test]
    fn new_albums_are_private_and_empty() {
        let (_dir, db) = temp_db();
        let created = album(&db, "Trip", "ann", &[]);
        assert_eq!(created.visibility, Visibility::Private);
        assert!(created.image_refs.is_empty());
        assert_eq!(find_by_visibility(&db, Visibility::Private).unwrap().len(), 1);
    }

    #[test]
    fn add_or_update_replaces_existing_ref() {
        let (_dir, db) = temp_db();
        let a = album(&db, "Trip", "ann", &[]);
        let image = ObjectId::new();
        add_or_update_image_ref(&db, a.id, image_ref(image, "first")).unwrap();
        let updated = add_or_update_image_ref(&db, a.id, image_ref(image, "second")).unwrap();
        assert_eq!(updated.image_refs.len(), 1);
        assert_eq!(updated.image_refs[0].caption, "second");
        assert_eq!(albums_containing_image(&db, image).unwrap().len(), 1);
    }

    #[test]
    fn move_requires_membership_in_source() {
        let (_dir, db) = temp_db();
        let src = album(&db, "Source", "ann", &[]);
        let dst = album(&db, "Target", "ann", &[]);
        let image = ObjectId::new();

        let err = move_image(&db, src.id, dst.id, image).unwrap_err();
        assert!(matches!(err, DbError::NotMember(_)));

        add_or_update_image_ref(&db, src.id, image_ref(image, "kept caption")).unwrap();
        move_image(&db, src.id, dst.id, image).unwrap();
        assert!(get_album(&db, src.id).unwrap().image_refs.is_empty());
        let target = get_album(&db, dst.id).unwrap();
        assert_eq!(target.image_refs[0].caption, "kept caption");
        let holders = albums_containing_image(&db, image).unwrap();
        assert_eq!(holders.iter().map(|a| a.id).collect::<Vec<_>>(), vec![dst.id]);
    }

    #[test]
    fn layout_update_on_missing_image_is_not_found() {
        let (_dir, db) = temp_db();
        let a = album(&db, "Trip", "ann", &[]);
        let position = AlbumPosition {
            x: 0.1,
            y: 0.2,
            width: 100.0,
            height: 80.0,
            unit: "px".to_string(),
            rotate: 0,
            z_index: 1,
            aspect_ratio_locked: true,
            opacity: 1.0,
            border_radius: 0.0,
            shadow: String::new(),
        };
        let err = update_image_layout(&db, a.id, ObjectId::new(), position).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn queries_by_author_tag_and_keyword() {
        let (_dir, db) = temp_db();
        album(&db, "Summer beach days", "ann", &["Sea"]);
        album(&db, "Winter mountains", "bob", &["snow"]);

        assert_eq!(find_by_author(&db, "bob").unwrap()[0].title, "Winter mountains");
        assert_eq!(find_by_tag(&db, "sea").unwrap()[0].title, "Summer beach days");
        let found = search_by_keyword(&db, "beach").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].author, "ann");

        let (page, total) = list_albums(&db, 1, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn retitling_moves_text_index_entries() {
        let (_dir, db) = temp_db();
        let a = album(&db, "Old name", "ann", &[]);
        update_album(&db, a.id, AlbumPatch { title: Some("Fresh title".to_string()), ..AlbumPatch::default() })
            .unwrap();
        assert!(search_by_keyword(&db, "old").unwrap().is_empty());
        assert_eq!(search_by_keyword(&db, "fresh").unwrap().len(), 1);
    }
}
