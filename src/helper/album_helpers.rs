use crate::helper::sanitization_helpers::clean_text_field;
use crate::helper::tag_helpers::dedup_tags;
use crate::helper::{ServiceError, ServiceResult};
use crate::models::db_operations::albums_db_operations::{self as albums, NewAlbum};
use crate::models::db_operations::images_db_operations as images;
use crate::models::{Album, AlbumImageRef, AlbumPatch, ObjectId, Page, PageQuery};
use redb::Database;
use serde::Deserialize;

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct MoveImageRequest {
    pub from_album_id: ObjectId,
    pub to_album_id: ObjectId,
    pub image_id: ObjectId,
}

/// Creates an album owned by `session_user` unless the request names an author.
pub fn create_album(db: &Database, mut input: NewAlbum, session_user: &str) -> ServiceResult<Album> {
    input.title = clean_text_field(&input.title, MAX_TITLE_CHARS);
    if input.title.is_empty() {
        return Err(ServiceError::Validation("Album title must not be empty.".to_string()));
    }
    if input.author.trim().is_empty() {
        input.author = session_user.to_string();
    }
    input.tags = dedup_tags(&input.tags);
    if let Some(cover) = input.cover_image {
        images::get_image(db, cover)?;
    }
    let album = albums::create_album(db, input)?;
    log::info!("Created album {} '{}' for {}", album.id, album.title, album.author);
    Ok(album)
}

pub fn update_album(db: &Database, id: ObjectId, mut patch: AlbumPatch) -> ServiceResult<Album> {
    if let Some(title) = patch.title.as_mut() {
        *title = clean_text_field(title, MAX_TITLE_CHARS);
        if title.is_empty() {
            return Err(ServiceError::Validation("Album title must not be empty.".to_string()));
        }
    }
    if let Some(tags) = patch.tags.as_mut() {
        *tags = dedup_tags(tags);
    }
    if let Some(cover) = patch.cover_image {
        images::get_image(db, cover)?;
    }
    Ok(albums::update_album(db, id, patch)?)
}

/// Adds the reference, or replaces the existing one for the same image. The image must exist.
pub fn put_image_ref(db: &Database, album_id: ObjectId, image_ref: AlbumImageRef) -> ServiceResult<Album> {
    images::get_image(db, image_ref.image_id)?;
    Ok(albums::add_or_update_image_ref(db, album_id, image_ref)?)
}

pub fn move_image(db: &Database, request: &MoveImageRequest) -> ServiceResult<()> {
    if request.from_album_id == request.to_album_id {
        return Err(ServiceError::Validation("Source and target album are the same.".to_string()));
    }
    albums::move_image(db, request.from_album_id, request.to_album_id, request.image_id)?;
    log::info!(
        "Moved image {} from album {} to album {}",
        request.image_id,
        request.from_album_id,
        request.to_album_id
    );
    Ok(())
}

pub fn list_albums(db: &Database, query: &PageQuery) -> ServiceResult<Page<Album>> {
    let (limit, offset) = query.limit_offset();
    let (items, total) = albums::list_albums(db, limit, offset)?;
    Ok(query.wrap(items, total))
}
