use crate::helper::form_helpers::{read_field_bytes, read_text_field, split_list};
use crate::helper::storage::{object_key, ObjectStorage, StorageError};
use crate::helper::tag_helpers::{attach_tags, dedup_tags};
use crate::helper::{ServiceError, ServiceResult};
use crate::models::db_operations::images_db_operations as images;
use crate::models::{CategoryPosition, Image, ObjectId, Outcome, NEXUS_CATEGORY_ID, NEXUS_CATEGORY_NAME};
use actix_multipart::Multipart;
use chrono::Utc;
use futures_util::StreamExt;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use redb::Database;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Cursor;

pub const ALLOWED_CONTENT_TYPES: [&str; 5] = ["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"];
const MAX_TEXT_FIELD_BYTES: usize = 4096;
const KEY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub bucket_prefix: String,
    pub max_upload_bytes: usize,
    pub thumbnail_max_width: u32,
    pub thumbnail_max_height: u32,
    pub thumbnail_quality: u8,
}

/// A received image file plus its form fields.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub name: Option<String>,
    pub tags: Vec<String>,
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        _ => None,
    }
}

/// Reads the `file` field and the optional `name` and `tags` fields of an upload form.
pub async fn read_image_upload(mut payload: Multipart, max_upload_bytes: usize) -> ServiceResult<ImageUpload> {
    let mut upload = ImageUpload::default();
    let mut has_file = false;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let field_name = field.content_disposition().get_name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                upload.content_type = field.content_type().map(|m| m.essence_str().to_string()).unwrap_or_default();
                upload.file_name = field.content_disposition().get_filename().unwrap_or("upload").to_string();
                upload.bytes = read_field_bytes(&mut field, max_upload_bytes).await?;
                has_file = true;
            }
            "name" => upload.name = Some(read_text_field(&mut field, MAX_TEXT_FIELD_BYTES).await?),
            "tags" => upload.tags = split_list(&read_text_field(&mut field, MAX_TEXT_FIELD_BYTES).await?),
            _ => (),
        }
    }

    if !has_file {
        return Err(ServiceError::Validation("No file was uploaded.".to_string()));
    }
    Ok(upload)
}

/// Scales the image down to fit the bounds. Smaller images keep their size.
pub fn fit_within(img: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_width && height <= max_height {
        img.clone()
    } else {
        img.thumbnail(max_width, max_height)
    }
}

/// Encoded thumbnail with its extension: PNG for PNG sources, JPEG otherwise.
pub fn encode_thumbnail(
    img: &DynamicImage,
    source_content_type: &str,
    settings: &UploadSettings,
) -> Result<(Vec<u8>, &'static str, u32, u32), image::ImageError> {
    let thumb = fit_within(img, settings.thumbnail_max_width, settings.thumbnail_max_height);
    let (width, height) = thumb.dimensions();
    let mut buf = Vec::new();
    if source_content_type == "image/png" {
        thumb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok((buf, ".png", width, height))
    } else {
        JpegEncoder::new_with_quality(&mut buf, settings.thumbnail_quality).encode_image(&thumb.to_rgb8())?;
        Ok((buf, ".jpg", width, height))
    }
}

/// Stores the bytes under a fresh timestamped key, retrying when the key is taken.
fn put_with_fresh_key(
    storage: &dyn ObjectStorage,
    settings: &UploadSettings,
    kind: &str,
    ext: &str,
    bytes: &[u8],
) -> Result<(String, String), StorageError> {
    let mut last_err = None;
    for _ in 0..KEY_ATTEMPTS {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
        let key = object_key(&settings.bucket_prefix, kind, nanos, ext);
        match storage.put(&key, bytes) {
            Ok(url) => return Ok((key, url)),
            Err(StorageError::AlreadyExists(k)) => last_err = Some(StorageError::AlreadyExists(k)),
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| StorageError::InvalidKey(kind.to_string())))
}

/// Full upload pipeline: validate, store original and thumbnail, insert the image
/// document, then best-effort `nexus` membership and tag registration.
pub fn store_image(
    db: &Database,
    storage: &dyn ObjectStorage,
    settings: &UploadSettings,
    upload: ImageUpload,
) -> ServiceResult<Outcome<Image>> {
    if !ALLOWED_CONTENT_TYPES.contains(&upload.content_type.as_str()) {
        return Err(ServiceError::Validation(format!("Unsupported file type: '{}'", upload.content_type)));
    }
    if upload.bytes.is_empty() {
        return Err(ServiceError::Validation("Uploaded file is empty.".to_string()));
    }
    if upload.bytes.len() > settings.max_upload_bytes {
        return Err(ServiceError::TooLarge(format!(
            "file is {} bytes, the limit is {} bytes",
            upload.bytes.len(),
            settings.max_upload_bytes
        )));
    }
    let ext = extension_for(&upload.content_type)
        .ok_or_else(|| ServiceError::Validation(format!("Unsupported file type: '{}'", upload.content_type)))?;

    let decoded = image::load_from_memory(&upload.bytes)?;
    let (width, height) = decoded.dimensions();

    let mut warnings = Vec::new();
    let (original_key, cos_url) = put_with_fresh_key(storage, settings, "images", ext, &upload.bytes)?;

    let mut thumb = None;
    match encode_thumbnail(&decoded, &upload.content_type, settings) {
        Ok((bytes, thumb_ext, thumb_width, thumb_height)) => {
            match put_with_fresh_key(storage, settings, "thumbnails", thumb_ext, &bytes) {
                Ok((key, url)) => thumb = Some((key, url, thumb_width, thumb_height)),
                Err(e) => warnings.push(format!("thumbnail upload failed: {}", e)),
            }
        }
        Err(e) => warnings.push(format!("thumbnail generation failed: {}", e)),
    }

    let name = upload
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| upload.file_name.clone());

    let mut nexus_position = CategoryPosition::new(f64::from(width), f64::from(height));
    nexus_position.category_name = NEXUS_CATEGORY_NAME.to_string();
    let mut positions = BTreeMap::new();
    positions.insert(NEXUS_CATEGORY_ID.to_string(), nexus_position);

    let image = Image {
        id: ObjectId::new(),
        name,
        cos_url,
        thumb_url: thumb.as_ref().map(|(_, url, _, _)| url.clone()),
        width,
        height,
        thumb_width: thumb.as_ref().map_or(0, |t| t.2),
        thumb_height: thumb.as_ref().map_or(0, |t| t.3),
        uploaded_at: Utc::now(),
        tags: dedup_tags(&upload.tags),
        exif: BTreeMap::new(),
        positions,
    };

    if let Err(e) = images::insert_image(db, &image) {
        log::error!("Failed to insert image document for {}: {}", image.cos_url, e);
        let mut stored_keys = vec![original_key];
        stored_keys.extend(thumb.map(|(key, _, _, _)| key));
        for key in stored_keys {
            if let Err(cleanup) = storage.delete(&key) {
                log::warn!("Could not remove orphaned object '{}': {}", key, cleanup);
            }
        }
        return Err(e.into());
    }

    let mut outcome = Outcome::new(image.clone());
    for warning in warnings {
        outcome.warn(warning);
    }
    match images::place_in_category(db, NEXUS_CATEGORY_ID, image.id, None, 0) {
        Ok(position) => {
            outcome.value.positions.insert(NEXUS_CATEGORY_ID.to_string(), position);
        }
        Err(e) => outcome.warn(format!("could not add image {} to '{}': {}", image.id, NEXUS_CATEGORY_ID, e)),
    }
    attach_tags(db, image.id, &image.name, &image.tags, &mut outcome);
    Ok(outcome)
}

/// Deletes the image document (with its category, tag and album references)
/// and then the stored objects. Object removal is best effort.
pub fn remove_image(db: &Database, storage: &dyn ObjectStorage, image_id: ObjectId) -> ServiceResult<Outcome<Image>> {
    let image = images::delete_image(db, image_id)?;
    let mut outcome = Outcome::new(image);
    let urls: Vec<String> =
        std::iter::once(outcome.value.cos_url.clone()).chain(outcome.value.thumb_url.clone()).collect();
    for url in urls {
        match storage.key_for_url(&url) {
            Some(key) => {
                if let Err(e) = storage.delete(&key) {
                    outcome.warn(format!("could not delete stored object '{}': {}", key, e));
                }
            }
            None => outcome.warn(format!("stored object url '{}' is not managed by this storage", url)),
        }
    }
    Ok(outcome)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub image_id: ObjectId,
    pub category_id: String,
    pub position: CategoryPosition,
}

/// Applies every update it can; failures become warnings.
pub fn batch_update_positions(db: &Database, updates: Vec<PositionUpdate>) -> Outcome<Vec<CategoryPosition>> {
    let mut outcome = Outcome::new(Vec::new());
    for update in updates {
        match images::update_position(db, update.image_id, &update.category_id, update.position) {
            Ok(position) => outcome.value.push(position),
            Err(e) => outcome.warn(format!(
                "could not update position of image {} in '{}': {}",
                update.image_id, update.category_id, e
            )),
        }
    }
    outcome
}
