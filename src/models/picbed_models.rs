use crate::models::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const NEXUS_CATEGORY_ID: &str = "nexus";
pub const NEXUS_CATEGORY_NAME: &str = "Nexus";
pub const DEFAULT_GRID_SIZE: i32 = 10;
pub const DEFAULT_CATEGORY_WIDTH: f64 = 200.0;
pub const DEFAULT_CATEGORY_HEIGHT: f64 = 280.0;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Freeform,
    Flex,
    Grid,
}

/// Placement of one image inside one image category.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPosition {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub grid_x: i32,
    #[serde(default)]
    pub grid_y: i32,
    #[serde(default)]
    pub grid_size: i32,
    #[serde(default)]
    pub row: i32,
    #[serde(default)]
    pub col: i32,
    #[serde(default)]
    pub layout_mode: LayoutMode,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default)]
    pub version: i64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl CategoryPosition {
    /// Freeform placement at the origin, version 1.
    pub fn new(width: f64, height: f64) -> Self {
        let now = Utc::now();
        CategoryPosition {
            x: 0.0,
            y: 0.0,
            width,
            height,
            grid_x: 0,
            grid_y: 0,
            grid_size: DEFAULT_GRID_SIZE,
            row: 0,
            col: 0,
            layout_mode: LayoutMode::Freeform,
            z_index: 0,
            is_visible: true,
            version: 1,
            updated_at: now,
            category_name: String::new(),
            sort_order: 0,
            added_at: now,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Image {
    pub id: ObjectId,
    pub name: String,
    pub cos_url: String,
    #[serde(default)]
    pub thumb_url: Option<String>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub thumb_width: u32,
    #[serde(default)]
    pub thumb_height: u32,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub exif: BTreeMap<String, String>,
    #[serde(default)]
    pub positions: BTreeMap<String, CategoryPosition>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategorySettings {
    pub layout_mode: LayoutMode,
    pub grid_size: i32,
    pub default_width: f64,
    pub default_height: f64,
    pub auto_arrange: bool,
}

impl Default for CategorySettings {
    fn default() -> Self {
        CategorySettings {
            layout_mode: LayoutMode::Freeform,
            grid_size: DEFAULT_GRID_SIZE,
            default_width: DEFAULT_CATEGORY_WIDTH,
            default_height: DEFAULT_CATEGORY_HEIGHT,
            auto_arrange: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryImageRef {
    pub image_id: ObjectId,
    pub sort_order: i64,
    pub added_at: DateTime<Utc>,
}

/// Image category. `images` is the inverted index and `image_count == images.len()`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_count: i64,
    #[serde(default)]
    pub cover_image: Option<ObjectId>,
    pub settings: CategorySettings,
    #[serde(default)]
    pub images: Vec<CategoryImageRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagImageRef {
    pub image_id: ObjectId,
    pub image_name: String,
    pub added_at: DateTime<Utc>,
}

/// Image tag keyed by its normalized name. `image_count == images.len()`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub image_count: i64,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub images: Vec<TagImageRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    pub fn normalize_id(name: &str) -> String {
        name.trim().to_lowercase()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
    Unlisted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AlbumPosition {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub rotate: i32,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub aspect_ratio_locked: bool,
    #[serde(default)]
    pub opacity: f64,
    #[serde(default)]
    pub border_radius: f64,
    #[serde(default)]
    pub shadow: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AlbumImageRef {
    pub image_id: ObjectId,
    #[serde(default)]
    pub position: Option<AlbumPosition>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Album {
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_image: Option<ObjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub image_refs: Vec<AlbumImageRef>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// `page` / `page_size` query parameters. Missing values take the defaults;
/// values of zero or less select the whole list.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn limit_offset(&self) -> (usize, usize) {
        let (page, page_size) = (self.page(), self.page_size());
        if page <= 0 || page_size <= 0 {
            return (usize::MAX, 0);
        }
        let offset = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
        (usize::try_from(page_size).unwrap_or(usize::MAX), offset)
    }

    pub fn wrap<T>(&self, items: Vec<T>, total: i64) -> Page<T> {
        Page { items, total, page: self.page(), page_size: self.page_size() }
    }
}

/// Optional category settings. Unset or zero values fall back to the defaults on create.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategorySettingsPatch {
    pub layout_mode: Option<LayoutMode>,
    pub grid_size: Option<i32>,
    pub default_width: Option<f64>,
    pub default_height: Option<f64>,
    pub auto_arrange: Option<bool>,
}

impl CategorySettingsPatch {
    pub fn apply_to(&self, settings: &mut CategorySettings) {
        if let Some(mode) = self.layout_mode {
            settings.layout_mode = mode;
        }
        if let Some(size) = self.grid_size.filter(|s| *s > 0) {
            settings.grid_size = size;
        }
        if let Some(width) = self.default_width.filter(|w| *w > 0.0) {
            settings.default_width = width;
        }
        if let Some(height) = self.default_height.filter(|h| *h > 0.0) {
            settings.default_height = height;
        }
        if let Some(auto) = self.auto_arrange {
            settings.auto_arrange = auto;
        }
    }

    pub fn resolve(&self) -> CategorySettings {
        let mut settings = CategorySettings::default();
        self.apply_to(&mut settings);
        settings
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewImageCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: CategorySettingsPatch,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageCategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub settings: Option<CategorySettingsPatch>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewTag {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TagPatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlbumPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub cover_image: Option<ObjectId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_defaults_and_whole_list() {
        let query = PageQuery::default();
        assert_eq!((query.page(), query.page_size()), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(query.limit_offset(), (DEFAULT_PAGE_SIZE as usize, 0));

        let all = PageQuery { page: Some(0), page_size: Some(5) };
        assert_eq!(all.limit_offset(), (usize::MAX, 0));
    }

    #[test]
    fn huge_page_offsets_saturate() {
        let query = PageQuery { page: Some(i64::MAX), page_size: Some(20) };
        let (limit, offset) = query.limit_offset();
        assert_eq!(limit, 20);
        assert!(offset >= usize::try_from(i64::MAX / 20).unwrap_or(usize::MAX));

        let query = PageQuery { page: Some(3), page_size: Some(i64::MAX) };
        assert_eq!(query.limit_offset().0, usize::try_from(i64::MAX).unwrap_or(usize::MAX));
    }
}
