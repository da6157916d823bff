use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod db_operations;
pub mod object_id;
pub mod picbed_models;
pub mod search_models;

pub use object_id::ObjectId;
pub use picbed_models::*;

pub const CODE_SUCCESS: &str = "001001200";
pub const CODE_FAILED: &str = "001001400";

/// Response envelope shared by every JSON route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub msg: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse { code: CODE_SUCCESS.to_string(), msg: "success".to_string(), data }
    }
}

impl ApiResponse<String> {
    pub fn failed(detail: impl Into<String>) -> Self {
        ApiResponse { code: CODE_FAILED.to_string(), msg: "failed".to_string(), data: detail.into() }
    }
}

/// Result of an operation whose secondary writes may fail without undoing the primary one.
#[derive(Debug, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Outcome { value, warnings: Vec::new() }
    }

    pub fn warn(&mut self, warning: String) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Article {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub author: String,
    pub synopsis: String,
    pub pic_url: String,
    pub markdown: String,
    pub md_words: String,
    pub title_words: String,
    pub delete_flag: bool,
    pub draft_flag: bool,
    pub overhead: bool,
    pub art_length: i64,
    pub reads_number: i64,
    pub comments_number: i64,
    pub praise_number: i64,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Article category. `count` always equals `article_ids.len()`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ArticleCategory {
    pub name: String,
    pub count: i64,
    pub article_ids: Vec<ObjectId>,
}

impl ArticleCategory {
    pub fn empty(name: &str) -> Self {
        ArticleCategory { name: name.to_string(), count: 0, article_ids: Vec::new() }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryListResult {
    pub categories: Vec<ArticleCategory>,
    pub total_count: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CounterUpdateResult {
    pub matched_count: i64,
    pub modified_count: i64,
    pub upserted_count: i64,
    pub id: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub user_level: i64,
    pub is_lock: bool,
    pub email: String,
    pub phone: String,
    pub brief: String,
    pub new_time: Option<String>,
    pub create_time: String,
    pub update_time: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResult {
    pub username: String,
    pub email: String,
    pub phone: String,
    pub brief: String,
}
