use crate::models::Article;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeSort {
    /// Negative sorts descending, anything else ascending.
    pub sort_direction: i64,
    pub sort_flag: bool,
}

/// Paging and ordering shared by every article listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListingParams {
    #[serde(default)]
    pub lazy: bool,
    #[serde(default)]
    pub update_time_sort: TimeSort,
    #[serde(default)]
    pub create_time_sort: TimeSort,
    #[serde(default)]
    pub page_number: i64,
    #[serde(default)]
    pub page_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleSearchRequest {
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub params: ListingParams,
}

/// Flat query-string shape of the listing parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub lazy: Option<bool>,
    pub update_time_sort_flag: Option<bool>,
    pub update_time_sort_direction: Option<i64>,
    pub create_time_sort_flag: Option<bool>,
    pub create_time_sort_direction: Option<i64>,
    pub page_number: Option<i64>,
    pub page_size: Option<i64>,
}

impl ListingQuery {
    pub fn into_params(self) -> ListingParams {
        ListingParams {
            lazy: self.lazy.unwrap_or(false),
            update_time_sort: TimeSort {
                sort_direction: self.update_time_sort_direction.unwrap_or(0),
                sort_flag: self.update_time_sort_flag.unwrap_or(false),
            },
            create_time_sort: TimeSort {
                sort_direction: self.create_time_sort_direction.unwrap_or(0),
                sort_flag: self.create_time_sort_flag.unwrap_or(false),
            },
            page_number: self.page_number.unwrap_or(0),
            page_size: self.page_size.unwrap_or(0),
        }
    }
}

/// Query-string form of [`ArticleSearchRequest`]. Kept flat since urlencoded
/// values cannot be parsed as numbers through `#[serde(flatten)]`.
#[derive(Debug, Default, Deserialize)]
pub struct ArticleSearchQuery {
    pub search_text: Option<String>,
    pub author: Option<String>,
    pub lazy: Option<bool>,
    pub update_time_sort_flag: Option<bool>,
    pub update_time_sort_direction: Option<i64>,
    pub create_time_sort_flag: Option<bool>,
    pub create_time_sort_direction: Option<i64>,
    pub page_number: Option<i64>,
    pub page_size: Option<i64>,
}

impl ArticleSearchQuery {
    pub fn into_request(self) -> ArticleSearchRequest {
        let listing = ListingQuery {
            lazy: self.lazy,
            update_time_sort_flag: self.update_time_sort_flag,
            update_time_sort_direction: self.update_time_sort_direction,
            create_time_sort_flag: self.create_time_sort_flag,
            create_time_sort_direction: self.create_time_sort_direction,
            page_number: self.page_number,
            page_size: self.page_size,
        };
        ArticleSearchRequest {
            search_text: self.search_text.unwrap_or_default(),
            author: self.author.unwrap_or_default(),
            params: listing.into_params(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ArticleSearchHit {
    #[serde(flatten)]
    pub article: Article,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct ArticleSearchResult {
    pub articles: Vec<ArticleSearchHit>,
    pub page_number: i64,
    pub page_size: i64,
    pub ans_count: i64,
    pub total_count: i64,
    pub msg: String,
}
