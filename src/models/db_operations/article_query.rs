use crate::helper::text_helpers;
use crate::models::db_operations::{DbError, DbResult};
use crate::models::search_models::{ArticleSearchRequest, ListingParams, TimeSort};
use crate::models::{Article, ObjectId};
use std::cmp::Ordering;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum ArticleFilter {
    /// An explicit id overrides every other condition.
    ById(ObjectId),
    /// At least one of `tokens` must occur in the title or body.
    Text { tokens: Vec<String>, author: String },
    InIds(Vec<ObjectId>),
    All { author: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    UpdateTime,
    CreateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOrder {
    pub field: TimeField,
    pub descending: bool,
}

/// Skip and limit are always set together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page_number: i64,
    pub page_size: i64,
    pub skip: usize,
    pub limit: usize,
}

impl Pagination {
    pub fn from_params(page_number: i64, page_size: i64) -> Self {
        let page_number = if page_number <= 0 { 1 } else { page_number };
        let page_size = if page_size <= 0 {
            DEFAULT_PAGE_SIZE
        } else if page_size >= MAX_PAGE_SIZE {
            MAX_PAGE_SIZE
        } else {
            page_size
        };
        Pagination {
            page_number,
            page_size,
            skip: usize::try_from((page_number - 1).saturating_mul(page_size)).unwrap_or(usize::MAX),
            limit: page_size as usize,
        }
    }
}

/// A fully resolved article listing: filter, ordering, paging and post-processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleQuery {
    pub filter: ArticleFilter,
    pub time_order: Option<TimeOrder>,
    /// Order by relevance after any time ordering, and report the score.
    pub scored: bool,
    pub pagination: Pagination,
    pub lazy: bool,
}

fn time_order(params: &ListingParams) -> DbResult<Option<TimeOrder>> {
    fn order(field: TimeField, sort: &TimeSort) -> TimeOrder {
        TimeOrder { field, descending: sort.sort_direction < 0 }
    }
    match (params.update_time_sort.sort_flag, params.create_time_sort.sort_flag) {
        (true, true) => Err(DbError::Validation(
            "update time and create time ordering cannot be requested together".to_string(),
        )),
        (true, false) => Ok(Some(order(TimeField::UpdateTime, &params.update_time_sort))),
        (false, true) => Ok(Some(order(TimeField::CreateTime, &params.create_time_sort))),
        (false, false) => Ok(None),
    }
}

impl ArticleQuery {
    /// General search. A supplied id wins over search text and author.
    pub fn search(id: Option<ObjectId>, request: &ArticleSearchRequest) -> DbResult<Self> {
        let time_order = time_order(&request.params)?;
        let search_text = request.search_text.trim();

        let (filter, scored) = match id {
            Some(id) => (ArticleFilter::ById(id), false),
            None if !search_text.is_empty() => {
                let tokens: Vec<String> = text_helpers::unique_tokens(search_text).into_iter().collect();
                (ArticleFilter::Text { tokens, author: request.author.clone() }, true)
            }
            None => (ArticleFilter::All { author: request.author.clone() }, false),
        };

        Ok(ArticleQuery {
            filter,
            time_order,
            scored,
            pagination: Pagination::from_params(request.params.page_number, request.params.page_size),
            lazy: request.params.lazy,
        })
    }

    /// Listing restricted to a fixed id set, such as the members of a category.
    pub fn in_ids(ids: Vec<ObjectId>, params: &ListingParams) -> DbResult<Self> {
        Ok(ArticleQuery {
            filter: ArticleFilter::InIds(ids),
            time_order: time_order(params)?,
            scored: false,
            pagination: Pagination::from_params(params.page_number, params.page_size),
            lazy: params.lazy,
        })
    }

    /// Filter check for conditions not answered by an index lookup.
    pub fn accepts(&self, article: &Article) -> bool {
        match &self.filter {
            ArticleFilter::ById(id) => article.id == *id,
            ArticleFilter::InIds(ids) => ids.contains(&article.id),
            ArticleFilter::Text { author, .. } | ArticleFilter::All { author } => {
                author.is_empty() || article.author == *author
            }
        }
    }

    /// Ordering of two scored hits.
    pub fn compare(&self, a: (&Article, f64), b: (&Article, f64)) -> Ordering {
        let by_time = match self.time_order {
            Some(TimeOrder { field, descending }) => {
                let ord = match field {
                    TimeField::UpdateTime => a.0.update_time.cmp(&b.0.update_time),
                    TimeField::CreateTime => a.0.create_time.cmp(&b.0.create_time),
                };
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            None => Ordering::Equal,
        };
        let by_score = if self.scored { b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal) } else { Ordering::Equal };
        by_time.then(by_score).then(a.0.id.cmp(&b.0.id))
    }
}

/// Relevance of an article for the given query tokens: two points per title hit, one per body hit.
pub fn score(article: &Article, tokens: &[String]) -> f64 {
    let title = text_helpers::term_frequencies(&article.title_words);
    let body = text_helpers::term_frequencies(&article.md_words);
    tokens
        .iter()
        .map(|t| 2.0 * f64::from(title.get(t).copied().unwrap_or(0)) + f64::from(body.get(t).copied().unwrap_or(0)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(search_text: &str, page_number: i64, page_size: i64) -> ArticleSearchRequest {
        ArticleSearchRequest {
            search_text: search_text.to_string(),
            author: "ann".to_string(),
            params: ListingParams { page_number, page_size, ..ListingParams::default() },
        }
    }

    #[test]
    fn id_overrides_text_and_author() {
        let id = ObjectId::new();
        let query = ArticleQuery::search(Some(id), &request("rust redb", 1, 10)).unwrap();
        assert_eq!(query.filter, ArticleFilter::ById(id));
        assert!(!query.scored);
    }

    #[test]
    fn text_search_is_scored() {
        let query = ArticleQuery::search(None, &request("Rust  REDB", 1, 10)).unwrap();
        assert!(query.scored);
        assert_eq!(
            query.filter,
            ArticleFilter::Text { tokens: vec!["redb".to_string(), "rust".to_string()], author: "ann".to_string() }
        );
    }

    #[test]
    fn both_time_sorts_is_a_validation_error() {
        let mut req = request("", 1, 10);
        req.params.update_time_sort.sort_flag = true;
        req.params.create_time_sort.sort_flag = true;
        assert!(matches!(ArticleQuery::search(None, &req).unwrap_err(), DbError::Validation(_)));
    }

    #[test]
    fn pagination_is_normalised() {
        let p = Pagination::from_params(0, 500);
        assert_eq!((p.page_number, p.page_size, p.skip, p.limit), (1, 200, 0, 200));
        let p = Pagination::from_params(-3, 0);
        assert_eq!((p.page_number, p.page_size), (1, 10));
        let p = Pagination::from_params(2, 10);
        assert_eq!(p.skip, 10);
        assert_eq!(p.limit, 10);
    }

    #[test]
    fn huge_page_number_skips_past_everything() {
        let p = Pagination::from_params(i64::MAX, 10);
        assert_eq!(p.page_number, i64::MAX);
        assert_eq!(p.limit, 10);
        assert!(p.skip >= usize::try_from(i64::MAX / 10).unwrap_or(usize::MAX));
    }

    #[test]
    fn negative_direction_sorts_descending() {
        let mut req = request("", 1, 10);
        req.params.create_time_sort = TimeSort { sort_direction: -1, sort_flag: true };
        let query = ArticleQuery::search(None, &req).unwrap();
        assert_eq!(query.time_order, Some(TimeOrder { field: TimeField::CreateTime, descending: true }));
    }
}
