use crate::helper::form_helpers::{parse_bool, read_field_bytes, read_text_field, split_list};
use crate::helper::sanitization_helpers::clean_text_field;
use crate::helper::{text_helpers, ServiceError, ServiceResult};
use crate::models::db_operations::article_query::ArticleQuery;
use crate::models::db_operations::articles_db_operations::{self as articles, ArticleFlags};
use crate::models::db_operations::categories_db_operations as categories;
use crate::models::search_models::{ArticleSearchQuery, ArticleSearchResult, ListingQuery};
use crate::models::{Article, CounterUpdateResult, ObjectId};
use actix_multipart::Multipart;
use chrono::Utc;
use futures_util::StreamExt;
use redb::Database;
use serde::{Deserialize, Serialize};

const MAX_TITLE_CHARS: usize = 200;
const MAX_SYNOPSIS_CHARS: usize = 1000;
const MAX_META_FIELD_BYTES: usize = 64 * 1024;

/// Article metadata submitted next to the markdown body.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArticleMeta {
    pub title: String,
    pub author: String,
    pub synopsis: String,
    pub pic_url: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub draft_flag: bool,
    pub overhead: bool,
}

impl ArticleMeta {
    /// Reads the metadata fields from form pairs. `tags` and `categories` may repeat
    /// and may each hold a comma-separated list.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut meta = ArticleMeta::default();
        for (key, value) in pairs {
            match key.as_str() {
                "title" => meta.title = value.clone(),
                "author" => meta.author = value.clone(),
                "synopsis" => meta.synopsis = value.clone(),
                "pic_url" => meta.pic_url = value.trim().to_string(),
                "tags" | "tags[]" => meta.tags.extend(split_list(value)),
                "categories" | "categories[]" => meta.categories.extend(split_list(value)),
                "draft_flag" => meta.draft_flag = parse_bool(Some(value)),
                "overhead" => meta.overhead = parse_bool(Some(value)),
                _ => (),
            }
        }
        meta
    }
}

#[derive(Debug, Serialize)]
pub struct ArticleCreated {
    pub title: String,
    #[serde(rename = "_id")]
    pub id: ObjectId,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub article_id: String,
    pub category_name: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteCount {
    pub count: i64,
}

/// Parses an article id given in a path. Non-hex ids are mapped the same way as on creation.
pub fn parse_article_id(raw: &str) -> ServiceResult<ObjectId> {
    if raw.trim().is_empty() {
        return Err(ServiceError::Validation("Article id must not be empty.".to_string()));
    }
    Ok(ObjectId::from_loose(raw.trim())?)
}

/// Assembles a new article: fresh counters, creation time, derived word count and search words.
pub fn build_article(meta: ArticleMeta, markdown: String, caller_id: Option<&str>) -> ServiceResult<Article> {
    let id = match caller_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(raw) => ObjectId::from_loose(raw)?,
        None => ObjectId::new(),
    };
    let title = clean_text_field(&meta.title, MAX_TITLE_CHARS);
    if title.is_empty() {
        return Err(ServiceError::Validation("Article title must not be empty.".to_string()));
    }

    let now = Utc::now();
    Ok(Article {
        id,
        title_words: text_helpers::search_words(&title),
        title,
        author: clean_text_field(&meta.author, MAX_TITLE_CHARS),
        synopsis: clean_text_field(&meta.synopsis, MAX_SYNOPSIS_CHARS),
        pic_url: meta.pic_url,
        md_words: text_helpers::markdown_search_words(&markdown),
        art_length: text_helpers::word_count(&markdown),
        markdown,
        delete_flag: false,
        draft_flag: meta.draft_flag,
        overhead: meta.overhead,
        reads_number: 0,
        comments_number: 0,
        praise_number: 0,
        tags: meta.tags,
        categories: meta.categories,
        create_time: now,
        update_time: now,
    })
}

/// Stores a new article. An empty author falls back to the session user.
pub fn publish_article(
    db: &Database,
    mut meta: ArticleMeta,
    markdown: String,
    caller_id: Option<&str>,
    session_user: &str,
) -> ServiceResult<ArticleCreated> {
    if meta.author.trim().is_empty() {
        meta.author = session_user.to_string();
    }
    let article = build_article(meta, markdown, caller_id)?;
    articles::create_article(db, &article)?;
    Ok(ArticleCreated { title: article.title, id: article.id })
}

/// Reads a markdown upload: the `file` field holds the body, every other field is metadata.
pub async fn read_markdown_upload(
    mut payload: Multipart,
    max_bytes: usize,
) -> ServiceResult<(ArticleMeta, String)> {
    let mut pairs = Vec::new();
    let mut markdown = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        if name == "file" {
            let bytes = read_field_bytes(&mut field, max_bytes).await?;
            let text = String::from_utf8(bytes)
                .map_err(|_| ServiceError::Validation("Markdown file is not valid UTF-8.".to_string()))?;
            markdown = Some(text);
        } else {
            pairs.push((name, read_text_field(&mut field, MAX_META_FIELD_BYTES).await?));
        }
    }

    let markdown = markdown.ok_or_else(|| ServiceError::Validation("No markdown file was uploaded.".to_string()))?;
    Ok((ArticleMeta::from_pairs(&pairs), markdown))
}

/// Runs an article search. A path id overrides every other filter.
pub fn search_articles(db: &Database, id: Option<&str>, query: ArticleSearchQuery) -> ServiceResult<ArticleSearchResult> {
    let id = id.map(parse_article_id).transpose()?;
    let request = query.into_request();
    let article_query = ArticleQuery::search(id, &request)?;
    Ok(articles::run_query(db, &article_query)?)
}

pub fn articles_in_category(db: &Database, name: &str, query: ListingQuery) -> ServiceResult<ArticleSearchResult> {
    Ok(articles::articles_in_category(db, name, &query.into_params())?)
}

pub fn add_pv(db: &Database, raw_id: &str) -> ServiceResult<CounterUpdateResult> {
    Ok(articles::add_pv(db, parse_article_id(raw_id)?)?)
}

pub fn add_praise(db: &Database, raw_id: &str) -> ServiceResult<CounterUpdateResult> {
    Ok(articles::add_praise(db, parse_article_id(raw_id)?)?)
}

pub fn delete_article(db: &Database, raw_id: &str) -> ServiceResult<DeleteCount> {
    let count = articles::delete_article(db, parse_article_id(raw_id)?)?;
    if count > 0 {
        log::info!("Deleted article {}", raw_id);
    }
    Ok(DeleteCount { count })
}

pub fn set_flags(db: &Database, raw_id: &str, flags: ArticleFlags) -> ServiceResult<Article> {
    Ok(articles::set_flags(db, parse_article_id(raw_id)?, flags)?)
}

/// Files an existing article under a category. Returns whether the id was newly added.
pub fn archive_article(db: &Database, request: &ArchiveRequest) -> ServiceResult<bool> {
    let article_id = parse_article_id(&request.article_id)?;
    articles::get_article(db, article_id)?;
    Ok(categories::archive_article(db, request.category_name.trim(), &request.article_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::temp_db;
    use crate::models::db_operations::DbError;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn meta_reads_repeated_and_listed_fields() {
        let meta = ArticleMeta::from_pairs(&pairs(&[
            ("title", "Hello"),
            ("tags", "rust, web"),
            ("tags", "db"),
            ("categories", "notes"),
            ("draft_flag", "true"),
        ]));
        assert_eq!(meta.tags, vec!["rust", "web", "db"]);
        assert_eq!(meta.categories, vec!["notes"]);
        assert!(meta.draft_flag);
        assert!(!meta.overhead);
    }

    #[test]
    fn built_article_has_derived_fields() {
        let meta = ArticleMeta { title: "Rust <b>Tips</b>".into(), ..ArticleMeta::default() };
        let article = build_article(meta, "# Heading\n\nhello world".into(), Some("abc")).unwrap();
        assert_eq!(article.id, ObjectId::from_loose("abc").unwrap());
        assert_eq!(article.title, "Rust Tips");
        assert_eq!(article.title_words, "rust tips");
        assert!(article.md_words.contains("hello"));
        assert!(article.art_length > 0);
        assert_eq!(article.create_time, article.update_time);
        assert_eq!(article.reads_number, 0);
    }

    #[test]
    fn publish_defaults_author_and_rejects_duplicate_ids() {
        let (_dir, db) = temp_db();
        let meta = ArticleMeta { title: "First".into(), categories: vec!["notes".into()], ..ArticleMeta::default() };
        let created = publish_article(&db, meta.clone(), "body".into(), Some("post-1"), "ling").unwrap();
        assert_eq!(articles::get_article(&db, created.id).unwrap().author, "ling");
        assert_eq!(categories::category_search(&db, "notes").unwrap().unwrap().count, 1);

        let err = publish_article(&db, meta, "body".into(), Some("post-1"), "ling").unwrap_err();
        assert!(matches!(err, ServiceError::Db(DbError::Conflict(_))));
    }

    #[test]
    fn archive_requires_existing_article() {
        let (_dir, db) = temp_db();
        let request = ArchiveRequest { article_id: ObjectId::new().to_hex(), category_name: "notes".into() };
        assert!(matches!(archive_article(&db, &request).unwrap_err(), ServiceError::Db(DbError::NotFound(_))));

        let meta = ArticleMeta { title: "First".into(), ..ArticleMeta::default() };
        let created = publish_article(&db, meta, "body".into(), None, "ling").unwrap();
        let request = ArchiveRequest { article_id: created.id.to_hex(), category_name: "notes".into() };
        assert!(archive_article(&db, &request).unwrap());
        assert!(!archive_article(&db, &request).unwrap());
    }

    #[test]
    fn counters_and_delete_by_path_id() {
        let (_dir, db) = temp_db();
        let meta = ArticleMeta { title: "First".into(), ..ArticleMeta::default() };
        let created = publish_article(&db, meta, "body".into(), None, "ling").unwrap();
        let raw = created.id.to_hex();

        assert_eq!(add_pv(&db, &raw).unwrap().matched_count, 1);
        add_praise(&db, &raw).unwrap();
        let article = articles::get_article(&db, created.id).unwrap();
        assert_eq!((article.reads_number, article.praise_number), (1, 1));

        assert_eq!(delete_article(&db, &raw).unwrap().count, 1);
        assert_eq!(delete_article(&db, &raw).unwrap().count, 0);
        assert!(matches!(parse_article_id(" ").unwrap_err(), ServiceError::Validation(_)));
    }
}
