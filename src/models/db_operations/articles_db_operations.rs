use crate::helper::text_helpers;
use crate::models::db_operations::article_query::{self, ArticleFilter, ArticleQuery};
use crate::models::db_operations::{categories_db_operations, decode, encode, DbError, DbResult, ID_MAX, ID_MIN};
use crate::models::search_models::{ArticleSearchHit, ArticleSearchResult, ListingParams};
use crate::models::{Article, CounterUpdateResult, ObjectId};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};

pub const ARTICLES: TableDefinition<&[u8; 12], &str> = TableDefinition::new("articles");
/// (token, article id) -> weight, where a title occurrence weighs 2 and a body occurrence 1.
pub const ARTICLE_TOKEN_INDEX: TableDefinition<(&str, &[u8; 12]), u32> = TableDefinition::new("article_token_index");

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct ArticleFlags {
    pub delete_flag: Option<bool>,
    pub draft_flag: Option<bool>,
    pub overhead: Option<bool>,
}

fn token_weights(article: &Article) -> HashMap<String, u32> {
    let mut weights = text_helpers::term_frequencies(&article.md_words);
    for (token, count) in text_helpers::term_frequencies(&article.title_words) {
        *weights.entry(token).or_insert(0) += 2 * count;
    }
    weights
}

fn index_article_in(txn: &WriteTransaction, article: &Article) -> DbResult<()> {
    let mut token_index = txn.open_table(ARTICLE_TOKEN_INDEX)?;
    for (token, weight) in token_weights(article) {
        token_index.insert((token.as_str(), article.id.bytes()), weight)?;
    }
    Ok(())
}

fn unindex_article_in(txn: &WriteTransaction, article: &Article) -> DbResult<()> {
    let mut token_index = txn.open_table(ARTICLE_TOKEN_INDEX)?;
    for token in token_weights(article).keys() {
        token_index.remove((token.as_str(), article.id.bytes()))?;
    }
    Ok(())
}

fn load_in(txn: &WriteTransaction, id: ObjectId) -> DbResult<Option<Article>> {
    let table = txn.open_table(ARTICLES)?;
    let raw = table.get(id.bytes())?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

fn store_in(txn: &WriteTransaction, article: &Article) -> DbResult<()> {
    let json = encode(article)?;
    txn.open_table(ARTICLES)?.insert(article.id.bytes(), json.as_str())?;
    Ok(())
}

pub(crate) fn rebuild_indexes_in(txn: &WriteTransaction) -> DbResult<usize> {
    txn.delete_table(ARTICLE_TOKEN_INDEX)?;
    let articles: Vec<Article> = {
        let table = txn.open_table(ARTICLES)?;
        let mut articles = Vec::new();
        for item in table.iter()? {
            let (_key, value) = item?;
            articles.push(decode(value.value())?);
        }
        articles
    };
    for article in &articles {
        index_article_in(txn, article)?;
    }
    Ok(articles.len())
}

/// Stores a new article and archives it into each of its categories in the same transaction.
pub fn create_article(db: &Database, article: &Article) -> DbResult<()> {
    let write_txn = db.begin_write()?;
    {
        if load_in(&write_txn, article.id)?.is_some() {
            return Err(DbError::Conflict(format!("article {} already exists", article.id)));
        }
        store_in(&write_txn, article)?;
        index_article_in(&write_txn, article)?;
        for category in article.categories.iter().filter(|c| !c.trim().is_empty()) {
            categories_db_operations::archive_article_in(&write_txn, category.trim(), article.id)?;
        }
    }
    write_txn.commit()?;
    log::info!("Created article {} ({})", article.id, article.title);
    Ok(())
}

pub fn read_article(db: &Database, id: ObjectId) -> DbResult<Option<Article>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(ARTICLES)?;
    let raw = table.get(id.bytes())?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

pub fn get_article(db: &Database, id: ObjectId) -> DbResult<Article> {
    read_article(db, id)?.ok_or_else(|| DbError::NotFound(format!("article {}", id)))
}

fn increment(db: &Database, id: ObjectId, bump: impl FnOnce(&mut Article)) -> DbResult<CounterUpdateResult> {
    let write_txn = db.begin_write()?;
    let matched = {
        match load_in(&write_txn, id)? {
            Some(mut article) => {
                bump(&mut article);
                store_in(&write_txn, &article)?;
                1
            }
            None => 0,
        }
    };
    write_txn.commit()?;
    Ok(CounterUpdateResult { matched_count: matched, modified_count: matched, upserted_count: 0, id: id.to_hex() })
}

pub fn add_pv(db: &Database, id: ObjectId) -> DbResult<CounterUpdateResult> {
    increment(db, id, |a| a.reads_number += 1)
}

pub fn add_praise(db: &Database, id: ObjectId) -> DbResult<CounterUpdateResult> {
    increment(db, id, |a| a.praise_number += 1)
}

/// Hard delete. Returns the number of removed articles (0 or 1).
pub fn delete_article(db: &Database, id: ObjectId) -> DbResult<i64> {
    let write_txn = db.begin_write()?;
    let count = {
        match load_in(&write_txn, id)? {
            Some(article) => {
                unindex_article_in(&write_txn, &article)?;
                write_txn.open_table(ARTICLES)?.remove(id.bytes())?;
                categories_db_operations::pull_article_in(&write_txn, id)?;
                1
            }
            None => 0,
        }
    };
    write_txn.commit()?;
    Ok(count)
}

pub fn set_flags(db: &Database, id: ObjectId, flags: ArticleFlags) -> DbResult<Article> {
    let write_txn = db.begin_write()?;
    let article = {
        let mut article = load_in(&write_txn, id)?.ok_or_else(|| DbError::NotFound(format!("article {}", id)))?;
        if let Some(delete_flag) = flags.delete_flag {
            article.delete_flag = delete_flag;
        }
        if let Some(draft_flag) = flags.draft_flag {
            article.draft_flag = draft_flag;
        }
        if let Some(overhead) = flags.overhead {
            article.overhead = overhead;
        }
        article.update_time = Utc::now();
        store_in(&write_txn, &article)?;
        article
    };
    write_txn.commit()?;
    Ok(article)
}

fn candidates(db: &Database, filter: &ArticleFilter) -> DbResult<Vec<Article>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(ARTICLES)?;
    let fetch = |id: &[u8; 12]| -> DbResult<Option<Article>> {
        let raw = table.get(id)?.map(|guard| guard.value().to_string());
        raw.map(|r| decode(&r)).transpose()
    };

    let ids: Vec<[u8; 12]> = match filter {
        ArticleFilter::ById(id) => vec![*id.bytes()],
        ArticleFilter::InIds(ids) => ids.iter().map(|id| *id.bytes()).collect(),
        ArticleFilter::Text { tokens, .. } => {
            let token_index = read_txn.open_table(ARTICLE_TOKEN_INDEX)?;
            let mut ids = BTreeSet::new();
            for token in tokens {
                for item in token_index.range((token.as_str(), &ID_MIN)..=(token.as_str(), &ID_MAX))? {
                    let (key, _) = item?;
                    ids.insert(*key.value().1);
                }
            }
            ids.into_iter().collect()
        }
        ArticleFilter::All { .. } => {
            let mut articles = Vec::new();
            for item in table.iter()? {
                let (_key, value) = item?;
                articles.push(decode::<Article>(value.value())?);
            }
            return Ok(articles);
        }
    };

    let mut articles = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(article) = fetch(id)? {
            articles.push(article);
        }
    }
    Ok(articles)
}

/// Runs a prepared query. `total_count` counts every match, ignoring pagination.
pub fn run_query(db: &Database, query: &ArticleQuery) -> DbResult<ArticleSearchResult> {
    let tokens: &[String] = match &query.filter {
        ArticleFilter::Text { tokens, .. } => tokens,
        _ => &[],
    };

    let mut hits: Vec<ArticleSearchHit> = candidates(db, &query.filter)?
        .into_iter()
        .filter(|a| query.accepts(a))
        .map(|article| {
            let score = if query.scored { article_query::score(&article, tokens) } else { 0.0 };
            ArticleSearchHit { article, score }
        })
        .collect();
    hits.sort_by(|a, b| query.compare((&a.article, a.score), (&b.article, b.score)));

    let total_count = hits.len() as i64;
    let mut articles: Vec<ArticleSearchHit> =
        hits.into_iter().skip(query.pagination.skip).take(query.pagination.limit).collect();
    if query.lazy {
        for hit in &mut articles {
            hit.article.markdown.clear();
        }
    }

    let msg = if articles.is_empty() { "no article matched".to_string() } else { "ok".to_string() };
    Ok(ArticleSearchResult {
        ans_count: articles.len() as i64,
        articles,
        page_number: query.pagination.page_number,
        page_size: query.pagination.page_size,
        total_count,
        msg,
    })
}

/// Paginated listing of the articles archived under `category_name`.
pub fn articles_in_category(db: &Database, category_name: &str, params: &ListingParams) -> DbResult<ArticleSearchResult> {
    let category = categories_db_operations::category_search(db, category_name)?
        .ok_or_else(|| DbError::NotFound(format!("category '{}'", category_name)))?;
    let query = ArticleQuery::in_ids(category.article_ids, params)?;
    run_query(db, &query)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::db_operations::test_support::temp_db;
    use crate::models::search_models::{ArticleSearchRequest, TimeSort};
    use chrono::Duration;

    pub(crate) fn sample_article(title: &str, author: &str, markdown: &str, categories: &[&str]) -> Article {
        let now = Utc::now();
        Article {
            id: ObjectId::new(),
            title: title.to_string(),
            author: author.to_string(),
            synopsis: String::new(),
            pic_url: String::new(),
            markdown: markdown.to_string(),
            md_words: text_helpers::markdown_search_words(markdown),
            title_words: text_helpers::search_words(title),
            delete_flag: false,
            draft_flag: false,
            overhead: false,
            art_length: text_helpers::word_count(markdown),
            reads_number: 0,
            comments_number: 0,
            praise_number: 0,
            tags: Vec::new(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            create_time: now,
            update_time: now,
        }
    }

    fn search(db: &Database, id: Option<ObjectId>, text: &str, author: &str, params: ListingParams) -> ArticleSearchResult {
        let request = ArticleSearchRequest { search_text: text.to_string(), author: author.to_string(), params };
        run_query(db, &ArticleQuery::search(id, &request).unwrap()).unwrap()
    }

    #[test]
    fn create_archives_categories_and_rejects_duplicates() {
        let (_dir, db) = temp_db();
        let article = sample_article("Hello", "ann", "body", &["rust", "web"]);
        create_article(&db, &article).unwrap();
        assert!(matches!(create_article(&db, &article).unwrap_err(), DbError::Conflict(_)));

        let rust = categories_db_operations::category_search(&db, "rust").unwrap().unwrap();
        assert_eq!(rust.article_ids, vec![article.id]);
        assert_eq!(rust.count, 1);
    }

    #[test]
    fn page_far_past_the_end_is_empty() {
        let (_dir, db) = temp_db();
        create_article(&db, &sample_article("Hello", "ann", "body", &[])).unwrap();

        let params = ListingParams { page_number: i64::MAX, page_size: 10, ..ListingParams::default() };
        let res = search(&db, None, "", "", params);
        assert!(res.articles.is_empty());
        assert_eq!(res.total_count, 1);
        assert_eq!(res.page_number, i64::MAX);
    }

    #[test]
    fn counters_report_matches() {
        let (_dir, db) = temp_db();
        let article = sample_article("Hello", "ann", "body", &[]);
        create_article(&db, &article).unwrap();

        let res = add_pv(&db, article.id).unwrap();
        assert_eq!((res.matched_count, res.modified_count), (1, 1));
        add_praise(&db, article.id).unwrap();
        let stored = get_article(&db, article.id).unwrap();
        assert_eq!((stored.reads_number, stored.praise_number), (1, 1));

        assert_eq!(add_pv(&db, ObjectId::new()).unwrap().matched_count, 0);
    }

    #[test]
    fn delete_pulls_article_from_categories() {
        let (_dir, db) = temp_db();
        let article = sample_article("Hello", "ann", "body", &["rust"]);
        create_article(&db, &article).unwrap();

        assert_eq!(delete_article(&db, article.id).unwrap(), 1);
        assert_eq!(delete_article(&db, article.id).unwrap(), 0);
        let rust = categories_db_operations::category_search(&db, "rust").unwrap().unwrap();
        assert_eq!(rust.count, 0);
        assert!(search(&db, None, "hello", "", ListingParams::default()).articles.is_empty());
    }

    #[test]
    fn text_search_ranks_title_hits_higher() {
        let (_dir, db) = temp_db();
        let in_body = sample_article("Notes", "ann", "redb is an embedded store", &[]);
        let in_title = sample_article("Redb tips", "ann", "short body", &[]);
        let unrelated = sample_article("Cooking", "ann", "pasta", &[]);
        for a in [&in_body, &in_title, &unrelated] {
            create_article(&db, a).unwrap();
        }

        let result = search(&db, None, "REDB", "", ListingParams::default());
        assert_eq!(result.total_count, 2);
        assert_eq!(result.articles[0].article.id, in_title.id);
        assert_eq!(result.articles[0].score, 2.0);
        assert_eq!(result.articles[1].score, 1.0);
    }

    #[test]
    fn id_lookup_ignores_text_and_author() {
        let (_dir, db) = temp_db();
        let target = sample_article("Cooking", "bob", "pasta", &[]);
        create_article(&db, &target).unwrap();
        create_article(&db, &sample_article("Rust", "ann", "rust", &[])).unwrap();

        let result = search(&db, Some(target.id), "rust", "ann", ListingParams::default());
        assert_eq!(result.total_count, 1);
        assert_eq!(result.articles[0].article.id, target.id);
        assert_eq!(result.articles[0].score, 0.0);
    }

    #[test]
    fn paging_counts_total_and_lazy_clears_body() {
        let (_dir, db) = temp_db();
        for i in 0..15 {
            create_article(&db, &sample_article(&format!("post {}", i), "ann", "text", &[])).unwrap();
        }
        create_article(&db, &sample_article("other", "bob", "text", &[])).unwrap();

        let params = ListingParams { page_number: 2, page_size: 10, lazy: true, ..ListingParams::default() };
        let result = search(&db, None, "", "ann", params);
        assert_eq!(result.total_count, 15);
        assert_eq!(result.ans_count, 5);
        assert_eq!(result.page_number, 2);
        assert!(result.articles.iter().all(|h| h.article.markdown.is_empty()));
    }

    #[test]
    fn time_sort_and_category_listing() {
        let (_dir, db) = temp_db();
        let mut old = sample_article("old", "ann", "x", &["rust"]);
        old.create_time = Utc::now() - Duration::days(1);
        let new = sample_article("new", "ann", "x", &["rust"]);
        create_article(&db, &old).unwrap();
        create_article(&db, &new).unwrap();
        create_article(&db, &sample_article("elsewhere", "ann", "x", &["go"])).unwrap();

        let params = ListingParams {
            create_time_sort: TimeSort { sort_direction: -1, sort_flag: true },
            ..ListingParams::default()
        };
        let result = articles_in_category(&db, "rust", &params).unwrap();
        assert_eq!(result.total_count, 2);
        assert_eq!(result.articles[0].article.id, new.id);

        assert!(matches!(articles_in_category(&db, "missing", &params).unwrap_err(), DbError::NotFound(_)));
    }

    #[test]
    fn flags_update_soft_delete() {
        let (_dir, db) = temp_db();
        let article = sample_article("Hello", "ann", "body", &[]);
        create_article(&db, &article).unwrap();
        let updated = set_flags(&db, article.id, ArticleFlags { delete_flag: Some(true), ..ArticleFlags::default() })
            .unwrap();
        assert!(updated.delete_flag);
        assert!(!updated.draft_flag);
    }
}
