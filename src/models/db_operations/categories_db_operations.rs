use crate::models::db_operations::{decode, encode, DbError, DbResult};
use crate::models::{ArticleCategory, CategoryListResult, ObjectId};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

/// Article categories keyed by name.
pub const CATEGORIES: TableDefinition<&str, &str> = TableDefinition::new("categories");

fn load_in(txn: &WriteTransaction, name: &str) -> DbResult<Option<ArticleCategory>> {
    let table = txn.open_table(CATEGORIES)?;
    let raw = table.get(name)?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

fn store_in(txn: &WriteTransaction, category: &ArticleCategory) -> DbResult<()> {
    let json = encode(category)?;
    txn.open_table(CATEGORIES)?.insert(category.name.as_str(), json.as_str())?;
    Ok(())
}

/// Adds the article to the named category, creating the category when needed.
/// Returns whether the article was newly added.
pub(crate) fn archive_article_in(txn: &WriteTransaction, name: &str, article_id: ObjectId) -> DbResult<bool> {
    if name.trim().is_empty() {
        return Err(DbError::Validation("category name must not be empty".to_string()));
    }
    let mut category = load_in(txn, name)?.unwrap_or_else(|| ArticleCategory::empty(name));
    if category.article_ids.contains(&article_id) {
        // Lazily created categories are still persisted.
        store_in(txn, &category)?;
        return Ok(false);
    }
    category.article_ids.push(article_id);
    category.count = category.article_ids.len() as i64;
    store_in(txn, &category)?;
    Ok(true)
}

/// Removes the article from every category listing it. Returns the number of categories touched.
pub(crate) fn pull_article_in(txn: &WriteTransaction, article_id: ObjectId) -> DbResult<usize> {
    let holding: Vec<ArticleCategory> = {
        let table = txn.open_table(CATEGORIES)?;
        let mut holding = Vec::new();
        for item in table.iter()? {
            let (_key, value) = item?;
            let category: ArticleCategory = decode(value.value())?;
            if category.article_ids.contains(&article_id) {
                holding.push(category);
            }
        }
        holding
    };
    for mut category in holding.iter().cloned() {
        category.article_ids.retain(|id| *id != article_id);
        category.count = category.article_ids.len() as i64;
        store_in(txn, &category)?;
    }
    Ok(holding.len())
}

pub fn category_search(db: &Database, name: &str) -> DbResult<Option<ArticleCategory>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(CATEGORIES)?;
    let raw = table.get(name)?.map(|guard| guard.value().to_string());
    raw.map(|r| decode(&r)).transpose()
}

pub fn exists_category(db: &Database, name: &str) -> DbResult<bool> {
    Ok(category_search(db, name)?.is_some())
}

pub fn add_category(db: &Database, name: &str) -> DbResult<ArticleCategory> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::Validation("category name must not be empty".to_string()));
    }
    let category = ArticleCategory::empty(name);
    let write_txn = db.begin_write()?;
    {
        if load_in(&write_txn, name)?.is_some() {
            return Err(DbError::Conflict(format!("category '{}' already exists", name)));
        }
        store_in(&write_txn, &category)?;
    }
    write_txn.commit()?;
    Ok(category)
}

pub fn all_categories(db: &Database) -> DbResult<CategoryListResult> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(CATEGORIES)?;
    let mut categories = Vec::new();
    for item in table.iter()? {
        let (_key, value) = item?;
        categories.push(decode::<ArticleCategory>(value.value())?);
    }
    let total_count = categories.len() as i64;
    Ok(CategoryListResult { categories, total_count })
}

pub fn archive_article(db: &Database, name: &str, article_id: &str) -> DbResult<bool> {
    if article_id.trim().is_empty() {
        return Err(DbError::Validation("article id must not be empty".to_string()));
    }
    let article_id = ObjectId::from_loose(article_id.trim())?;
    let write_txn = db.begin_write()?;
    let added = archive_article_in(&write_txn, name.trim(), article_id)?;
    write_txn.commit()?;
    Ok(added)
}
