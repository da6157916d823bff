use crate::models::db_operations::{
    albums_db_operations as albums, articles_db_operations as articles, categories_db_operations as categories,
    image_categories_db_operations as image_categories, images_db_operations as images, index_registry,
    tags_db_operations as tags, DbError,
};
use redb::{CommitError, Database, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub fn setup_users_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    log::info!("Creating 'users' table");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            user_level INTEGER NOT NULL DEFAULT 1,
            is_lock INTEGER NOT NULL DEFAULT 0,
            email TEXT NOT NULL UNIQUE,
            phone TEXT NOT NULL DEFAULT '',
            brief TEXT NOT NULL DEFAULT '',
            new_time TEXT,
            create_time TEXT NOT NULL,
            update_time TEXT NOT NULL
        )",
        [],
    )?;
    tx.commit()?;
    Ok(())
}

/// Creates every document and index table, registers the indexes and
/// makes sure the default image category exists.
pub fn setup_picbed_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        log::info!("Creating document tables");
        write_txn.open_table(articles::ARTICLES)?;
        write_txn.open_table(categories::CATEGORIES)?;
        write_txn.open_table(images::IMAGES)?;
        write_txn.open_table(image_categories::IMAGE_CATEGORIES)?;
        write_txn.open_table(tags::TAGS)?;
        write_txn.open_table(albums::ALBUMS)?;

        log::info!("Creating index tables");
        write_txn.open_table(images::IMAGE_URL_UNIQUE)?;
        write_txn.open_table(images::IMAGE_TAG_INDEX)?;
        write_txn.open_table(images::IMAGE_UPLOADED_INDEX)?;
        write_txn.open_table(albums::ALBUM_CREATED_INDEX)?;
        write_txn.open_table(albums::ALBUM_TEXT_INDEX)?;
        write_txn.open_table(albums::ALBUM_AUTHOR_INDEX)?;
        write_txn.open_table(albums::ALBUM_TAG_INDEX)?;
        write_txn.open_table(albums::ALBUM_VISIBILITY_INDEX)?;
        write_txn.open_table(albums::ALBUM_COVER_INDEX)?;
        write_txn.open_table(albums::ALBUM_IMAGE_REF_INDEX)?;
        write_txn.open_table(articles::ARTICLE_TOKEN_INDEX)?;
        write_txn.open_table(index_registry::INDEX_REGISTRY)?;
    }
    write_txn.commit()?;

    index_registry::ensure_indexes(db)?;
    image_categories::ensure_default_categories(db)?;
    Ok(())
}
