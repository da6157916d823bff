use crate::models::object_id::ObjectIdError;
use chrono::{DateTime, Utc};
use redb::{CommitError, StorageError, TableError, TransactionError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod albums_db_operations;
pub mod article_query;
pub mod articles_db_operations;
pub mod categories_db_operations;
pub mod image_categories_db_operations;
pub mod images_db_operations;
pub mod index_registry;
pub mod tags_db_operations;
pub mod users_db_operations;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("R2D2 pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Invalid id: {0}")]
    InvalidId(#[from] ObjectIdError),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Resource still holds images: {0}")]
    NotEmpty(String),
    #[error("Not a member: {0}")]
    NotMember(String),
}

pub type DbResult<T> = Result<T, DbError>;

pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> DbResult<T> {
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn encode<T: Serialize>(doc: &T) -> DbResult<String> {
    Ok(serde_json::to_string(doc)?)
}

/// Index key component that makes ascending key order read newest first.
pub(crate) fn newest_first(ts: DateTime<Utc>) -> i64 {
    -ts.timestamp_micros()
}

/// Pages an embedded reference list. A page or page size below 1 returns the whole list.
pub(crate) fn page_slice<T: Clone>(items: &[T], page: i64, page_size: i64) -> Vec<T> {
    if page < 1 || page_size < 1 {
        return items.to_vec();
    }
    let skip = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
    let take = usize::try_from(page_size).unwrap_or(usize::MAX);
    items.iter().skip(skip).take(take).cloned().collect()
}

pub(crate) const ID_MIN: [u8; 12] = [0u8; 12];
pub(crate) const ID_MAX: [u8; 12] = [255u8; 12];

#[cfg(test)]
pub(crate) mod test_support {
    use crate::setup::db_setup;
    use redb::Database;
    use tempfile::TempDir;

    /// Fresh database with every table created. Keep the `TempDir` alive for the test's duration.
    pub fn temp_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create(dir.path().join("picbed.db")).expect("create db");
        db_setup::setup_picbed_db(&db).expect("setup tables");
        (dir, db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_slice_returns_everything_for_invalid_paging() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(page_slice(&items, 0, 2), items);
        assert_eq!(page_slice(&items, 1, 0), items);
        assert_eq!(page_slice(&items, 2, 2), vec![3, 4]);
        assert_eq!(page_slice(&items, 3, 2), vec![5]);
        assert!(page_slice(&items, 4, 2).is_empty());
    }

    #[test]
    fn page_slice_past_the_end_is_empty_for_huge_pages() {
        let items = vec![1, 2, 3];
        assert!(page_slice(&items, i64::MAX, 2).is_empty());
        assert!(page_slice(&items, 2, i64::MAX).is_empty());
        assert_eq!(page_slice(&items, 1, i64::MAX), items);
    }
}
