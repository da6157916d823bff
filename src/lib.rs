use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::helper::image_helpers::UploadSettings;
use crate::helper::storage::ObjectStorage;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared services that are not plain databases.
pub struct AppState {
    pub storage: Arc<dyn ObjectStorage>,
    pub upload: UploadSettings,
}

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
