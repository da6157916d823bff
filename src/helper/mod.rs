use crate::helper::storage::StorageError;
use crate::models::db_operations::DbError;
use crate::models::object_id::ObjectIdError;
use actix_web::http::StatusCode;
use thiserror::Error;

pub mod album_helpers;
pub mod article_helpers;
pub mod form_helpers;
pub mod image_helpers;
pub mod sanitization_helpers;
pub mod storage;
pub mod tag_helpers;
pub mod text_helpers;
pub mod user_helpers;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid id: {0}")]
    InvalidId(#[from] ObjectIdError),
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error("Image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
    #[error("Session error: {0}")]
    Session(#[from] actix_session::SessionInsertError),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Upload too large: {0}")]
    TooLarge(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// Stored as text since `MultipartError` is not `Send`.
impl From<actix_multipart::MultipartError> for ServiceError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        ServiceError::Multipart(err.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_)
            | ServiceError::TooLarge(_)
            | ServiceError::InvalidId(_)
            | ServiceError::Image(_)
            | ServiceError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Db(db) => match db {
                DbError::Validation(_) | DbError::InvalidId(_) => StatusCode::BAD_REQUEST,
                DbError::NotFound(_) => StatusCode::NOT_FOUND,
                DbError::Conflict(_) | DbError::NotEmpty(_) | DbError::NotMember(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServiceError::Storage(StorageError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ServiceError::Storage(StorageError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (ServiceError::Db(DbError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (ServiceError::Db(DbError::NotEmpty("x".into())), StatusCode::CONFLICT),
            (ServiceError::Db(DbError::NotMember("x".into())), StatusCode::CONFLICT),
            (ServiceError::Db(DbError::Validation("x".into())), StatusCode::BAD_REQUEST),
            (ServiceError::TooLarge("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::from(actix_multipart::MultipartError::Incomplete), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    fn assert_send<T: Send>() {}

    #[test]
    fn service_results_can_leave_the_blocking_pool() {
        assert_send::<ServiceError>();
        assert_send::<ServiceResult<Vec<u8>>>();
    }
}
