use crate::helper::{ServiceError, ServiceResult};
use crate::models::ApiResponse;
use actix_web::error::InternalError;
use actix_web::{web, HttpResponse};
use serde::Serialize;

pub mod admin;
pub mod picbed;
pub mod public;

/// Wraps a helper result in the response envelope with the matching status.
pub fn reply<T: Serialize>(result: ServiceResult<T>) -> HttpResponse {
    match result {
        Ok(data) => HttpResponse::Ok().json(ApiResponse::success(data)),
        Err(e) => failure(e),
    }
}

/// Runs blocking work (hashing, image decoding) on the thread pool.
pub async fn blocking<T, F>(work: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    web::block(work).await?
}

pub fn failure(err: ServiceError) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        log::error!("Request failed: {}", err);
    } else {
        log::debug!("Request rejected ({}): {}", status, err);
    }
    HttpResponse::build(status).json(ApiResponse::failed(err.to_string()))
}

fn bad_request<E: std::fmt::Display + std::fmt::Debug + 'static>(err: E) -> actix_web::Error {
    let detail = err.to_string();
    InternalError::from_response(err, HttpResponse::BadRequest().json(ApiResponse::failed(detail))).into()
}

/// Extractor settings so malformed paths, queries and bodies also answer with the envelope.
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| bad_request(err)))
        .app_data(web::QueryConfig::default().error_handler(|err, _| bad_request(err)))
        .app_data(web::PathConfig::default().error_handler(|err, _| bad_request(err)));
}

/// Every JSON route under `/api`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(configure_extractors)
            .configure(admin::config)
            .configure(picbed::config)
            .configure(public::config_api),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::user_helpers::tests::memory_pool;
    use crate::models::db_operations::test_support::temp_db;
    use crate::models::{CODE_FAILED, CODE_SUCCESS};
    use actix_session::{storage::CookieSessionStore, SessionMiddleware};
    use actix_web::cookie::Key;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn register_login_publish_and_search() {
        let (_dir, db) = temp_db();
        let app = test::init_service(
            App::new()
                .wrap(SessionMiddleware::new(CookieSessionStore::default(), Key::generate()))
                .app_data(web::Data::new(db))
                .app_data(web::Data::new(memory_pool()))
                .configure(config_api),
        )
        .await;

        let anonymous = test::TestRequest::post()
            .uri("/api/admin/article")
            .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
            .set_payload("title=Nope&markdown=x")
            .to_request();
        let resp = test::call_service(&app, anonymous).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/register")
            .set_json(json!({"username": "ling", "password": "secret-pw", "email": "ling@example.com"}))
            .to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.code, CODE_SUCCESS);
        assert_eq!(body.data["username"], "ling");

        let req = test::TestRequest::post()
            .uri("/api/admin/login")
            .set_json(json!({"email": "ling@example.com", "password": "secret-pw"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.response().cookies().next().unwrap().into_owned();

        let req = test::TestRequest::post()
            .uri("/api/admin/article")
            .cookie(cookie.clone())
            .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
            .set_payload("title=Rust+Ownership&markdown=borrow+checker+rules&categories=notes")
            .to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.code, CODE_SUCCESS);
        assert_eq!(body.data["title"], "Rust Ownership");

        let req = test::TestRequest::get().uri("/api/article?search_text=ownership&lazy=true").to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.data["ans_count"], 1);
        assert_eq!(body.data["articles"][0]["author"], "ling");
        assert_eq!(body.data["articles"][0]["markdown"], "");

        let req = test::TestRequest::get().uri("/api/category/notes").to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.data["count"], 1);

        let req = test::TestRequest::get().uri("/api/category/missing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ApiResponse<String> = test::read_body_json(resp).await;
        assert_eq!(body.code, CODE_FAILED);
    }

    #[actix_web::test]
    async fn wrong_password_is_unauthorized() {
        let (_dir, db) = temp_db();
        let app = test::init_service(
            App::new()
                .wrap(SessionMiddleware::new(CookieSessionStore::default(), Key::generate()))
                .app_data(web::Data::new(db))
                .app_data(web::Data::new(memory_pool()))
                .configure(config_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({"email": "nobody@example.com", "password": "whatever"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
