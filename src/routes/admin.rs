use crate::helper::article_helpers::{self, ArchiveRequest, ArticleCreated, ArticleMeta};
use crate::helper::form_helpers::parse_form;
use crate::helper::{ServiceError, ServiceResult};
use crate::middleware::{login_guard, AuthenticatedUser};
use crate::models::db_operations::articles_db_operations::ArticleFlags;
use crate::models::db_operations::categories_db_operations as categories;
use crate::models::ApiResponse;
use crate::routes::{public, reply};
use crate::AppState;
use actix_multipart::Multipart;
use actix_session::SessionExt;
use actix_web::{guard, web, HttpResponse};
use redb::Database;
use serde::Deserialize;

#[derive(Deserialize)]
struct NewCategoryRequest {
    name: String,
}

/// `/admin`: login is open, everything else needs a session.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .configure(config_login)
            .service(
                web::scope("")
                    .guard(guard::fn_guard(|ctx| login_guard(&ctx.get_session())))
                    .configure(config_dashboard),
            )
            .default_service(web::to(login_required)),
    );
}

pub fn config_login(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(public::login));
}

pub fn config_dashboard(cfg: &mut web::ServiceConfig) {
    cfg.route("/article", web::post().to(create_article_form))
        .route("/article/upload", web::post().to(create_article_file))
        .route("/article/upload/{id}", web::post().to(create_article_file_with_id))
        .route("/article/{id}", web::post().to(create_article_form_with_id))
        .route("/article/{id}", web::delete().to(delete_article))
        .route("/article/{id}/flags", web::put().to(set_flags))
        .route("/category", web::post().to(add_category))
        .route("/category/archive", web::post().to(archive_article));
}

async fn login_required() -> HttpResponse {
    HttpResponse::Unauthorized().json(ApiResponse::failed("Login required."))
}

fn publish_from_form(db: &Database, body: &web::Bytes, id: Option<&str>, user: &AuthenticatedUser) -> ServiceResult<ArticleCreated> {
    let pairs = parse_form(body)?;
    let markdown = pairs.iter().find(|(k, _)| k == "markdown").map(|(_, v)| v.clone()).unwrap_or_default();
    let meta = ArticleMeta::from_pairs(&pairs);
    article_helpers::publish_article(db, meta, markdown, id, &user.username)
}

async fn create_article_form(db: web::Data<Database>, user: AuthenticatedUser, body: web::Bytes) -> HttpResponse {
    reply(publish_from_form(&db, &body, None, &user))
}

async fn create_article_form_with_id(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    reply(publish_from_form(&db, &body, Some(id.as_str()), &user))
}

async fn publish_from_upload(
    db: &Database,
    state: &AppState,
    payload: Multipart,
    id: Option<&str>,
    user: &AuthenticatedUser,
) -> ServiceResult<ArticleCreated> {
    let (meta, markdown) = article_helpers::read_markdown_upload(payload, state.upload.max_upload_bytes).await?;
    article_helpers::publish_article(db, meta, markdown, id, &user.username)
}

async fn create_article_file(
    db: web::Data<Database>,
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: Multipart,
) -> HttpResponse {
    reply(publish_from_upload(&db, &state, payload, None, &user).await)
}

async fn create_article_file_with_id(
    db: web::Data<Database>,
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    payload: Multipart,
) -> HttpResponse {
    reply(publish_from_upload(&db, &state, payload, Some(id.as_str()), &user).await)
}

async fn delete_article(db: web::Data<Database>, id: web::Path<String>) -> HttpResponse {
    reply(article_helpers::delete_article(&db, &id))
}

async fn set_flags(db: web::Data<Database>, id: web::Path<String>, flags: web::Json<ArticleFlags>) -> HttpResponse {
    reply(article_helpers::set_flags(&db, &id, flags.into_inner()))
}

async fn add_category(db: web::Data<Database>, body: web::Json<NewCategoryRequest>) -> HttpResponse {
    reply(categories::add_category(&db, body.name.trim()).map_err(ServiceError::from))
}

async fn archive_article(db: web::Data<Database>, body: web::Json<ArchiveRequest>) -> HttpResponse {
    reply(article_helpers::archive_article(&db, &body))
}
