use crate::helper::user_helpers::{self, LoginRequest, RegisterRequest};
use crate::helper::{article_helpers, ServiceError};
use crate::middleware::start_session;
use crate::models::db_operations::categories_db_operations as categories;
use crate::models::db_operations::DbError;
use crate::models::search_models::{ArticleSearchQuery, ListingQuery};
use crate::routes::{blocking, reply};
use crate::DbPool;
use actix_session::Session;
use actix_web::{web, HttpResponse, Responder};
use redb::Database;

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/is_server_active", web::get().to(is_server_active))
        .route("/login", web::post().to(login))
        .route("/register", web::post().to(register))
        .route("/logout", web::post().to(logout))
        .route("/article", web::get().to(search_articles))
        .route("/article/category/{name}", web::get().to(articles_in_category))
        .route("/article/{id}", web::get().to(get_article))
        .route("/article/{id}/pv", web::put().to(add_pv))
        .route("/article/{id}/praise", web::put().to(add_praise))
        .route("/category", web::get().to(all_categories))
        .route("/category/{name}", web::get().to(get_category));
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

/// Checks the credentials and opens a session. Shared by the admin scope.
pub async fn login(session: Session, pool: web::Data<DbPool>, body: web::Json<LoginRequest>) -> HttpResponse {
    let request = body.into_inner();
    let pool = pool.into_inner();
    reply(
        async move {
            let user = blocking(move || user_helpers::login(&pool, &request)).await?;
            start_session(&session, &user)?;
            log::info!("User '{}' logged in", user.email);
            Ok::<_, ServiceError>(user_helpers::login_result(&user))
        }
        .await,
    )
}

async fn register(pool: web::Data<DbPool>, body: web::Json<RegisterRequest>) -> HttpResponse {
    let request = body.into_inner();
    let pool = pool.into_inner();
    reply(blocking(move || user_helpers::register(&pool, request)).await)
}

async fn logout(session: Session) -> HttpResponse {
    session.purge();
    reply(Ok("logged out"))
}

async fn search_articles(db: web::Data<Database>, query: web::Query<ArticleSearchQuery>) -> HttpResponse {
    reply(article_helpers::search_articles(&db, None, query.into_inner()))
}

async fn get_article(
    db: web::Data<Database>,
    id: web::Path<String>,
    query: web::Query<ArticleSearchQuery>,
) -> HttpResponse {
    reply(article_helpers::search_articles(&db, Some(id.as_str()), query.into_inner()))
}

async fn articles_in_category(
    db: web::Data<Database>,
    name: web::Path<String>,
    query: web::Query<ListingQuery>,
) -> HttpResponse {
    reply(article_helpers::articles_in_category(&db, &name, query.into_inner()))
}

async fn add_pv(db: web::Data<Database>, id: web::Path<String>) -> HttpResponse {
    reply(article_helpers::add_pv(&db, &id))
}

async fn add_praise(db: web::Data<Database>, id: web::Path<String>) -> HttpResponse {
    reply(article_helpers::add_praise(&db, &id))
}

async fn all_categories(db: web::Data<Database>) -> HttpResponse {
    reply(categories::all_categories(&db).map_err(ServiceError::from))
}

async fn get_category(db: web::Data<Database>, name: web::Path<String>) -> HttpResponse {
    let result = categories::category_search(&db, &name)
        .and_then(|found| found.ok_or_else(|| DbError::NotFound(format!("category '{}'", name))));
    reply(result.map_err(ServiceError::from))
}
