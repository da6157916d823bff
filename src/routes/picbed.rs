use crate::helper::album_helpers::{self, MoveImageRequest};
use crate::helper::image_helpers::{self, PositionUpdate};
use crate::helper::tag_helpers;
use crate::helper::{ServiceError, ServiceResult};
use crate::middleware::{AuthenticatedUser, LoginRequiredForWrites};
use crate::models::db_operations::albums_db_operations::{self as albums, NewAlbum};
use crate::models::db_operations::image_categories_db_operations as image_categories;
use crate::models::db_operations::images_db_operations as images;
use crate::models::db_operations::tags_db_operations::{self as tags, DEFAULT_POPULAR_LIMIT};
use crate::models::{
    AlbumImageRef, AlbumPatch, AlbumPosition, CategoryPosition, ImageCategoryPatch, LayoutMode, NewImageCategory,
    NewTag, ObjectId, PageQuery, TagPatch,
};
use crate::routes::{blocking, reply};
use crate::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use redb::Database;
use serde::Deserialize;

#[derive(Deserialize)]
struct TagsBody {
    tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceImageBody {
    image_id: ObjectId,
    #[serde(default)]
    position: Option<CategoryPosition>,
    #[serde(default)]
    sort_order: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutBody {
    layout_mode: LayoutMode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SortBody {
    sort_order: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverBody {
    image_id: ObjectId,
}

#[derive(Deserialize)]
struct TagListQuery {
    category: Option<String>,
}

#[derive(Deserialize)]
struct PopularTagsQuery {
    limit: Option<usize>,
    category: Option<String>,
}

#[derive(Deserialize)]
struct KeywordQuery {
    keyword: String,
}

/// `/picbed`: reads are public, writes need a session.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/picbed")
            .wrap(LoginRequiredForWrites)
            .configure(config_albums)
            .configure(config_images)
            .configure(config_categories)
            .configure(config_tags),
    );
}

fn config_albums(cfg: &mut web::ServiceConfig) {
    cfg.route("/album", web::post().to(create_album))
        .route("/album", web::get().to(list_albums))
        .route("/album/tag/{tag}", web::get().to(albums_by_tag))
        .route("/album/author/{author}", web::get().to(albums_by_author))
        .route("/album/search/{keyword}", web::get().to(search_albums))
        .route("/album/{id}", web::get().to(get_album))
        .route("/album/{id}", web::put().to(update_album))
        .route("/album/{id}", web::delete().to(delete_album))
        .route("/album/{album_id}/image", web::put().to(put_album_image))
        .route("/album/{album_id}/image/{image_id}/layout", web::put().to(update_album_image_layout))
        .route("/album/{album_id}/image/{image_id}", web::delete().to(remove_album_image));
}

fn config_images(cfg: &mut web::ServiceConfig) {
    cfg.route("/image", web::post().to(upload_image))
        .route("/image", web::get().to(list_images))
        .route("/image/move", web::put().to(move_album_image))
        .route("/image/positions", web::put().to(batch_update_positions))
        .route("/image/tag/{tag}", web::get().to(images_by_tag))
        .route("/image/search/{keyword}", web::get().to(search_images))
        .route("/image/category/{category_id}", web::get().to(images_by_category))
        .route("/image/{id}", web::get().to(get_image))
        .route("/image/{id}", web::delete().to(delete_image))
        .route("/image/{id}/albums", web::get().to(albums_of_image))
        .route("/image/{id}/tags", web::put().to(update_image_tags))
        .route("/image/{id}/position/{category_id}", web::put().to(update_image_position))
        .route("/image/{id}/category/{category_id}", web::delete().to(remove_image_from_category));
}

fn config_categories(cfg: &mut web::ServiceConfig) {
    cfg.route("/category", web::post().to(create_category))
        .route("/category", web::get().to(list_categories))
        .route("/category/{id}", web::get().to(get_category))
        .route("/category/{id}", web::put().to(update_category))
        .route("/category/{id}", web::delete().to(delete_category))
        .route("/category/{id}/layout", web::put().to(update_category_layout))
        .route("/category/{id}/cover", web::put().to(set_category_cover))
        .route("/category/{id}/images", web::get().to(category_images))
        .route("/category/{id}/images", web::post().to(add_image_to_category))
        .route("/category/{id}/images/{image_id}", web::delete().to(remove_category_image))
        .route("/category/{id}/images/{image_id}/sort", web::put().to(update_category_sort));
}

fn config_tags(cfg: &mut web::ServiceConfig) {
    cfg.route("/tag", web::post().to(create_tag))
        .route("/tag", web::get().to(list_tags))
        .route("/tag/batch", web::post().to(batch_create_tags))
        .route("/tag/popular", web::get().to(popular_tags))
        .route("/tag/search", web::get().to(search_tags))
        .route("/tag/{id}", web::get().to(get_tag))
        .route("/tag/{id}", web::put().to(update_tag))
        .route("/tag/{id}", web::delete().to(delete_tag))
        .route("/tag/{id}/images", web::get().to(tag_images));
}

fn db_reply<T: serde::Serialize>(result: crate::models::db_operations::DbResult<T>) -> HttpResponse {
    reply(result.map_err(ServiceError::from))
}

// ====================================================================
// ============================= ALBUMS ===============================
// ====================================================================

async fn create_album(db: web::Data<Database>, user: AuthenticatedUser, body: web::Json<NewAlbum>) -> HttpResponse {
    reply(album_helpers::create_album(&db, body.into_inner(), &user.username))
}

async fn list_albums(db: web::Data<Database>, query: web::Query<PageQuery>) -> HttpResponse {
    reply(album_helpers::list_albums(&db, &query))
}

async fn albums_by_tag(db: web::Data<Database>, tag: web::Path<String>) -> HttpResponse {
    db_reply(albums::find_by_tag(&db, &tag))
}

async fn albums_by_author(db: web::Data<Database>, author: web::Path<String>) -> HttpResponse {
    db_reply(albums::find_by_author(&db, &author))
}

async fn search_albums(db: web::Data<Database>, keyword: web::Path<String>) -> HttpResponse {
    db_reply(albums::search_by_keyword(&db, &keyword))
}

async fn get_album(db: web::Data<Database>, id: web::Path<ObjectId>) -> HttpResponse {
    db_reply(albums::get_album(&db, *id))
}

async fn update_album(db: web::Data<Database>, id: web::Path<ObjectId>, body: web::Json<AlbumPatch>) -> HttpResponse {
    reply(album_helpers::update_album(&db, *id, body.into_inner()))
}

async fn delete_album(db: web::Data<Database>, id: web::Path<ObjectId>) -> HttpResponse {
    db_reply(albums::delete_album(&db, *id))
}

async fn put_album_image(
    db: web::Data<Database>,
    album_id: web::Path<ObjectId>,
    body: web::Json<AlbumImageRef>,
) -> HttpResponse {
    reply(album_helpers::put_image_ref(&db, *album_id, body.into_inner()))
}

async fn update_album_image_layout(
    db: web::Data<Database>,
    path: web::Path<(ObjectId, ObjectId)>,
    body: web::Json<AlbumPosition>,
) -> HttpResponse {
    let (album_id, image_id) = path.into_inner();
    db_reply(albums::update_image_layout(&db, album_id, image_id, body.into_inner()))
}

async fn remove_album_image(db: web::Data<Database>, path: web::Path<(ObjectId, ObjectId)>) -> HttpResponse {
    let (album_id, image_id) = path.into_inner();
    db_reply(albums::remove_image_ref(&db, album_id, image_id))
}

async fn move_album_image(db: web::Data<Database>, body: web::Json<MoveImageRequest>) -> HttpResponse {
    reply(album_helpers::move_image(&db, &body))
}

// ====================================================================
// ============================= IMAGES ===============================
// ====================================================================

async fn upload_image(db: web::Data<Database>, state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let result: ServiceResult<_> = async {
        let upload = image_helpers::read_image_upload(payload, state.upload.max_upload_bytes).await?;
        let (db, state) = (db.into_inner(), state.into_inner());
        blocking(move || image_helpers::store_image(&db, state.storage.as_ref(), &state.upload, upload)).await
    }
    .await;
    reply(result)
}

async fn list_images(db: web::Data<Database>, query: web::Query<PageQuery>) -> HttpResponse {
    let (limit, offset) = query.limit_offset();
    db_reply(images::list_images(&db, limit, offset).map(|(items, total)| query.wrap(items, total)))
}

async fn images_by_tag(db: web::Data<Database>, tag: web::Path<String>) -> HttpResponse {
    db_reply(images::find_images_by_tag(&db, &tag))
}

async fn search_images(db: web::Data<Database>, keyword: web::Path<String>) -> HttpResponse {
    db_reply(images::search_images_by_name(&db, &keyword))
}

async fn images_by_category(
    db: web::Data<Database>,
    category_id: web::Path<String>,
    query: web::Query<PageQuery>,
) -> HttpResponse {
    let result = images::get_images_by_category(&db, &category_id, query.page(), query.page_size());
    db_reply(result.map(|(items, total)| query.wrap(items, total)))
}

async fn get_image(db: web::Data<Database>, id: web::Path<ObjectId>) -> HttpResponse {
    db_reply(images::get_image(&db, *id))
}

async fn delete_image(db: web::Data<Database>, state: web::Data<AppState>, id: web::Path<ObjectId>) -> HttpResponse {
    let (db, state, id) = (db.into_inner(), state.into_inner(), *id);
    reply(blocking(move || image_helpers::remove_image(&db, state.storage.as_ref(), id)).await)
}

async fn albums_of_image(db: web::Data<Database>, id: web::Path<ObjectId>) -> HttpResponse {
    db_reply(albums::albums_containing_image(&db, *id))
}

async fn update_image_tags(db: web::Data<Database>, id: web::Path<ObjectId>, body: web::Json<TagsBody>) -> HttpResponse {
    reply(tag_helpers::update_image_tags(&db, *id, body.into_inner().tags))
}

async fn update_image_position(
    db: web::Data<Database>,
    path: web::Path<(ObjectId, String)>,
    body: web::Json<CategoryPosition>,
) -> HttpResponse {
    let (image_id, category_id) = path.into_inner();
    db_reply(images::update_position(&db, image_id, &category_id, body.into_inner()))
}

async fn batch_update_positions(db: web::Data<Database>, body: web::Json<Vec<PositionUpdate>>) -> HttpResponse {
    reply(Ok::<_, ServiceError>(image_helpers::batch_update_positions(&db, body.into_inner())))
}

async fn remove_image_from_category(db: web::Data<Database>, path: web::Path<(ObjectId, String)>) -> HttpResponse {
    let (image_id, category_id) = path.into_inner();
    db_reply(images::remove_from_category(&db, &category_id, image_id))
}

// ====================================================================
// ========================= IMAGE CATEGORIES =========================
// ====================================================================

async fn create_category(db: web::Data<Database>, body: web::Json<NewImageCategory>) -> HttpResponse {
    db_reply(image_categories::create_category(&db, body.into_inner()))
}

async fn list_categories(db: web::Data<Database>) -> HttpResponse {
    db_reply(image_categories::list_categories(&db))
}

async fn get_category(db: web::Data<Database>, id: web::Path<String>) -> HttpResponse {
    db_reply(image_categories::get_category(&db, &id))
}

async fn update_category(
    db: web::Data<Database>,
    id: web::Path<String>,
    body: web::Json<ImageCategoryPatch>,
) -> HttpResponse {
    db_reply(image_categories::update_category(&db, &id, body.into_inner()))
}

async fn delete_category(db: web::Data<Database>, id: web::Path<String>) -> HttpResponse {
    db_reply(image_categories::delete_category(&db, &id))
}

async fn update_category_layout(db: web::Data<Database>, id: web::Path<String>, body: web::Json<LayoutBody>) -> HttpResponse {
    db_reply(image_categories::update_layout_mode(&db, &id, body.layout_mode))
}

async fn set_category_cover(db: web::Data<Database>, id: web::Path<String>, body: web::Json<CoverBody>) -> HttpResponse {
    db_reply(image_categories::set_cover(&db, &id, body.image_id))
}

async fn category_images(db: web::Data<Database>, id: web::Path<String>, query: web::Query<PageQuery>) -> HttpResponse {
    let result = image_categories::get_category_images(&db, &id, query.page(), query.page_size());
    db_reply(result.map(|(items, total)| query.wrap(items, total)))
}

async fn add_image_to_category(
    db: web::Data<Database>,
    id: web::Path<String>,
    body: web::Json<PlaceImageBody>,
) -> HttpResponse {
    let body = body.into_inner();
    db_reply(images::place_in_category(&db, &id, body.image_id, body.position, body.sort_order))
}

async fn remove_category_image(db: web::Data<Database>, path: web::Path<(String, ObjectId)>) -> HttpResponse {
    let (category_id, image_id) = path.into_inner();
    db_reply(images::remove_from_category(&db, &category_id, image_id))
}

async fn update_category_sort(
    db: web::Data<Database>,
    path: web::Path<(String, ObjectId)>,
    body: web::Json<SortBody>,
) -> HttpResponse {
    let (category_id, image_id) = path.into_inner();
    db_reply(image_categories::update_sort_order(&db, &category_id, image_id, body.sort_order))
}

// ====================================================================
// ============================== TAGS ================================
// ====================================================================

async fn create_tag(db: web::Data<Database>, body: web::Json<NewTag>) -> HttpResponse {
    db_reply(tags::create_tag(&db, body.into_inner()))
}

async fn batch_create_tags(db: web::Data<Database>, body: web::Json<Vec<NewTag>>) -> HttpResponse {
    reply(Ok::<_, ServiceError>(tag_helpers::batch_create_tags(&db, body.into_inner())))
}

async fn list_tags(db: web::Data<Database>, query: web::Query<TagListQuery>) -> HttpResponse {
    db_reply(tags::list_tags(&db, query.category.as_deref()))
}

async fn popular_tags(db: web::Data<Database>, query: web::Query<PopularTagsQuery>) -> HttpResponse {
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_POPULAR_LIMIT);
    db_reply(tags::popular_tags(&db, limit, query.category.as_deref()))
}

async fn search_tags(db: web::Data<Database>, query: web::Query<KeywordQuery>) -> HttpResponse {
    db_reply(tags::search_tags(&db, &query.keyword))
}

async fn get_tag(db: web::Data<Database>, id: web::Path<String>) -> HttpResponse {
    db_reply(tags::get_tag(&db, &id))
}

async fn update_tag(db: web::Data<Database>, id: web::Path<String>, body: web::Json<TagPatch>) -> HttpResponse {
    db_reply(tags::update_tag(&db, &id, body.into_inner()))
}

async fn delete_tag(db: web::Data<Database>, id: web::Path<String>) -> HttpResponse {
    db_reply(tags::delete_tag(&db, &id))
}

async fn tag_images(db: web::Data<Database>, id: web::Path<String>, query: web::Query<PageQuery>) -> HttpResponse {
    let result = tags::get_tag_images(&db, &id, query.page(), query.page_size());
    db_reply(result.map(|(items, total)| query.wrap(items, total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::image_helpers::UploadSettings;
    use crate::helper::storage::LocalObjectStorage;
    use crate::middleware::start_session;
    use crate::models::db_operations::test_support::temp_db;
    use crate::models::{ApiResponse, User, CODE_FAILED, CODE_SUCCESS};
    use actix_session::{storage::CookieSessionStore, Session, SessionMiddleware};
    use actix_web::cookie::Key;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::sync::Arc;

    async fn test_login(session: Session) -> HttpResponse {
        let user = User {
            id: 7,
            username: "ling".to_string(),
            user_level: 1,
            is_lock: false,
            email: "ling@example.com".to_string(),
            phone: String::new(),
            brief: String::new(),
            new_time: None,
            create_time: String::new(),
            update_time: String::new(),
        };
        start_session(&session, &user).unwrap();
        HttpResponse::Ok().finish()
    }

    fn app_state(media: &std::path::Path) -> web::Data<AppState> {
        web::Data::new(AppState {
            storage: Arc::new(LocalObjectStorage::new(media, "http://localhost:8080").unwrap()),
            upload: UploadSettings {
                bucket_prefix: "picbed".to_string(),
                max_upload_bytes: 1024 * 1024,
                thumbnail_max_width: 300,
                thumbnail_max_height: 300,
                thumbnail_quality: 85,
            },
        })
    }

    macro_rules! picbed_app {
        ($db:expr, $state:expr) => {
            test::init_service(
                App::new()
                    .wrap(SessionMiddleware::new(CookieSessionStore::default(), Key::generate()))
                    .app_data($db.clone())
                    .app_data($state.clone())
                    .route("/test-login", web::post().to(test_login))
                    .service(web::scope("/api").configure(crate::routes::configure_extractors).configure(config)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn anonymous_writes_are_rejected_but_reads_pass() {
        let (_dir, db) = temp_db();
        let media = tempfile::tempdir().unwrap();
        let (db, state) = (web::Data::new(db), app_state(media.path()));
        let app = picbed_app!(db, state);

        let req = test::TestRequest::post().uri("/api/picbed/tag").set_json(serde_json::json!({"name": "sky"})).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ApiResponse<String> = test::read_body_json(resp).await;
        assert_eq!(body.code, CODE_FAILED);

        let req = test::TestRequest::get().uri("/api/picbed/category").to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.code, CODE_SUCCESS);
        assert_eq!(body.data[0]["id"], "nexus");
    }

    #[actix_web::test]
    async fn logged_in_user_creates_album_and_tags() {
        let (_dir, db) = temp_db();
        let media = tempfile::tempdir().unwrap();
        let (db, state) = (web::Data::new(db), app_state(media.path()));
        let app = picbed_app!(db, state);

        let login = test::call_service(&app, test::TestRequest::post().uri("/test-login").to_request()).await;
        let cookie = login.response().cookies().next().unwrap().into_owned();

        let req = test::TestRequest::post()
            .uri("/api/picbed/album")
            .cookie(cookie.clone())
            .set_json(serde_json::json!({"title": "Summer"}))
            .to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.code, CODE_SUCCESS);
        assert_eq!(body.data["author"], "ling");
        assert_eq!(body.data["visibility"], "private");

        let req = test::TestRequest::post()
            .uri("/api/picbed/tag/batch")
            .cookie(cookie)
            .set_json(serde_json::json!([{"name": "Sky"}, {"name": "sky"}]))
            .to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.data["value"], serde_json::json!(["sky"]));
        assert_eq!(body.data["warnings"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::get().uri("/api/picbed/tag/Sky").to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.code, CODE_SUCCESS);
        assert_eq!(body.data["id"], "sky");
    }

    #[actix_web::test]
    async fn domain_errors_keep_the_envelope() {
        let (_dir, db) = temp_db();
        let media = tempfile::tempdir().unwrap();
        let (db, state) = (web::Data::new(db), app_state(media.path()));
        let app = picbed_app!(db, state);

        let req = test::TestRequest::get().uri("/api/picbed/tag/unknown").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/picbed/image?page=9223372036854775807&page_size=20").to_request();
        let body: ApiResponse<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.code, CODE_SUCCESS);
        assert!(body.data["items"].as_array().unwrap().is_empty());

        let req = test::TestRequest::get().uri("/api/picbed/album/not-an-id").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiResponse<String> = test::read_body_json(resp).await;
        assert_eq!(body.msg, "failed");
    }
}
