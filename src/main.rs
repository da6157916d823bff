use actix_cors::Cors;
use actix_web::{web, App, HttpServer, middleware::{Logger, DefaultHeaders}, cookie::Key, HttpResponse, Responder};
use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use picbed_backend::{
    config::Config,
    helper::storage::LocalObjectStorage,
    models::db_operations::index_registry,
    routes,
    AppState,
};
use redb::Database;
use r2d2_sqlite::SqliteConnectionManager;
use r2d2::Pool;
use std::fs;
use std::sync::Arc;
use clap::Parser;
use std::path::PathBuf;
use std::convert::TryFrom;

/// A simple handler for the root URL.
async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "picbed_server", author, version, about = "Starts the blog and picture bed web server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    fs::create_dir_all(&config.database_path)
        .expect("Failed to create database directory");
    fs::create_dir_all(&config.media_path)
        .expect("Failed to create media directory");

    let picbed_db = Database::open(config.picbed_db_path())
        .expect("FATAL: picbed.db not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'");
    match index_registry::ensure_indexes(&picbed_db) {
        Ok(created) if !created.is_empty() => log::info!("Registered missing indexes: {:?}", created),
        Ok(_) => {}
        Err(e) => log::warn!("Could not verify index registry: {}", e),
    }
    let picbed_db = web::Data::new(picbed_db);

    let manager = SqliteConnectionManager::file(config.users_db_path());
    let pool = Pool::builder()
        .build(manager)
        .expect("FATAL: Failed to create Rusqlite connection pool.");

    let storage = LocalObjectStorage::new(&config.media_path, &config.public_base_url)
        .expect("FATAL: PUBLIC_BASE_URL is not a valid URL.");
    let upload = config.upload_settings();
    let max_upload_bytes = upload.max_upload_bytes;

    let app_state = web::Data::new(AppState {
        storage: Arc::new(storage),
        upload,
    });

    let session_key_bytes = hex::decode(&config.session_secret_key)
        .expect("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string.");
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .expect("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required).");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(actix_web::cookie::SameSite::Lax)
            .build();

        let cors = {
            let allowed_origins_str = &config.allowed_origins;
            let base = if allowed_origins_str.trim() == "*" {
                Cors::default().allow_any_origin()
            } else {
                allowed_origins_str
                    .split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            };
            base.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                .allowed_headers(vec![actix_web::http::header::AUTHORIZATION, actix_web::http::header::ACCEPT, actix_web::http::header::CONTENT_TYPE])
                .supports_credentials()
                .max_age(3600)
        };

        App::new()
            .wrap(session_mw)
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
            )
            .app_data(web::PayloadConfig::new(max_upload_bytes))
            .app_data(picbed_db.clone())
            .app_data(web::Data::new(pool.clone()))
            .app_data(app_state.clone())
            .service(actix_files::Files::new("/media", &config.media_path))
            .route("/", web::get().to(root_handler))
            .configure(routes::config_api)
    })
    .bind(server_address)?
    .run()
    .await
}
