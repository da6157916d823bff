use clap::{Parser, Subcommand};
use picbed_backend::config::Config;
use picbed_backend::helper::user_helpers::{hash_password, validate_email};
use picbed_backend::models::db_operations::index_registry;
use picbed_backend::models::db_operations::users_db_operations::{self, NewUser, DEFAULT_USER_LEVEL};
use picbed_backend::setup::db_setup;
use rand::RngCore;
use redb::Database;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Create the schema. Without an argument both databases are set up.
    Setup {
        db_type: Option<String>,
    },
    /// Rebuild every secondary index from the stored documents.
    Reindex,
}

#[derive(Subcommand, Debug)]
enum UserAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value_t = DEFAULT_USER_LEVEL)]
        level: i64,
    },
    List,
    SetLevel {
        #[arg(long)]
        email: String,
        #[arg(long)]
        level: i64,
    },
    Lock {
        #[arg(long)]
        email: String,
    },
    Unlock {
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand, Debug)]
enum SecretAction {
    /// Print a fresh SESSION_SECRET_KEY value.
    Generate,
}

fn main() {
    let cli = Cli::parse();

    // Secret generation must work before a valid .env exists.
    if let Commands::Secret { action: SecretAction::Generate } = &cli.command {
        generate_secret();
        return;
    }

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("users") => setup_users_database(&config),
                Some("picbed") => setup_picbed_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'users' or 'picbed'.", other),
                None => {
                    setup_users_database(&config);
                    setup_picbed_database(&config);
                }
            },
            DbAction::Reindex => reindex(&config),
        },
        Commands::User { action } => match action {
            UserAction::Create { username, email, password, level } => {
                create_user(&config, username, email, password, *level)
            }
            UserAction::List => list_users(&config),
            UserAction::SetLevel { email, level } => {
                with_users_db(&config, |conn| users_db_operations::set_user_level(conn, email, *level).map_err(|e| e.to_string()));
            }
            UserAction::Lock { email } => {
                with_users_db(&config, |conn| users_db_operations::set_lock(conn, email, true).map_err(|e| e.to_string()));
            }
            UserAction::Unlock { email } => {
                with_users_db(&config, |conn| users_db_operations::set_lock(conn, email, false).map_err(|e| e.to_string()));
            }
        },
        Commands::Secret { .. } => generate_secret(),
    }
}

fn generate_secret() {
    let mut key = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut key);
    println!("{}", hex::encode(key));
}

fn setup_users_database(config: &Config) {
    let db_path = config.users_db_path();
    println!("\nSetting up users database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&db_path).expect("Could not open users database file.");
    match db_setup::setup_users_db(&mut conn) {
        Ok(_) => println!("✅ Users database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up users database: {}", e),
    }
}

fn setup_picbed_database(config: &Config) {
    let db_path = config.picbed_db_path();
    println!("\nSetting up document database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }
    fs::create_dir_all(&config.media_path).expect("Could not create media directory.");

    let db = Database::create(&db_path).expect("Failed to open document database file.");
    match db_setup::setup_picbed_db(&db) {
        Ok(_) => println!("✅ Document database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up document database: {}", e),
    }
}

fn reindex(config: &Config) {
    let db_path = config.picbed_db_path();
    if !db_path.exists() {
        eprintln!("❌ Error: Document database not found at '{}'. Please run `setup_cli db setup` first.", db_path.display());
        return;
    }
    let db = Database::open(&db_path).expect("Failed to open document database file.");
    match index_registry::reindex_all(&db) {
        Ok(count) => println!("✅ Rebuilt {} indexes.", count),
        Err(e) => eprintln!("❌ Error rebuilding indexes: {}", e),
    }
}

fn with_users_db(config: &Config, action: impl FnOnce(&Connection) -> Result<(), String>) {
    let db_path = config.users_db_path();
    if !db_path.exists() {
        eprintln!("❌ Error: Users database not found at '{}'. Please run `setup_cli db setup` first.", db_path.display());
        return;
    }
    let conn = Connection::open(&db_path).expect("Could not open users database.");
    match action(&conn) {
        Ok(()) => println!("✅ User updated."),
        Err(e) => eprintln!("❌ Error: {}", e),
    }
}

fn create_user(config: &Config, username: &str, email: &str, password: &str, level: i64) {
    let email = email.trim().to_lowercase();
    if let Err(e) = validate_email(&email) {
        eprintln!("❌ Error: {}", e);
        return;
    }
    let password_hash = match hash_password(password) {
        Ok(hash) => hash,
        Err(e) => {
            eprintln!("❌ Error hashing password: {}", e);
            return;
        }
    };
    with_users_db(config, |conn| {
        let user = NewUser { username, password_hash: &password_hash, email: &email, phone: "", user_level: level };
        users_db_operations::create_user(conn, &user).map(|_| ()).map_err(|e| e.to_string())
    });
}

fn list_users(config: &Config) {
    let conn = match Connection::open(config.users_db_path()) {
        Ok(c) => c,
        Err(_) => {
            eprintln!("❌ Error: Users database not found. Please run `setup_cli db setup` first.");
            return;
        }
    };
    println!("Listing users:");
    match users_db_operations::read_all_users(&conn) {
        Ok(users) => {
            for user in users {
                let lock = if user.is_lock { " (locked)" } else { "" };
                println!("- {} <{}> level {}{}", user.username, user.email, user.user_level, lock);
            }
        }
        Err(e) => eprintln!("❌ Error fetching users: {}", e),
    }
}
