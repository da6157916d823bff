use crate::helper::image_helpers::UploadSettings;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use config; // Explicitly import the config crate

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_upload_size_mb: u64,
    pub thumbnail_max_width: u32,
    pub thumbnail_max_height: u32,
    pub thumbnail_quality: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub upload: UploadConfig,
    // These fields will be populated from the .env file
    pub database_path: String,
    pub media_path: String,
    pub public_base_url: String,
    pub bucket_prefix: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub use_secure_cookies: bool,
}

fn required(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| {
        config::ConfigError::Message(format!("FATAL: Environment variable '{}' is not set in your .env file.", name))
    })
}

fn require_absolute(name: &str, value: &str) -> Result<(), config::ConfigError> {
    if Path::new(value).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            name, value
        )));
    }
    Ok(())
}

/// The session key must be 128 hex characters (64 bytes).
pub fn validate_secret_key(key: &str) -> Result<(), config::ConfigError> {
    if key.len() != 128 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(config::ConfigError::Message(
            "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string(),
        ));
    }
    Ok(())
}

/// Bucket prefixes become the first segment of every object key.
pub fn validate_bucket_prefix(prefix: &str) -> Result<(), config::ConfigError> {
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(config::ConfigError::Message(
            "FATAL: 'BUCKET_PREFIX' must not be empty and can only contain letters, numbers, underscores, and hyphens."
                .to_string(),
        ));
    }
    Ok(())
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        // Load the specified .env file. Propagate an error if it fails.
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;

        let database_path = required("DATABASE_PATH")?;
        let media_path = required("MEDIA_PATH")?;
        require_absolute("DATABASE_PATH", &database_path)?;
        require_absolute("MEDIA_PATH", &media_path)?;

        let session_secret_key = required("SESSION_SECRET_KEY")?;
        validate_secret_key(&session_secret_key)?;

        let public_base_url = required("PUBLIC_BASE_URL")?;
        url::Url::parse(&public_base_url).map_err(|e| {
            config::ConfigError::Message(format!("FATAL: 'PUBLIC_BASE_URL' is not a valid URL ('{}'): {}", public_base_url, e))
        })?;

        let bucket_prefix = env::var("BUCKET_PREFIX").unwrap_or_else(|_| "picbed".to_string());
        validate_bucket_prefix(&bucket_prefix)?;

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let mut builder = config::Config::builder()
            // Base settings (web host/port, upload limits) come from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("media_path", media_path)?
            .set_override("public_base_url", public_base_url)?
            .set_override("bucket_prefix", bucket_prefix)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?;

        if let Ok(raw) = env::var("MAX_UPLOAD_SIZE_MB") {
            let mb = raw.trim().parse::<u64>().map_err(|_| {
                config::ConfigError::Message(format!("FATAL: 'MAX_UPLOAD_SIZE_MB' must be a positive integer, got '{}'.", raw))
            })?;
            builder = builder.set_override("upload.max_upload_size_mb", mb as i64)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Returns the full path to the users database file inside its own folder.
    pub fn users_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("users").join("users.db")
    }

    /// Returns the full path to the document database file inside its own folder.
    pub fn picbed_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("picbed").join("picbed.db")
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            bucket_prefix: self.bucket_prefix.clone(),
            max_upload_bytes: (self.upload.max_upload_size_mb as usize).saturating_mul(1024 * 1024),
            thumbnail_max_width: self.upload.thumbnail_max_width,
            thumbnail_max_height: self.upload.thumbnail_max_height,
            thumbnail_quality: self.upload.thumbnail_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_key_must_be_long_hex() {
        assert!(validate_secret_key(&"ab".repeat(64)).is_ok());
        assert!(validate_secret_key(&"ab".repeat(32)).is_err());
        assert!(validate_secret_key(&"zz".repeat(64)).is_err());
    }

    #[test]
    fn bucket_prefix_is_a_single_segment() {
        assert!(validate_bucket_prefix("picbed").is_ok());
        assert!(validate_bucket_prefix("pic/bed").is_err());
        assert!(validate_bucket_prefix("").is_err());
    }
}
