use crate::helper::sanitization_helpers::clean_text_field;
use crate::helper::{ServiceError, ServiceResult};
use crate::models::db_operations::users_db_operations::{self, NewUser, DEFAULT_USER_LEVEL};
use crate::models::db_operations::DbError;
use crate::models::{LoginResult, User};
use crate::DbPool;
use serde::{Deserialize, Serialize};

#[cfg(not(test))]
const PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_COST: u32 = 4;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResult {
    pub username: String,
}

pub fn hash_password(password: &str) -> ServiceResult<String> {
    Ok(bcrypt::hash(password, PASSWORD_COST)?)
}

pub fn validate_email(email: &str) -> ServiceResult<()> {
    let at = email.find('@').unwrap_or(0);
    if at == 0 || at == email.len() - 1 || email.chars().any(char::is_whitespace) {
        return Err(ServiceError::Validation(format!("'{}' is not a valid email address.", email)));
    }
    Ok(())
}

/// Creates a user with the default level. Email must be unused.
pub fn register(pool: &DbPool, request: RegisterRequest) -> ServiceResult<RegisterResult> {
    let username = clean_text_field(&request.username, 64);
    let email = request.email.trim().to_lowercase();
    if username.is_empty() {
        return Err(ServiceError::Validation("Username must not be empty.".to_string()));
    }
    validate_email(&email)?;
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::Validation(format!(
            "Password must be at least {} characters long.",
            MIN_PASSWORD_LEN
        )));
    }

    let password_hash = hash_password(&request.password)?;
    let conn = pool.get().map_err(DbError::from)?;
    users_db_operations::create_user(
        &conn,
        &NewUser {
            username: &username,
            password_hash: &password_hash,
            email: &email,
            phone: request.phone.trim(),
            user_level: DEFAULT_USER_LEVEL,
        },
    )?;
    log::info!("Registered user '{}' <{}>", username, email);
    Ok(RegisterResult { username })
}

/// Checks the credentials. Unknown email, wrong password and locked accounts are all `Unauthorized`.
pub fn login(pool: &DbPool, request: &LoginRequest) -> ServiceResult<User> {
    let email = request.email.trim().to_lowercase();
    let conn = pool.get().map_err(DbError::from)?;
    let (user, password_hash) = users_db_operations::credentials_by_email(&conn, &email)?
        .ok_or_else(|| ServiceError::Unauthorized("Invalid email or password.".to_string()))?;

    if !bcrypt::verify(&request.password, &password_hash)? {
        log::warn!("Failed login attempt for '{}'", email);
        return Err(ServiceError::Unauthorized("Invalid email or password.".to_string()));
    }
    if user.is_lock {
        log::warn!("Login attempt for locked account '{}'", email);
        return Err(ServiceError::Unauthorized("This account is locked.".to_string()));
    }
    users_db_operations::update_login_time(&conn, &email)?;
    Ok(user)
}

pub fn login_result(user: &User) -> LoginResult {
    LoginResult {
        username: user.username.clone(),
        email: user.email.clone(),
        phone: user.phone.clone(),
        brief: user.brief.clone(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::setup::db_setup::setup_users_db;
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;

    /// In-memory pool with a single connection, so every checkout sees the same database.
    pub(crate) fn memory_pool() -> DbPool {
        let pool = Pool::builder().max_size(1).build(SqliteConnectionManager::memory()).unwrap();
        setup_users_db(&mut pool.get().unwrap()).unwrap();
        pool
    }

    fn request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: "ling".to_string(),
            password: password.to_string(),
            email: email.to_string(),
            phone: "123".to_string(),
        }
    }

    #[test]
    fn register_then_login() {
        let pool = memory_pool();
        let result = register(&pool, request("Ling@Example.com", "secret-pw")).unwrap();
        assert_eq!(result.username, "ling");

        let user = login(&pool, &LoginRequest { email: "ling@example.com".into(), password: "secret-pw".into() }).unwrap();
        assert_eq!(user.user_level, DEFAULT_USER_LEVEL);
        let stored = users_db_operations::find_by_email(&pool.get().unwrap(), "ling@example.com").unwrap().unwrap();
        assert!(stored.new_time.is_some());

        let wrong = login(&pool, &LoginRequest { email: "ling@example.com".into(), password: "nope".into() });
        assert!(matches!(wrong.unwrap_err(), ServiceError::Unauthorized(_)));
    }

    #[test]
    fn duplicate_email_conflicts() {
        let pool = memory_pool();
        register(&pool, request("a@b.c", "secret-pw")).unwrap();
        let err = register(&pool, request("a@b.c", "secret-pw")).unwrap_err();
        assert!(matches!(err, ServiceError::Db(DbError::Conflict(_))));
    }

    #[test]
    fn locked_user_cannot_login() {
        let pool = memory_pool();
        register(&pool, request("a@b.c", "secret-pw")).unwrap();
        users_db_operations::set_lock(&pool.get().unwrap(), "a@b.c", true).unwrap();
        let err = login(&pool, &LoginRequest { email: "a@b.c".into(), password: "secret-pw".into() }).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn rejects_bad_input() {
        let pool = memory_pool();
        assert!(matches!(register(&pool, request("nope", "secret-pw")).unwrap_err(), ServiceError::Validation(_)));
        assert!(matches!(register(&pool, request("a@b.c", "short")).unwrap_err(), ServiceError::Validation(_)));
    }
}
