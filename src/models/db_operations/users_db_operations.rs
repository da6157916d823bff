use crate::models::db_operations::{DbError, DbResult};
use crate::models::User;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub const DEFAULT_USER_LEVEL: i64 = 1;

const USER_COLUMNS: &str =
    "id, username, user_level, is_lock, email, phone, brief, new_time, create_time, update_time";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        user_level: row.get(2)?,
        is_lock: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        brief: row.get(6)?,
        new_time: row.get(7)?,
        create_time: row.get(8)?,
        update_time: row.get(9)?,
    })
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub user_level: i64,
}

pub fn email_count(conn: &Connection, email: &str) -> DbResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users WHERE email = ?1", [email], |row| row.get(0))?)
}

/// Inserts a user. The password must already be hashed.
pub fn create_user(conn: &Connection, user: &NewUser) -> DbResult<i64> {
    if email_count(conn, user.email)? > 0 {
        return Err(DbError::Conflict(format!("email '{}' is already registered", user.email)));
    }
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (username, password_hash, user_level, is_lock, email, phone, brief, create_time, update_time)
         VALUES (?1, ?2, ?3, 0, ?4, ?5, '', ?6, ?6)",
        params![user.username, user.password_hash, user.user_level, user.email, user.phone, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_by_email(conn: &Connection, email: &str) -> DbResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [email], user_from_row).optional()?)
}

/// The user and stored password hash for an email.
pub fn credentials_by_email(conn: &Connection, email: &str) -> DbResult<Option<(User, String)>> {
    let sql = format!("SELECT {}, password_hash FROM users WHERE email = ?1", USER_COLUMNS);
    Ok(conn
        .query_row(&sql, [email], |row| Ok((user_from_row(row)?, row.get::<_, String>(10)?)))
        .optional()?)
}

pub fn read_all_users(conn: &Connection) -> DbResult<Vec<User>> {
    let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], user_from_row)?;
    let mut users = Vec::new();
    for user in rows {
        users.push(user?);
    }
    Ok(users)
}

fn update_by_email(conn: &Connection, email: &str, column: &str, value: i64) -> DbResult<()> {
    let sql = format!("UPDATE users SET {} = ?1, update_time = ?2 WHERE email = ?3", column);
    let changed = conn.execute(&sql, params![value, Utc::now().to_rfc3339(), email])?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("user '{}'", email)));
    }
    Ok(())
}

pub fn set_user_level(conn: &Connection, email: &str, level: i64) -> DbResult<()> {
    update_by_email(conn, email, "user_level", level)
}

pub fn set_lock(conn: &Connection, email: &str, locked: bool) -> DbResult<()> {
    update_by_email(conn, email, "is_lock", i64::from(locked))
}

pub fn update_login_time(conn: &Connection, email: &str) -> DbResult<()> {
    conn.execute(
        "UPDATE users SET new_time = ?1 WHERE email = ?2",
        params![Utc::now().to_rfc3339(), email],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_users_db;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_users_db(&mut conn).unwrap();
        conn
    }

    fn new_user<'a>(email: &'a str) -> NewUser<'a> {
        NewUser { username: "ann", password_hash: "hash", email, phone: "", user_level: DEFAULT_USER_LEVEL }
    }

    #[test]
    fn duplicate_email_conflicts() {
        let conn = conn();
        create_user(&conn, &new_user("ann@example.com")).unwrap();
        let err = create_user(&conn, &new_user("ann@example.com")).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(read_all_users(&conn).unwrap().len(), 1);
    }

    #[test]
    fn level_and_lock_updates() {
        let conn = conn();
        create_user(&conn, &new_user("ann@example.com")).unwrap();
        set_user_level(&conn, "ann@example.com", 9).unwrap();
        set_lock(&conn, "ann@example.com", true).unwrap();

        let (user, hash) = credentials_by_email(&conn, "ann@example.com").unwrap().unwrap();
        assert_eq!(user.user_level, 9);
        assert!(user.is_lock);
        assert_eq!(hash, "hash");
        assert!(matches!(set_lock(&conn, "nobody@example.com", true).unwrap_err(), DbError::NotFound(_)));
    }
}
