//! User repository
//!
//! - `UserRepository`: the credential store interface
//! - `SqlxUserRepository`: SQLite and MySQL implementation
//!
//! Username uniqueness is enforced by the `UNIQUE` column; a racing
//! duplicate insert surfaces as an error for which [`is_unique_violation`]
//! returns true.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateUserInput, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user and return it with its assigned id
    async fn create(&self, input: &CreateUserInput) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Exact, case-sensitive lookup
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn count(&self) -> Result<i64>;
}

/// Whether `err` comes from a violated UNIQUE constraint
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    }
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Boxed repository for dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = "SELECT id, username, password_hash, created_at, updated_at FROM users WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(
                    r#"
                    SELECT id, username, password_hash, created_at, updated_at
                    FROM users
                    WHERE username = ?
                    "#,
                )
                .bind(username)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get user by username")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                // BINARY keeps the comparison case-sensitive under MySQL's default collation
                let row = sqlx::query(
                    r#"
                    SELECT id, username, password_hash, created_at, updated_at
                    FROM users
                    WHERE BINARY username = ?
                    "#,
                )
                .bind(username)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get user by username")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM users";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count users")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count users")?
                .get("count"),
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&input.username)
    .bind(&input.password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        username: input.username.clone(),
        password_hash: input.password_hash.clone(),
        created_at: now,
        updated_at: now,
    })
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&input.username)
    .bind(&input.password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        username: input.username.clone(),
        password_hash: input.password_hash.clone(),
        created_at: now,
        updated_at: now,
    })
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
