//! Identity store boundary and its Postgres implementation.
//!
//! The authenticator and the user-management handlers talk to accounts
//! through [`IdentityStore`]; the Postgres implementation owns the SQL. Email
//! lookups are byte-exact; uniqueness and collation belong to the store's
//! unique index, and the core introduces no case-folding of its own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::role::RoleFlags;

/// A persistent account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub timezone: String,
    pub flags: RoleFlags,
    pub is_active: bool,
    /// Student-only absolute access cutoff; teacher/admin flags never expire.
    pub access_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub timezone: String,
    pub flags: RoleFlags,
    pub is_active: bool,
    pub access_expires_at: Option<DateTime<Utc>>,
}

/// Partial update; `None` keeps the stored value.
///
/// `access_expires_at` is doubly optional: the outer `None` keeps the stored
/// value, `Some(None)` clears it, `Some(Some(t))` sets it.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub display_name: Option<String>,
    pub timezone: Option<String>,
    pub password_hash: Option<String>,
    pub flags: Option<RoleFlags>,
    pub is_active: Option<bool>,
    pub access_expires_at: Option<Option<DateTime<Utc>>>,
}

/// Outcome when attempting to create an account.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(UserRecord),
    DuplicateEmail,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;
    async fn list(&self) -> Result<Vec<UserRecord>>;
    async fn create(&self, user: NewUser) -> Result<CreateOutcome>;
    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<UserRecord>>;
    /// Delete an account and its dependents (class memberships, teacher
    /// assignments, audit rows). Returns false when no such account exists.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

pub type DynIdentityStore = Arc<dyn IdentityStore>;

const USER_COLUMNS: &str = r"
    id, email, display_name, password_hash, timezone,
    is_student, is_teacher, is_admin, is_active,
    access_expires_at, created_at, updated_at
";

fn record_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        password_hash: row.get("password_hash"),
        timezone: row.get("timezone"),
        flags: RoleFlags::new(
            row.get("is_student"),
            row.get("is_teacher"),
            row.get("is_admin"),
        ),
        is_active: row.get("is_active"),
        access_expires_at: row.get("access_expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Postgres-backed identity store.
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list users")?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome> {
        let query = format!(
            r"
            INSERT INTO users
                (email, display_name, password_hash, timezone,
                 is_student, is_teacher, is_admin, is_active, access_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(&user.password_hash)
            .bind(&user.timezone)
            .bind(user.flags.student)
            .bind(user.flags.teacher)
            .bind(user.flags.admin)
            .bind(user.is_active)
            .bind(user.access_expires_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(CreateOutcome::Created(record_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::DuplicateEmail),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<UserRecord>> {
        let (student, teacher, admin) = match changes.flags {
            Some(flags) => (Some(flags.student), Some(flags.teacher), Some(flags.admin)),
            None => (None, None, None),
        };
        let set_expiry = changes.access_expires_at.is_some();
        let expiry = changes.access_expires_at.flatten();

        let query = format!(
            r"
            UPDATE users SET
                display_name = COALESCE($1, display_name),
                timezone = COALESCE($2, timezone),
                password_hash = COALESCE($3, password_hash),
                is_student = COALESCE($4, is_student),
                is_teacher = COALESCE($5, is_teacher),
                is_admin = COALESCE($6, is_admin),
                is_active = COALESCE($7, is_active),
                access_expires_at = CASE WHEN $8 THEN $9 ELSE access_expires_at END,
                updated_at = NOW()
            WHERE id = $10
            RETURNING {USER_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(changes.display_name)
            .bind(changes.timezone)
            .bind(changes.password_hash)
            .bind(student)
            .bind(teacher)
            .bind(admin)
            .bind(changes.is_active)
            .bind(set_expiry)
            .bind(expiry)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to update user")?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        // Dependents go first to satisfy referential constraints; a single
        // transaction keeps the cascade atomic.
        let mut tx = self.pool.begin().await.context("begin delete transaction")?;

        for statement in [
            "DELETE FROM class_members WHERE user_id = $1",
            "DELETE FROM class_teachers WHERE user_id = $1",
            "DELETE FROM audit_log WHERE actor_id = $1",
        ] {
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = statement
            );
            sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to delete user dependents")?;
        }

        let query = "DELETE FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete user")?;

        tx.commit().await.context("commit delete transaction")?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_changes_default_keeps_everything() {
        let changes = UserChanges::default();
        assert!(changes.display_name.is_none());
        assert!(changes.flags.is_none());
        assert!(changes.access_expires_at.is_none());
    }

    #[test]
    fn double_option_expiry_semantics() {
        let keep = UserChanges::default();
        assert!(keep.access_expires_at.is_none());

        let clear = UserChanges {
            access_expires_at: Some(None),
            ..UserChanges::default()
        };
        assert!(clear.access_expires_at.is_some());
        assert!(clear.access_expires_at.flatten().is_none());

        let set = UserChanges {
            access_expires_at: Some(Some(Utc::now())),
            ..UserChanges::default()
        };
        assert!(set.access_expires_at.flatten().is_some());
    }

    #[test]
    fn create_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", CreateOutcome::DuplicateEmail),
            "DuplicateEmail"
        );
    }
}
