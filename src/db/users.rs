//! User store: account records that serve as nodes of the supervision graph.

use super::{Database, now_ms, parse_text_column, relations};
use crate::error::{ApiError, EntityKind};
use crate::types::{NewUser, User, UserRole};
use anyhow::Result;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

pub(crate) const USER_COLUMNS: &str = "u.id, u.username, u.email, u.role, u.created_at";

pub(crate) fn parse_user_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        role: parse_text_column(row, "role")?,
        created_at: row.get("created_at")?,
    })
}

/// Fetch a user using an existing connection or transaction.
pub(crate) fn get_user_internal(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS);
    let user = conn
        .query_row(&sql, params![user_id], parse_user_row)
        .optional()?;
    Ok(user)
}

pub(crate) fn user_exists_internal(conn: &Connection, user_id: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            params![user_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(exists)
}

/// Fetch a user or fail with `NotFound(kind)`.
pub(crate) fn require_user_internal(
    conn: &Connection,
    user_id: &str,
    kind: EntityKind,
) -> Result<User> {
    get_user_internal(conn, user_id)?.ok_or_else(|| ApiError::not_found(kind, user_id).into())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Database {
    /// Create a user account. Fails with `Conflict` if the email is taken.
    pub fn create_user(&self, new_user: NewUser) -> Result<User> {
        let id = Uuid::now_v7().to_string();
        let now = now_ms();

        self.with_conn(|conn| {
            let taken = conn
                .query_row(
                    "SELECT 1 FROM users WHERE email = ?1",
                    params![&new_user.email],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if taken {
                return Err(email_conflict(&new_user.email).into());
            }

            let inserted = conn.execute(
                "INSERT INTO users (id, username, email, password_hash, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    &id,
                    &new_user.username,
                    &new_user.email,
                    &new_user.password_hash,
                    new_user.role.as_str(),
                    now
                ],
            );
            match inserted {
                Ok(_) => {}
                // Another handle on the same file may have won the race
                Err(e) if is_unique_violation(&e) => {
                    return Err(email_conflict(&new_user.email).into());
                }
                Err(e) => return Err(e.into()),
            }

            info!(user_id = %id, username = %new_user.username, "User created");

            Ok(User {
                id,
                username: new_user.username,
                email: new_user.email,
                role: new_user.role,
                created_at: now,
            })
        })
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| get_user_internal(conn, user_id))
    }

    /// Get a user by ID, failing with `NotFound(user)` if missing.
    pub fn require_user(&self, user_id: &str) -> Result<User> {
        self.with_conn(|conn| require_user_internal(conn, user_id, EntityKind::User))
    }

    /// Check whether a user exists.
    pub fn user_exists(&self, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| user_exists_internal(conn, user_id))
    }

    /// Look up a user and the stored password hash by email (for sign-in).
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<(User, String)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, u.password_hash FROM users u WHERE u.email = ?1",
                USER_COLUMNS
            );
            let found = conn
                .query_row(&sql, params![email], |row| {
                    let user = parse_user_row(row)?;
                    let hash: String = row.get("password_hash")?;
                    Ok((user, hash))
                })
                .optional()?;
            Ok(found)
        })
    }

    /// List all users, oldest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users u ORDER BY u.created_at, u.id", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map([], parse_user_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
    }

    /// Change a user's role.
    pub fn update_user_role(&self, user_id: &str, role: UserRole) -> Result<User> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role.as_str(), user_id],
            )?;
            if updated == 0 {
                return Err(ApiError::not_found(EntityKind::User, user_id).into());
            }
            debug!(user_id = %user_id, role = %role, "User role updated");
            require_user_internal(conn, user_id, EntityKind::User)
        })
    }

    /// Delete a user.
    ///
    /// Clears every relation touching the user and detaches the user's tasks
    /// (owner set to NULL) in the same transaction as the row deletion.
    pub fn delete_user(&self, user_id: &str) -> Result<()> {
        self.with_write_tx(|tx| {
            if !user_exists_internal(tx, user_id)? {
                return Err(ApiError::not_found(EntityKind::User, user_id).into());
            }

            let edges = relations::cascade_clear(tx, user_id)?;

            let detached = tx.execute(
                "UPDATE tasks SET owner_id = NULL WHERE owner_id = ?1",
                params![user_id],
            )?;

            tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;

            info!(
                user_id = %user_id,
                edges_removed = edges,
                tasks_detached = detached,
                "User deleted"
            );
            Ok(())
        })
    }
}

fn email_conflict(email: &str) -> ApiError {
    ApiError::conflict(format!(
        "User with email address \"{}\" already exists",
        email
    ))
    .with_field("email")
}
