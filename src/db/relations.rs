//! Parent/child supervision graph between users.
//!
//! Edges live in `user_relations(parent_id, child_id)`. Children and parents
//! are two query directions over that one table, so they cannot drift apart.
//! Every mutation is a direct insert or delete inside an IMMEDIATE
//! transaction; nothing loads a user's edge list, edits it, and writes it back.

use super::users::{USER_COLUMNS, parse_user_row, require_user_internal, user_exists_internal};
use super::Database;
use crate::error::{ApiError, EntityKind};
use crate::types::{Relation, User, UserWithChildren, UserWithParents};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

/// Maximum accepted length for a user ID in a relation request.
pub const MAX_USER_ID_LEN: usize = 64;

/// Reject IDs that cannot name any user.
fn validate_id(field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ApiError::missing_field(field).into());
    }
    let len = id.chars().count();
    if len > MAX_USER_ID_LEN {
        return Err(ApiError::invalid_argument(
            field,
            format!(
                "{} must be at most {} characters, got {}",
                field, MAX_USER_ID_LEN, len
            ),
        )
        .into());
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ApiError::invalid_argument(field, format!("{} contains whitespace", field)).into());
    }
    Ok(())
}

fn children_internal(conn: &Connection, parent_id: &str) -> Result<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM user_relations r
         INNER JOIN users u ON u.id = r.child_id
         WHERE r.parent_id = ?1
         ORDER BY u.username, u.id",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params![parent_id], parse_user_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

fn parents_internal(conn: &Connection, child_id: &str) -> Result<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM user_relations r
         INNER JOIN users u ON u.id = r.parent_id
         WHERE r.child_id = ?1
         ORDER BY u.username, u.id",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params![child_id], parse_user_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

fn delete_edge(conn: &Connection, parent_id: &str, child_id: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM user_relations WHERE parent_id = ?1 AND child_id = ?2",
        params![parent_id, child_id],
    )?;
    Ok(removed > 0)
}

/// Remove every edge where `user_id` is parent or child.
///
/// Must run inside the transaction that deletes the user row. Returns the
/// number of edges removed.
pub(crate) fn cascade_clear(conn: &Connection, user_id: &str) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM user_relations WHERE parent_id = ?1 OR child_id = ?1",
        params![user_id],
    )?;
    debug!(user_id = %user_id, removed, "Cleared relations");
    Ok(removed)
}

impl Database {
    /// Make `child_id` a child of `parent_id`.
    ///
    /// Idempotent: re-adding an existing edge succeeds without duplicating it.
    /// Self-relations are rejected. Returns the parent with its children.
    pub fn add_edge(&self, parent_id: &str, child_id: &str) -> Result<UserWithChildren> {
        validate_id("parentId", parent_id)?;
        validate_id("childId", child_id)?;
        if parent_id == child_id {
            return Err(ApiError::self_relation(parent_id).into());
        }

        self.with_write_tx(|tx| {
            let parent = require_user_internal(tx, parent_id, EntityKind::Parent)?;
            if !user_exists_internal(tx, child_id)? {
                return Err(ApiError::not_found(EntityKind::Child, child_id).into());
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO user_relations (parent_id, child_id) VALUES (?1, ?2)",
                params![parent_id, child_id],
            )?;
            if inserted > 0 {
                info!(parent_id = %parent_id, child_id = %child_id, "Relation added");
            } else {
                debug!(parent_id = %parent_id, child_id = %child_id, "Relation already present");
            }

            let children = children_internal(tx, parent_id)?;
            Ok(UserWithChildren {
                user: parent,
                children,
            })
        })
    }

    /// Remove the edge `parent_id -> child_id`, addressed from the parent.
    pub fn remove_edge(&self, parent_id: &str, child_id: &str) -> Result<UserWithChildren> {
        validate_id("parentId", parent_id)?;
        validate_id("childId", child_id)?;

        self.with_write_tx(|tx| {
            let parent = require_user_internal(tx, parent_id, EntityKind::Parent)?;
            if !delete_edge(tx, parent_id, child_id)? {
                return Err(ApiError::child_not_related(parent_id, child_id).into());
            }
            info!(parent_id = %parent_id, child_id = %child_id, "Relation removed");

            let children = children_internal(tx, parent_id)?;
            Ok(UserWithChildren {
                user: parent,
                children,
            })
        })
    }

    /// Remove the edge `parent_id -> child_id`, addressed from the child.
    pub fn remove_parent_from_child(
        &self,
        child_id: &str,
        parent_id: &str,
    ) -> Result<UserWithParents> {
        validate_id("childId", child_id)?;
        validate_id("parentId", parent_id)?;

        self.with_write_tx(|tx| {
            let child = require_user_internal(tx, child_id, EntityKind::Child)?;
            if !delete_edge(tx, parent_id, child_id)? {
                return Err(ApiError::parent_not_related(child_id, parent_id).into());
            }
            info!(parent_id = %parent_id, child_id = %child_id, "Relation removed by child");

            let parents = parents_internal(tx, child_id)?;
            Ok(UserWithParents {
                user: child,
                parents,
            })
        })
    }

    /// Children of a user, ordered by username.
    pub fn list_children(&self, user_id: &str) -> Result<Vec<User>> {
        validate_id("userId", user_id)?;
        self.with_conn(|conn| {
            if !user_exists_internal(conn, user_id)? {
                return Err(ApiError::not_found(EntityKind::User, user_id).into());
            }
            children_internal(conn, user_id)
        })
    }

    /// Parents of a user, ordered by username.
    pub fn list_parents(&self, user_id: &str) -> Result<Vec<User>> {
        validate_id("userId", user_id)?;
        self.with_conn(|conn| {
            if !user_exists_internal(conn, user_id)? {
                return Err(ApiError::not_found(EntityKind::User, user_id).into());
            }
            parents_internal(conn, user_id)
        })
    }

    /// Whether the edge `parent_id -> child_id` exists.
    pub fn has_edge(&self, parent_id: &str, child_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM user_relations WHERE parent_id = ?1 AND child_id = ?2",
                    params![parent_id, child_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            Ok(found)
        })
    }

    /// All edges in the graph.
    pub fn list_edges(&self) -> Result<Vec<Relation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT parent_id, child_id FROM user_relations ORDER BY parent_id, child_id",
            )?;
            let edges = stmt
                .query_map([], |row| {
                    Ok(Relation {
                        parent_id: row.get(0)?,
                        child_id: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(edges)
        })
    }
}
