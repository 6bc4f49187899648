//! Access control for user and relation mutations.
//!
//! The acting principal has already been authenticated by the time these
//! checks run; they only decide whether that principal may act on the
//! users named in the request.

use crate::error::{ApiError, ApiResult};
use crate::types::{User, UserRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who may change the supervision graph and other accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationPolicy {
    /// Any authenticated user may link or unlink any two users, delete any
    /// user, and change any role.
    AnyAuthenticated,
    /// Relation changes require the caller to be one of the two endpoints or
    /// an admin. Deleting a user requires being that user or an admin.
    /// Role changes require an admin.
    #[default]
    ParticipantOrAdmin,
}

impl fmt::Display for RelationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationPolicy::AnyAuthenticated => write!(f, "any_authenticated"),
            RelationPolicy::ParticipantOrAdmin => write!(f, "participant_or_admin"),
        }
    }
}

impl FromStr for RelationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "any_authenticated" => Ok(RelationPolicy::AnyAuthenticated),
            "participant_or_admin" => Ok(RelationPolicy::ParticipantOrAdmin),
            other => Err(format!("Unknown relation policy: {}", other)),
        }
    }
}

fn is_admin(principal: &User) -> bool {
    principal.role == UserRole::Admin
}

impl RelationPolicy {
    /// May `principal` add or remove the edge `parent_id -> child_id`?
    pub fn authorize_relation_change(
        &self,
        principal: &User,
        parent_id: &str,
        child_id: &str,
    ) -> ApiResult<()> {
        match self {
            RelationPolicy::AnyAuthenticated => Ok(()),
            RelationPolicy::ParticipantOrAdmin => {
                if is_admin(principal) || principal.id == parent_id || principal.id == child_id {
                    Ok(())
                } else {
                    Err(ApiError::forbidden(
                        "Only the parent, the child, or an admin may change this relationship",
                    ))
                }
            }
        }
    }

    /// May `principal` delete the account `target_id`?
    pub fn authorize_user_delete(&self, principal: &User, target_id: &str) -> ApiResult<()> {
        match self {
            RelationPolicy::AnyAuthenticated => Ok(()),
            RelationPolicy::ParticipantOrAdmin => {
                if is_admin(principal) || principal.id == target_id {
                    Ok(())
                } else {
                    Err(ApiError::forbidden(
                        "Only the account owner or an admin may delete this user",
                    ))
                }
            }
        }
    }

    /// Role stored for a self-service signup that asked for `requested`.
    ///
    /// Under `ParticipantOrAdmin` signups are always `USER`; admins are
    /// promoted afterwards through a role change.
    pub fn signup_role(&self, requested: Option<UserRole>) -> UserRole {
        match self {
            RelationPolicy::AnyAuthenticated => requested.unwrap_or_default(),
            RelationPolicy::ParticipantOrAdmin => UserRole::User,
        }
    }

    /// May `principal` change anyone's role?
    pub fn authorize_role_change(&self, principal: &User) -> ApiResult<()> {
        match self {
            RelationPolicy::AnyAuthenticated => Ok(()),
            RelationPolicy::ParticipantOrAdmin if is_admin(principal) => Ok(()),
            RelationPolicy::ParticipantOrAdmin => {
                Err(ApiError::forbidden("Only an admin may change user roles"))
            }
        }
    }
}
