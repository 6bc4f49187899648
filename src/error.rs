//! Structured error types for API responses.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidArgument,

    // Not found errors
    UserNotFound,
    ParentNotFound,
    ChildNotFound,
    RelationshipNotFound,
    TaskNotFound,

    // Access errors
    Unauthorized,
    Forbidden,

    // Conflict errors
    Conflict,

    // Internal errors
    DatabaseError,
    InternalError,
}

/// The kind of entity a not-found error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Parent,
    Child,
    Relationship,
    Task,
}

impl EntityKind {
    fn code(self) -> ErrorCode {
        match self {
            EntityKind::User => ErrorCode::UserNotFound,
            EntityKind::Parent => ErrorCode::ParentNotFound,
            EntityKind::Child => ErrorCode::ChildNotFound,
            EntityKind::Relationship => ErrorCode::RelationshipNotFound,
            EntityKind::Task => ErrorCode::TaskNotFound,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => write!(f, "User"),
            EntityKind::Parent => write!(f, "Parent"),
            EntityKind::Child => write!(f, "Child"),
            EntityKind::Relationship => write!(f, "Relationship"),
            EntityKind::Task => write!(f, "Task"),
        }
    }
}

/// Structured error for API responses.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_argument(field: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, reason).with_field(field)
    }

    /// Not-found error naming the entity kind and the id that failed to resolve.
    pub fn not_found(kind: EntityKind, id: &str) -> Self {
        Self::new(
            kind.code(),
            format!("{} with ID \"{}\" not found.", kind, id),
        )
        .with_details(id)
    }

    /// Parent exists but has no edge to the child.
    pub fn child_not_related(parent_id: &str, child_id: &str) -> Self {
        Self::new(
            ErrorCode::RelationshipNotFound,
            format!(
                "Child with ID \"{}\" is not related to Parent with ID \"{}\".",
                child_id, parent_id
            ),
        )
    }

    /// Child exists but has no edge from the parent.
    pub fn parent_not_related(child_id: &str, parent_id: &str) -> Self {
        Self::new(
            ErrorCode::RelationshipNotFound,
            format!(
                "Parent with ID \"{}\" is not related to Child with ID \"{}\".",
                parent_id, child_id
            ),
        )
    }

    pub fn self_relation(user_id: &str) -> Self {
        Self::new(
            ErrorCode::InvalidArgument,
            format!("User \"{}\" cannot be its own parent or child", user_id),
        )
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    /// True for any of the not-found codes.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::UserNotFound
                | ErrorCode::ParentNotFound
                | ErrorCode::ChildNotFound
                | ErrorCode::RelationshipNotFound
                | ErrorCode::TaskNotFound
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

// Store code returns anyhow; domain errors travel inside it and are recovered here
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(db_err) => ApiError::database(db_err),
                Err(err) => ApiError::internal(err),
            },
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Pull the `ApiError` out of an anyhow error, if that is what it carries.
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.downcast_ref::<ApiError>()
}
