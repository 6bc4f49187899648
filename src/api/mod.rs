//! HTTP API.
//!
//! Routes for signup/signin, the user supervision graph, and per-user tasks.
//! All routes except signup, signin, and health require a bearer token.

mod extract;
mod server;
mod tasks;
mod users;

pub use extract::{AuthUser, bearer_token};
pub use server::{AppState, ServerHandle, build_router, start_server};
