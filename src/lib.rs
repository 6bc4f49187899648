//! Task Manager Library
//!
//! Multi-user task tracking with a parent/child supervision graph between
//! user accounts. This module exports the core components for testing and
//! integration.

pub mod access;
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod types;
