//! # Tankwatch Common Library
//!
//! Shared code for the Tankwatch services including:
//! - Database schema initialization and record models
//! - Configuration loading and root folder resolution
//! - Dashboard roles
//! - Calendar-day time helpers

pub mod config;
pub mod db;
pub mod error;
pub mod roles;
pub mod time;

pub use error::{Error, Result};
pub use roles::Role;
