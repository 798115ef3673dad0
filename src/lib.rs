//! Signup Migrator Library
//!
//! Reversible PostgreSQL schema migrations for the performer signup
//! database, with the runner, catalog inspection and admin surface needed
//! to apply them.

pub mod api;
pub mod config;
pub mod error;
pub mod migration;
pub mod pool;
pub mod schema;
