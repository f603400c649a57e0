//! Credential store persistence
//!
//! SQLite is the default backend; MySQL is selected through
//! `database.driver`. Schema changes ship as embedded migrations.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool};
