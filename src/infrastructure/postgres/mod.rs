//! PostgreSQL persistence module.
//!
//! Provides connection pooling and schema setup for the PostgreSQL backends.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
