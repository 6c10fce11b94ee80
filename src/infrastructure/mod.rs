//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: Application-level error type
//! - `metrics`: Prometheus metrics
//! - `postgres`: PostgreSQL connection pool and schema

pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
