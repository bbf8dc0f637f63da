//! Infrastructure layer - External adapters and implementations
//!
//! This layer contains:
//! - Persistence: SQLite record store and repositories
//! - Config: Layered engine configuration
//! - Logging: Tracing subscriber setup

pub mod config;
pub mod logging;
pub mod persistence;
