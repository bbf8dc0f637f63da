//! Domain services - Pure logic over world records

pub mod projection;
pub mod schema;

pub use projection::{ComponentProjection, ProjectedComponent};
pub use schema::{validate, SchemaViolation};
