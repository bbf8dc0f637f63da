//! Data Transfer Objects - For callers across a process or language boundary
//!
//! DTOs live in the application layer so collaborators can serialize results
//! without reaching into engine internals.

pub mod outcome;

pub use outcome::Outcome;
