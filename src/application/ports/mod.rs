//! Ports - Interfaces at the edges of the application layer

pub mod outbound;
