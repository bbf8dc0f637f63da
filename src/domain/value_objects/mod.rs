//! Value objects - Immutable objects defined by their attributes

mod ids;
mod region;

pub use ids::*;
pub use region::{LocalOffset, RegionRef, WorldPosition, REGION_FIELD};
