//! Spherical geometry and the TAN projection.

pub mod sphere;
pub mod tan;
