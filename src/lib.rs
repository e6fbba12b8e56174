//! On-sky orientation of astronomical images.
//!
//! Skyorient computes North/East compass overlays from a world coordinate
//! mapping and synthesizes rotated, coordinates-only reference frames that
//! viewers can align to without resampling pixel data.

pub mod compass;
pub mod fitting;
pub mod geom;
pub mod orientation;
pub mod rotated;
pub mod wcs;
