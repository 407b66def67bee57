//! Credible sky regions from probability sky maps.
//!
//! Skymoc takes a pixelized probability map on the HEALPix tessellation —
//! a gravitational-wave localization map, say — extracts the smallest sky
//! area enclosing a target probability mass, and packs it into a Multi-Order
//! Coverage (MOC) structure that can be serialized, inspected, and used to
//! filter catalog positions.

pub mod catalog;
pub mod healpix;
pub mod moc;
pub mod region;
pub mod skymap;
