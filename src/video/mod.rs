//! Video frame input.

pub mod camera;
