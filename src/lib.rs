//! Bird-call event detection, spectral fingerprinting and nearest-neighbour
//! species classification.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod types;
