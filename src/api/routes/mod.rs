//! API route modules.

pub mod meter;
pub mod settings;
pub mod source;
