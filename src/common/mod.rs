//! Common types, traits and error definitions shared across modules

pub mod channels;
pub mod errors;
pub mod traits;
pub mod types;
