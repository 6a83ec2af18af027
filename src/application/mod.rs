//! Application services: upstream delivery access and webhook authenticity.

pub mod delivery;
pub mod error;
pub mod signature;
