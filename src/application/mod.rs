//! Application layer: error reporting and the backend tag header contract.

pub mod error;
pub mod intercept;
