//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod server;
pub mod telemetry;
pub mod upstream;
