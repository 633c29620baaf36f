//! Tag-invalidated caching proxy.
//!
//! Responses from a single backend are cached per `(request, access group)`
//! under the JSON tags the backend names in its `cache-keys` header, and
//! evicted by tag when a later response carries `clear-keys` or an operator
//! calls the management API.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
