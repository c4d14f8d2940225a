//! git-maintain CI backends
//!
//! Provides [`gitmaint_core::CiProvider`] implementations for:
//! - Travis-style "branches" APIs
//! - Azure Pipelines "builds" APIs
//!
//! Both go through an injectable [`CiTransport`] and cache raw responses
//! until [`gitmaint_core::CiProvider::clear_cache`] is called.

pub mod azure;
pub mod cache;
pub mod router;
pub mod transport;
pub mod travis;

// Re-export key types
pub use azure::AzureProvider;
pub use cache::ResponseCache;
pub use router::build_router;
pub use transport::{CiTransport, HttpTransport};
pub use travis::TravisProvider;
