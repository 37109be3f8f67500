//! In-memory caches rebuilt from hub watch passes
//!
//! Both caches share the same lifecycle: a single owning task refreshes them
//! with bounded watch passes, replacing the contents wholesale at the end of
//! each pass, while the node reconciler reads them freely in between. A
//! momentarily stale or empty cache reads as "not found", never as an error.

pub mod credentials;
pub mod nodepools;

pub use credentials::{ClusterCredentials, CredentialCache};
pub use nodepools::NodepoolCache;
