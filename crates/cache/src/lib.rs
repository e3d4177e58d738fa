//! Cache-aside support for derived values.
//!
//! [`Cache`] is the raw key/value port. [`CacheNamespace`] layers a typed,
//! prefixed view on top and implements get-or-compute with explicit
//! invalidation.

pub mod error;
pub mod memory;
pub mod namespace;
pub mod store;

pub use error::{CacheError, Result};
pub use memory::InMemoryCache;
pub use namespace::CacheNamespace;
pub use store::Cache;
