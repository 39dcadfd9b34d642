//! In-memory cloud backend: identity provider, remote store and push channel
//! behind one shared state, with hooks for injecting failures.

mod in_memory;

pub use in_memory::InMemoryCloud;
