//! Document store implementations

pub mod in_memory;
pub mod matcher;

pub use in_memory::InMemoryDocumentStore;
