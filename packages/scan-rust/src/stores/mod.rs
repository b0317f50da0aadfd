//! Built-in [`ObjectStore`](crate::store::ObjectStore) adapters.

pub mod dir;
pub mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;
