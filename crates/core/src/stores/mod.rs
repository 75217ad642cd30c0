pub mod memory;
pub mod qdrant;

pub use memory::InMemoryRetriever;
pub use qdrant::QdrantStore;
