//! Search indexes receiving the transformed documents.

mod base;
pub mod elasticsearch;
pub mod memory;

pub use base::Destination;
pub use elasticsearch::ElasticsearchDestination;
pub use memory::MemoryDestination;
