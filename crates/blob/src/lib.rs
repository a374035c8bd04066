pub mod error;
pub mod memory;
pub mod store;

pub use error::BlobError;
pub use memory::MemoryBlobStore;
pub use store::BlobStore;
