pub mod eval;
pub mod store;

pub use store::{MemoryCatalogue, MemoryUow};
