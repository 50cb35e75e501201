//! Storage mechanisms for optional message history

pub mod memory;
pub mod traits;

// Re-export main components
pub use memory::MemoryMessageStore;
pub use traits::{HistoryPage, PersistenceEngine, SharedPersistenceEngine};
