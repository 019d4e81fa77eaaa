pub mod journal;
pub mod memory;

// Re-export the main types for convenience
pub use journal::{FileEventJournal, JournalIterator};
pub use memory::InMemoryEventLog;
