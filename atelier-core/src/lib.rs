pub mod config;
pub mod error;
pub mod events;
pub mod id;
pub mod objects;

// Re-export the main types for convenience
pub use config::ExchangeConfig;
pub use error::{Capability, MarketError, MarketResult, Missing};
pub use events::{Event, EventBus, EventRecord, EventSubscriber};
pub use id::{Address, Amount, TokenId};
pub use objects::{Artwork, ArtworkMetadata, Listing, Purchase};
