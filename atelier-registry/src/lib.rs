pub mod registry;

pub use registry::OwnershipRegistry;
