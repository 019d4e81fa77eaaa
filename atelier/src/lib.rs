//! Atelier: artwork ownership registry and marketplace
//!
//! This crate re-exports all the components of the Atelier system.

pub use atelier_core::*;
pub use atelier_exchange::*;
pub use atelier_journal::*;
pub use atelier_registry::*;
