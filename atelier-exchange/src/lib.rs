pub mod exchange;
pub mod funds;

// Re-export the main types for convenience
pub use exchange::ExchangeEngine;
pub use funds::{BalanceSheet, Balances, PreparedTransfer};
