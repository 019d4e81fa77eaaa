use crate::id::{Address, Amount, TokenId};
use std::fmt;
use std::io;
use thiserror::Error;

/// The record a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// No token with this id is tracked by the registry
    Token(TokenId),
    /// The exchange holds no listing for this token
    Listing(TokenId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Token(id) => write!(f, "token {}", id),
            Missing::Listing(id) => write!(f, "listing for token {}", id),
        }
    }
}

/// Capability a caller must hold for a guarded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Current owner of the token
    Owner,
    /// The registry's configured exchange authority
    ExchangeAuthority,
    /// The registry's administrative owner
    Admin,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Owner => write!(f, "owner"),
            Capability::ExchangeAuthority => write!(f, "exchange authority"),
            Capability::Admin => write!(f, "admin"),
        }
    }
}

/// Represents all possible errors raised by the registry, the exchange and their journals
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Token {0} already exists")]
    DuplicateIdentifier(TokenId),

    #[error("Not found: {0}")]
    NotFound(Missing),

    #[error("Unauthorized: {caller} is not the {required}")]
    Unauthorized {
        caller: Address,
        required: Capability,
    },

    #[error("Price {price} is below the minimum of {minimum}")]
    PriceTooLow { price: Amount, minimum: Amount },

    #[error("Token {0} is already listed")]
    AlreadyListed(TokenId),

    #[error("Buyer {buyer} already owns token {token_id}")]
    AlreadyOwned { buyer: Address, token_id: TokenId },

    #[error("Payment of {received} does not match the listing price of {expected}")]
    IncorrectPayment { expected: Amount, received: Amount },

    #[error("Insufficient funds: {account} holds {available}, needs {required}")]
    InsufficientFunds {
        account: Address,
        available: Amount,
        required: Amount,
    },

    #[error("Balance overflow for {0}")]
    BalanceOverflow(Address),

    /// A mutex guarding component state was poisoned by a panicking thread
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl MarketError {
    /// Whether this is a caller-correctable precondition violation.
    ///
    /// Precondition failures are detected before any state is touched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            MarketError::DuplicateIdentifier(_)
                | MarketError::NotFound(_)
                | MarketError::Unauthorized { .. }
                | MarketError::PriceTooLow { .. }
                | MarketError::AlreadyListed(_)
                | MarketError::AlreadyOwned { .. }
                | MarketError::IncorrectPayment { .. }
                | MarketError::InsufficientFunds { .. }
                | MarketError::BalanceOverflow(_)
        )
    }

    pub fn token_not_found(id: TokenId) -> Self {
        MarketError::NotFound(Missing::Token(id))
    }

    pub fn listing_not_found(id: TokenId) -> Self {
        MarketError::NotFound(Missing::Listing(id))
    }

    pub fn unauthorized(caller: &Address, required: Capability) -> Self {
        MarketError::Unauthorized {
            caller: *caller,
            required,
        }
    }

    pub fn poisoned(what: &str, err: impl fmt::Display) -> Self {
        MarketError::LockPoisoned(format!("Failed to acquire {} lock: {}", what, err))
    }
}

/// Result type for registry and exchange operations
pub type MarketResult<T> = Result<T, MarketError>;

impl From<bincode::Error> for MarketError {
    fn from(err: bincode::Error) -> Self {
        MarketError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Serialization(err.to_string())
    }
}
