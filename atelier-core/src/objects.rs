use crate::id::{Address, Amount, TokenId};
use serde::{Deserialize, Serialize};

/// Descriptive metadata attached to an artwork at mint time.
///
/// Stored and returned verbatim; nothing in the registry or the exchange
/// inspects these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkMetadata {
    /// Primary metadata reference, carried by the minted event
    pub uri: String,
    pub name: String,
    pub description: String,
    pub image_uri: String,
    pub artist: String,
    /// Creation year as supplied by the minter
    pub year: String,
    /// Physical/provenance marker as supplied by the minter
    pub physical: String,
}

impl ArtworkMetadata {
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        image_uri: impl Into<String>,
        artist: impl Into<String>,
        year: impl Into<String>,
        physical: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: description.into(),
            image_uri: image_uri.into(),
            artist: artist.into(),
            year: year.into(),
            physical: physical.into(),
        }
    }
}

/// A token record held by the ownership registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artwork {
    /// Unique identifier, immutable once minted
    pub id: TokenId,

    /// Current owner. Changed only by the registry's privileged transfer.
    pub owner: Address,

    /// Immutable descriptive metadata
    pub metadata: ArtworkMetadata,

    /// Sale intent declared at mint time. Informational only: whether a
    /// listing exists is decided by the exchange.
    pub on_sale: bool,
}

impl Artwork {
    pub fn new(id: TokenId, owner: Address, metadata: ArtworkMetadata, on_sale: bool) -> Self {
        Self {
            id,
            owner,
            metadata,
            on_sale,
        }
    }

    pub fn id(&self) -> &TokenId {
        &self.id
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn is_owned_by(&self, address: &Address) -> bool {
        self.owner == *address
    }
}

/// An active sale offer held by the exchange, at most one per token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub token_id: TokenId,

    /// Asking price, never below the exchange's configured floor
    pub price: Amount,

    /// The address that created the listing
    pub seller: Address,
}

impl Listing {
    pub fn new(token_id: TokenId, price: Amount, seller: Address) -> Self {
        Self {
            token_id,
            price,
            seller,
        }
    }
}

/// Receipt of a completed purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub token_id: TokenId,
    pub buyer: Address,
    pub seller: Address,
    pub price: Amount,
}
