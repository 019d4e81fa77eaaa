//! Observable change records emitted by the registry and the exchange.
//!
//! Each component owns an [`EventBus`]. Records are published after a
//! mutation has been fully applied and while the component still holds its
//! state lock, so the sequence numbers of one component follow commit order.
//! Subscribers are for indexing and auditing only: a failing subscriber is
//! logged and otherwise ignored.

use crate::error::{MarketError, MarketResult};
use crate::id::{Address, Amount, TokenId};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A state change in the registry or the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Minted {
        token_id: TokenId,
        uri: String,
        owner: Address,
    },
    Burned {
        token_id: TokenId,
        owner: Address,
    },
    OwnerUpdated {
        token_id: TokenId,
        previous_owner: Address,
        new_owner: Address,
    },
    /// `previous` is `None` the first time an authority is configured
    ExchangeAuthorityUpdated {
        previous: Option<Address>,
        current: Address,
    },
    Listed {
        token_id: TokenId,
        price: Amount,
        seller: Address,
    },
    Unlisted {
        token_id: TokenId,
        seller: Address,
    },
    Bought {
        buyer: Address,
        token_id: TokenId,
        seller: Address,
        price: Amount,
    },
}

impl Event {
    /// Short, stable name of the event kind
    pub fn name(&self) -> &'static str {
        match self {
            Event::Minted { .. } => "minted",
            Event::Burned { .. } => "burned",
            Event::OwnerUpdated { .. } => "owner_updated",
            Event::ExchangeAuthorityUpdated { .. } => "authority_updated",
            Event::Listed { .. } => "listed",
            Event::Unlisted { .. } => "unlisted",
            Event::Bought { .. } => "bought",
        }
    }

    /// The token this event concerns, if any
    pub fn token_id(&self) -> Option<TokenId> {
        match self {
            Event::Minted { token_id, .. }
            | Event::Burned { token_id, .. }
            | Event::OwnerUpdated { token_id, .. }
            | Event::Listed { token_id, .. }
            | Event::Unlisted { token_id, .. }
            | Event::Bought { token_id, .. } => Some(*token_id),
            Event::ExchangeAuthorityUpdated { .. } => None,
        }
    }
}

/// An event stamped with its position in the emitter's stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Per-emitter sequence number, starting at 0
    pub sequence: u64,

    /// Address of the emitting component
    pub source: Address,

    /// Wall clock time of publication
    pub timestamp: DateTime<Utc>,

    pub event: Event,
}

/// Receives every record published on a bus it is subscribed to.
///
/// Records are delivered while the publishing component still holds its
/// state lock (and, for a purchase, the balance book as well). A subscriber
/// must not call back into the registry, the exchange or the balance book
/// from `on_event`; those locks are not re-entrant and the call deadlocks.
/// Subscribers that need current state should queue the record and query
/// after `on_event` returns.
pub trait EventSubscriber: Send + Sync {
    /// Handle one record.
    ///
    /// # Returns
    /// Ok(()) if the record was accepted. Errors are logged by the bus and
    /// never reach the operation that produced the record.
    fn on_event(&self, record: &EventRecord) -> MarketResult<()>;
}

/// Fan-out of a component's change records to its subscribers
pub struct EventBus {
    source: Address,
    next_sequence: AtomicU64,
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventBus {
    pub fn new(source: Address) -> Self {
        Self {
            source,
            next_sequence: AtomicU64::new(0),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn source(&self) -> &Address {
        &self.source
    }

    /// Register a subscriber for all subsequently published records
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> MarketResult<()> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|e| MarketError::poisoned("subscriber", e))?;
        subscribers.push(subscriber);
        Ok(())
    }

    /// Number of records published so far
    pub fn published(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    /// Stamp `event` and deliver it to every subscriber
    pub fn publish(&self, event: Event) -> EventRecord {
        let record = EventRecord {
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            source: self.source,
            timestamp: Utc::now(),
            event,
        };

        match self.subscribers.read() {
            Ok(subscribers) => {
                for subscriber in subscribers.iter() {
                    if let Err(e) = subscriber.on_event(&record) {
                        warn!(
                            "Subscriber rejected {} event #{} from {}: {}",
                            record.event.name(),
                            record.sequence,
                            self.source,
                            e
                        );
                    }
                }
            }
            Err(e) => warn!("Dropping {} event: {}", record.event.name(), e),
        }

        record
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.subscribers.read().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("EventBus")
            .field("source", &self.source)
            .field("published", &self.published())
            .field("subscribers", &subscribers)
            .finish()
    }
}
