use crate::funds::Balances;
use atelier_core::config::ExchangeConfig;
use atelier_core::error::{Capability, MarketError, MarketResult};
use atelier_core::events::{Event, EventBus, EventSubscriber};
use atelier_core::id::{Address, Amount, TokenId};
use atelier_core::objects::{Listing, Purchase};
use atelier_registry::OwnershipRegistry;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Active listings, guarded by a single lock
#[derive(Debug, Default)]
struct ExchangeState {
    listings: HashMap<TokenId, Listing>,

    /// Listed token ids in listing order
    order: Vec<TokenId>,
}

impl ExchangeState {
    fn insert(&mut self, listing: Listing) {
        self.order.push(listing.token_id);
        self.listings.insert(listing.token_id, listing);
    }

    fn remove(&mut self, token_id: TokenId) -> Option<Listing> {
        let listing = self.listings.remove(&token_id)?;
        self.order.retain(|id| *id != token_id);
        Some(listing)
    }
}

/// Marketplace that lists registry tokens for sale and settles purchases.
///
/// The engine never stores ownership itself: every listing mutation asks the
/// registry who owns the token, and a purchase moves ownership through the
/// registry's privileged transfer. That only works once the registry admin
/// has made [`ExchangeEngine::address`] the registry's exchange authority.
///
/// A purchase holds the engine lock, then the balance book, then (inside
/// `update_owner`) the registry lock. Payment is prepared first, applied
/// only after the registry accepted the transfer, and the listing is removed
/// last; a failure at any step leaves all three untouched.
#[derive(Debug)]
pub struct ExchangeEngine {
    /// Derived address; the identity the registry must trust
    address: Address,

    config: ExchangeConfig,

    registry: Arc<OwnershipRegistry>,

    balances: Arc<Balances>,

    state: Mutex<ExchangeState>,

    events: EventBus,
}

impl ExchangeEngine {
    /// Create an engine bound to `registry` for its whole lifetime
    ///
    /// # Errors
    /// * `Config` - `config` fails validation
    pub fn new(
        registry: Arc<OwnershipRegistry>,
        balances: Arc<Balances>,
        config: ExchangeConfig,
    ) -> MarketResult<Self> {
        config.validate()?;

        let address = Address::derive(&[
            b"exchange",
            registry.address().bytes(),
            config.label.as_bytes(),
        ]);
        info!(
            "Exchange {} created for registry {} with price floor {}",
            address,
            registry.address(),
            config.min_price
        );

        Ok(Self {
            address,
            config,
            registry,
            balances,
            state: Mutex::new(ExchangeState::default()),
            events: EventBus::new(address),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<OwnershipRegistry> {
        &self.registry
    }

    pub fn balances(&self) -> &Arc<Balances> {
        &self.balances
    }

    /// Register a subscriber for the exchange's change records
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> MarketResult<()> {
        self.events.subscribe(subscriber)
    }

    fn lock_state(&self) -> MarketResult<MutexGuard<'_, ExchangeState>> {
        self.state
            .lock()
            .map_err(|e| MarketError::poisoned("exchange", e))
    }

    fn check_price(&self, price: Amount) -> MarketResult<()> {
        if price < self.config.min_price {
            return Err(MarketError::PriceTooLow {
                price,
                minimum: self.config.min_price,
            });
        }
        Ok(())
    }

    fn require_owner(&self, caller: &Address, token_id: TokenId) -> MarketResult<()> {
        if self.registry.owner_of(token_id)? != *caller {
            return Err(MarketError::unauthorized(caller, Capability::Owner));
        }
        Ok(())
    }

    /// Offer `token_id` for sale at `price`.
    ///
    /// # Errors
    /// * `PriceTooLow` - `price` is below the configured floor
    /// * `NotFound` - the registry does not track `token_id`
    /// * `Unauthorized` - `caller` does not own the token
    /// * `AlreadyListed` - the token already has a listing
    pub fn list(&self, caller: &Address, token_id: TokenId, price: Amount) -> MarketResult<Listing> {
        self.check_price(price)?;

        let mut state = self.lock_state()?;
        self.require_owner(caller, token_id)?;
        if state.listings.contains_key(&token_id) {
            return Err(MarketError::AlreadyListed(token_id));
        }

        let listing = Listing::new(token_id, price, *caller);
        state.insert(listing.clone());

        info!("Listed token {} at {} by {}", token_id, price, caller);
        self.events.publish(Event::Listed {
            token_id,
            price,
            seller: *caller,
        });
        Ok(listing)
    }

    /// Withdraw the listing for `token_id`.
    ///
    /// If the token has been burned since it was listed, the seller recorded
    /// on the listing may still withdraw it. The unlisted event names the
    /// seller recorded on the listing.
    ///
    /// # Errors
    /// * `NotFound` - no listing exists for `token_id`
    /// * `Unauthorized` - `caller` does not own the token, or the token was
    ///   burned and `caller` is not the recorded seller
    pub fn unlist(&self, caller: &Address, token_id: TokenId) -> MarketResult<Listing> {
        let mut state = self.lock_state()?;

        let seller = state
            .listings
            .get(&token_id)
            .map(|listing| listing.seller)
            .ok_or_else(|| MarketError::listing_not_found(token_id))?;

        match self.registry.owner_of(token_id) {
            Ok(owner) if owner == *caller => {}
            Ok(_) => return Err(MarketError::unauthorized(caller, Capability::Owner)),
            Err(MarketError::NotFound(_)) if seller == *caller => {
                debug!("Withdrawing listing for burned token {}", token_id);
            }
            Err(MarketError::NotFound(_)) => {
                return Err(MarketError::unauthorized(caller, Capability::Owner))
            }
            Err(e) => return Err(e),
        }

        let listing = state
            .remove(token_id)
            .ok_or_else(|| MarketError::listing_not_found(token_id))?;

        info!("Unlisted token {} by {}", token_id, caller);
        self.events.publish(Event::Unlisted {
            token_id,
            seller: listing.seller,
        });
        Ok(listing)
    }

    /// Change the asking price of an existing listing. Returns the old price.
    ///
    /// # Errors
    /// * `NotFound` - no listing exists for `token_id`
    /// * `Unauthorized` - `caller` does not own the token
    /// * `PriceTooLow` - `new_price` is below the configured floor
    pub fn set_price(
        &self,
        caller: &Address,
        token_id: TokenId,
        new_price: Amount,
    ) -> MarketResult<Amount> {
        let mut state = self.lock_state()?;

        if !state.listings.contains_key(&token_id) {
            return Err(MarketError::listing_not_found(token_id));
        }
        self.require_owner(caller, token_id)?;
        self.check_price(new_price)?;

        let listing = state
            .listings
            .get_mut(&token_id)
            .ok_or_else(|| MarketError::listing_not_found(token_id))?;
        let previous = std::mem::replace(&mut listing.price, new_price);

        info!(
            "Repriced token {} from {} to {} by {}",
            token_id, previous, new_price, caller
        );
        Ok(previous)
    }

    /// Buy `token_id`, paying exactly its listed price from `buyer`'s balance.
    ///
    /// Payment to the seller, the ownership transfer, removal of the listing
    /// and the bought event happen together or not at all.
    ///
    /// # Errors
    /// * `NotFound` - no listing exists for `token_id`, or the token was burned
    /// * `AlreadyOwned` - `buyer` already owns the token
    /// * `IncorrectPayment` - `payment` differs from the listing price
    /// * `InsufficientFunds` - `buyer` cannot cover `payment`
    /// * `Unauthorized` - the listing's seller no longer owns the token, or
    ///   the registry does not accept this engine as its exchange authority
    pub fn buy(&self, buyer: &Address, token_id: TokenId, payment: Amount) -> MarketResult<Purchase> {
        let result = self.settle(buyer, token_id, payment);
        match &result {
            Ok(purchase) => info!(
                "Token {} bought by {} from {} for {}",
                token_id, buyer, purchase.seller, purchase.price
            ),
            Err(e) => debug!("Rejected purchase of token {} by {}: {}", token_id, buyer, e),
        }
        result
    }

    fn settle(&self, buyer: &Address, token_id: TokenId, payment: Amount) -> MarketResult<Purchase> {
        let mut state = self.lock_state()?;

        let listing = state
            .listings
            .get(&token_id)
            .cloned()
            .ok_or_else(|| MarketError::listing_not_found(token_id))?;

        let owner = self.registry.owner_of(token_id)?;
        if owner == *buyer {
            return Err(MarketError::AlreadyOwned {
                buyer: *buyer,
                token_id,
            });
        }
        // The token was burned and minted again after it was listed
        if owner != listing.seller {
            return Err(MarketError::unauthorized(&listing.seller, Capability::Owner));
        }
        if payment != listing.price {
            return Err(MarketError::IncorrectPayment {
                expected: listing.price,
                received: payment,
            });
        }

        // Stage the payment, move ownership, then commit the payment
        let mut sheet = self.balances.reserve()?;
        let transfer = sheet.prepare_transfer(buyer, &listing.seller, payment)?;
        self.registry.update_owner(&self.address, token_id, *buyer)?;
        sheet.apply(transfer);
        drop(sheet);

        state.remove(token_id);

        let purchase = Purchase {
            token_id,
            buyer: *buyer,
            seller: listing.seller,
            price: listing.price,
        };
        self.events.publish(Event::Bought {
            buyer: purchase.buyer,
            token_id,
            seller: purchase.seller,
            price: purchase.price,
        });
        Ok(purchase)
    }

    /// The listing for `token_id`
    ///
    /// # Errors
    /// * `NotFound` - no listing exists for `token_id`
    pub fn listing(&self, token_id: TokenId) -> MarketResult<Listing> {
        self.lock_state()?
            .listings
            .get(&token_id)
            .cloned()
            .ok_or_else(|| MarketError::listing_not_found(token_id))
    }

    pub fn listing_price(&self, token_id: TokenId) -> MarketResult<Amount> {
        self.listing(token_id).map(|listing| listing.price)
    }

    pub fn listing_seller(&self, token_id: TokenId) -> MarketResult<Address> {
        self.listing(token_id).map(|listing| listing.seller)
    }

    pub fn is_listed(&self, token_id: TokenId) -> MarketResult<bool> {
        Ok(self.lock_state()?.listings.contains_key(&token_id))
    }

    /// All active listings, in the order they were created
    pub fn listings(&self) -> MarketResult<Vec<Listing>> {
        let state = self.lock_state()?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.listings.get(id).cloned())
            .collect())
    }

    pub fn listing_count(&self) -> MarketResult<usize> {
        Ok(self.lock_state()?.order.len())
    }
}

#[cfg(test)]
mod tests;
