use atelier_core::error::{Capability, MarketError, MarketResult};
use atelier_core::events::{Event, EventBus, EventSubscriber};
use atelier_core::id::{Address, TokenId};
use atelier_core::objects::{Artwork, ArtworkMetadata};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mutable state of the registry, guarded by a single lock
#[derive(Debug, Default)]
struct RegistryState {
    /// Token records keyed by id
    artworks: HashMap<TokenId, Artwork>,

    /// Tracked ids in mint order
    token_ids: Vec<TokenId>,

    /// The only address allowed to call `update_owner`
    exchange_authority: Option<Address>,
}

/// Authoritative record of which address owns which artwork.
///
/// Ownership changes only through [`OwnershipRegistry::update_owner`], which
/// accepts calls solely from the configured exchange authority. Every
/// operation runs under one lock, validates all preconditions first and
/// applies its effects only when all of them hold.
#[derive(Debug)]
pub struct OwnershipRegistry {
    /// Derived address of this registry, used as the source of its events
    address: Address,

    /// Administrative owner, the only caller of `set_exchange_authority`
    admin: Address,

    state: Mutex<RegistryState>,

    events: EventBus,
}

impl OwnershipRegistry {
    /// Create an empty registry administered by `admin`
    pub fn new(admin: Address) -> Self {
        let address = Address::derive(&[b"registry", admin.bytes()]);
        Self {
            address,
            admin,
            state: Mutex::new(RegistryState::default()),
            events: EventBus::new(address),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Register a subscriber for the registry's change records
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> MarketResult<()> {
        self.events.subscribe(subscriber)
    }

    fn lock_state(&self) -> MarketResult<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|e| MarketError::poisoned("registry", e))
    }

    /// Create a token owned by `owner`.
    ///
    /// # Errors
    /// * `DuplicateIdentifier` - `token_id` is already tracked
    pub fn mint(
        &self,
        owner: Address,
        token_id: TokenId,
        metadata: ArtworkMetadata,
        on_sale: bool,
    ) -> MarketResult<()> {
        let mut state = self.lock_state()?;

        if state.artworks.contains_key(&token_id) {
            return Err(MarketError::DuplicateIdentifier(token_id));
        }

        let uri = metadata.uri.clone();
        state
            .artworks
            .insert(token_id, Artwork::new(token_id, owner, metadata, on_sale));
        state.token_ids.push(token_id);

        info!("Minted token {} to {}", token_id, owner);
        self.events.publish(Event::Minted {
            token_id,
            uri,
            owner,
        });
        Ok(())
    }

    /// Destroy a token. Only its current owner may burn it.
    ///
    /// # Errors
    /// * `NotFound` - `token_id` is not tracked
    /// * `Unauthorized` - `caller` is not the current owner
    pub fn burn(&self, caller: &Address, token_id: TokenId) -> MarketResult<Artwork> {
        let mut state = self.lock_state()?;

        let owner = state
            .artworks
            .get(&token_id)
            .map(|artwork| artwork.owner)
            .ok_or_else(|| MarketError::token_not_found(token_id))?;
        if owner != *caller {
            return Err(MarketError::unauthorized(caller, Capability::Owner));
        }

        let artwork = state
            .artworks
            .remove(&token_id)
            .ok_or_else(|| MarketError::token_not_found(token_id))?;
        state.token_ids.retain(|id| *id != token_id);

        info!("Burned token {} owned by {}", token_id, owner);
        self.events.publish(Event::Burned { token_id, owner });
        Ok(artwork)
    }

    /// Privileged transfer: reassign `token_id` to `new_owner`.
    ///
    /// Only the configured exchange authority may call this. Returns the
    /// previous owner.
    ///
    /// # Errors
    /// * `NotFound` - `token_id` is not tracked
    /// * `Unauthorized` - `caller` is not the exchange authority, or none is set
    pub fn update_owner(
        &self,
        caller: &Address,
        token_id: TokenId,
        new_owner: Address,
    ) -> MarketResult<Address> {
        let mut state = self.lock_state()?;

        if !state.artworks.contains_key(&token_id) {
            return Err(MarketError::token_not_found(token_id));
        }
        if state.exchange_authority != Some(*caller) {
            return Err(MarketError::unauthorized(
                caller,
                Capability::ExchangeAuthority,
            ));
        }

        let artwork = state
            .artworks
            .get_mut(&token_id)
            .ok_or_else(|| MarketError::token_not_found(token_id))?;
        let previous_owner = std::mem::replace(&mut artwork.owner, new_owner);

        debug!(
            "Owner of token {} updated from {} to {}",
            token_id, previous_owner, new_owner
        );
        self.events.publish(Event::OwnerUpdated {
            token_id,
            previous_owner,
            new_owner,
        });
        Ok(previous_owner)
    }

    /// Replace the exchange authority. Admin only. Returns the previous value.
    ///
    /// # Errors
    /// * `Unauthorized` - `caller` is not the admin
    pub fn set_exchange_authority(
        &self,
        caller: &Address,
        authority: Address,
    ) -> MarketResult<Option<Address>> {
        if *caller != self.admin {
            return Err(MarketError::unauthorized(caller, Capability::Admin));
        }

        let mut state = self.lock_state()?;
        let previous = state.exchange_authority.replace(authority);

        info!("Exchange authority set to {}", authority);
        self.events.publish(Event::ExchangeAuthorityUpdated {
            previous,
            current: authority,
        });
        Ok(previous)
    }

    pub fn exchange_authority(&self) -> MarketResult<Option<Address>> {
        Ok(self.lock_state()?.exchange_authority)
    }

    /// Current owner of `token_id`
    ///
    /// # Errors
    /// * `NotFound` - `token_id` is not tracked
    pub fn owner_of(&self, token_id: TokenId) -> MarketResult<Address> {
        self.lock_state()?
            .artworks
            .get(&token_id)
            .map(|artwork| artwork.owner)
            .ok_or_else(|| MarketError::token_not_found(token_id))
    }

    pub fn exists(&self, token_id: TokenId) -> MarketResult<bool> {
        Ok(self.lock_state()?.artworks.contains_key(&token_id))
    }

    /// Snapshot of the full record, `None` if untracked
    pub fn artwork(&self, token_id: TokenId) -> MarketResult<Option<Artwork>> {
        Ok(self.lock_state()?.artworks.get(&token_id).cloned())
    }

    fn read<T>(&self, token_id: TokenId, f: impl FnOnce(&Artwork) -> T) -> MarketResult<Option<T>> {
        Ok(self.lock_state()?.artworks.get(&token_id).map(f))
    }

    pub fn metadata(&self, token_id: TokenId) -> MarketResult<Option<ArtworkMetadata>> {
        self.read(token_id, |a| a.metadata.clone())
    }

    pub fn uri(&self, token_id: TokenId) -> MarketResult<Option<String>> {
        self.read(token_id, |a| a.metadata.uri.clone())
    }

    pub fn name(&self, token_id: TokenId) -> MarketResult<Option<String>> {
        self.read(token_id, |a| a.metadata.name.clone())
    }

    pub fn description(&self, token_id: TokenId) -> MarketResult<Option<String>> {
        self.read(token_id, |a| a.metadata.description.clone())
    }

    pub fn image_uri(&self, token_id: TokenId) -> MarketResult<Option<String>> {
        self.read(token_id, |a| a.metadata.image_uri.clone())
    }

    pub fn artist(&self, token_id: TokenId) -> MarketResult<Option<String>> {
        self.read(token_id, |a| a.metadata.artist.clone())
    }

    pub fn year(&self, token_id: TokenId) -> MarketResult<Option<String>> {
        self.read(token_id, |a| a.metadata.year.clone())
    }

    pub fn physical(&self, token_id: TokenId) -> MarketResult<Option<String>> {
        self.read(token_id, |a| a.metadata.physical.clone())
    }

    pub fn on_sale(&self, token_id: TokenId) -> MarketResult<Option<bool>> {
        self.read(token_id, |a| a.on_sale)
    }

    /// All tracked ids, in mint order
    pub fn token_ids(&self) -> MarketResult<Vec<TokenId>> {
        Ok(self.lock_state()?.token_ids.clone())
    }

    pub fn token_count(&self) -> MarketResult<usize> {
        Ok(self.lock_state()?.token_ids.len())
    }

    /// Ids owned by `owner`, in mint order
    pub fn tokens_of_owner(&self, owner: &Address) -> MarketResult<Vec<TokenId>> {
        let state = self.lock_state()?;
        Ok(state
            .token_ids
            .iter()
            .filter(|id| {
                state
                    .artworks
                    .get(*id)
                    .map_or(false, |artwork| artwork.is_owned_by(owner))
            })
            .copied()
            .collect())
    }
}
