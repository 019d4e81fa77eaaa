use super::*;
use atelier_core::error::Missing;
use atelier_core::objects::ArtworkMetadata;
use atelier_journal::{FileEventJournal, InMemoryEventLog};
use std::thread;
use tempfile::tempdir;

/// 0.01 of a currency with 18 decimals
const PRICE: Amount = 10_000_000_000_000_000;
const NEW_PRICE: Amount = 20_000_000_000_000_000;
const LOW_PRICE: Amount = 1_000_000_000_000_000;
const STARTING_BALANCE: Amount = 1_000_000_000_000_000_000;

fn admin() -> Address {
    Address::new([1; 32])
}

fn artist1() -> Address {
    Address::new([2; 32])
}

fn artist2() -> Address {
    Address::new([3; 32])
}

fn buyer1() -> Address {
    Address::new([4; 32])
}

fn buyer2() -> Address {
    Address::new([5; 32])
}

fn metadata(n: u64) -> ArtworkMetadata {
    ArtworkMetadata::new(
        format!("URITest{}", n),
        format!("NameTest{}", n),
        format!("DescriptionTest{}", n),
        format!("ImageURITest{}", n),
        format!("ArtistTest{}", n),
        format!("{}", 2020 + n),
        format!("PhysicalTest{}", n),
    )
}

struct Fixture {
    registry: Arc<OwnershipRegistry>,
    balances: Arc<Balances>,
    exchange: ExchangeEngine,
    registry_log: Arc<InMemoryEventLog>,
    exchange_log: Arc<InMemoryEventLog>,
}

impl Fixture {
    fn new() -> Self {
        let registry = Arc::new(OwnershipRegistry::new(admin()));
        let balances = Arc::new(Balances::new());
        for account in [artist1(), artist2(), buyer1(), buyer2()] {
            balances.deposit(account, STARTING_BALANCE).unwrap();
        }

        let exchange = ExchangeEngine::new(
            registry.clone(),
            balances.clone(),
            ExchangeConfig::with_min_price(PRICE),
        )
        .unwrap();
        registry
            .set_exchange_authority(&admin(), *exchange.address())
            .unwrap();

        let registry_log = Arc::new(InMemoryEventLog::new());
        let exchange_log = Arc::new(InMemoryEventLog::new());
        registry.subscribe(registry_log.clone()).unwrap();
        exchange.subscribe(exchange_log.clone()).unwrap();

        Self {
            registry,
            balances,
            exchange,
            registry_log,
            exchange_log,
        }
    }

    fn mint(&self, owner: Address, id: u64) {
        self.registry
            .mint(owner, TokenId(id), metadata(id), true)
            .unwrap();
    }

    fn mint_and_list(&self, owner: Address, id: u64, price: Amount) {
        self.mint(owner, id);
        self.exchange.list(&owner, TokenId(id), price).unwrap();
    }

    fn balance(&self, account: Address) -> Amount {
        self.balances.balance_of(&account).unwrap()
    }
}

#[test]
fn test_authority_points_at_engine() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.registry.exchange_authority().unwrap(),
        Some(*fixture.exchange.address())
    );
    assert!(Address::is_off_curve(fixture.exchange.address()));
}

#[test]
fn test_list_artwork() {
    let fixture = Fixture::new();
    fixture.mint(artist1(), 1);

    let listing = fixture.exchange.list(&artist1(), TokenId(1), PRICE).unwrap();

    assert_eq!(listing, Listing::new(TokenId(1), PRICE, artist1()));
    assert_eq!(fixture.exchange.listing(TokenId(1)).unwrap(), listing);
    assert_eq!(fixture.exchange.listing_count().unwrap(), 1);
    assert!(fixture.exchange.is_listed(TokenId(1)).unwrap());
    assert_eq!(
        fixture.exchange_log.last_event(),
        Some(Event::Listed {
            token_id: TokenId(1),
            price: PRICE,
            seller: artist1(),
        })
    );
}

#[test]
fn test_listings_enumerate_in_listing_order() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);
    fixture.mint_and_list(artist1(), 2, NEW_PRICE);

    let listings = fixture.exchange.listings().unwrap();
    assert_eq!(listings.len(), 2);
    assert_eq!(listings[0].token_id, TokenId(1));
    assert_eq!(listings[0].price, PRICE);
    assert_eq!(listings[1].token_id, TokenId(2));
    assert_eq!(listings[1].price, NEW_PRICE);
}

#[test]
fn test_listing_accessors() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);

    assert_eq!(fixture.exchange.listing_seller(TokenId(1)).unwrap(), artist1());
    assert_eq!(fixture.exchange.listing_price(TokenId(1)).unwrap(), PRICE);
    assert!(matches!(
        fixture.exchange.listing_price(TokenId(2)),
        Err(MarketError::NotFound(Missing::Listing(TokenId(2))))
    ));
}

#[test]
fn test_unlist_artwork() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);
    fixture.mint_and_list(artist1(), 2, PRICE);

    let removed = fixture.exchange.unlist(&artist1(), TokenId(1)).unwrap();

    assert_eq!(removed.token_id, TokenId(1));
    assert_eq!(fixture.exchange.listing_count().unwrap(), 1);
    assert_eq!(fixture.exchange.listings().unwrap()[0].token_id, TokenId(2));
    assert!(!fixture.exchange.is_listed(TokenId(1)).unwrap());
    assert_eq!(
        fixture.exchange_log.last_event(),
        Some(Event::Unlisted {
            token_id: TokenId(1),
            seller: artist1(),
        })
    );
}

#[test]
fn test_set_price() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);
    let events_before = fixture.exchange_log.len();

    let previous = fixture
        .exchange
        .set_price(&artist1(), TokenId(1), NEW_PRICE)
        .unwrap();

    assert_eq!(previous, PRICE);
    assert_eq!(fixture.exchange.listing_price(TokenId(1)).unwrap(), NEW_PRICE);
    // Repricing publishes no record
    assert_eq!(fixture.exchange_log.len(), events_before);

    let result = fixture.exchange.set_price(&buyer1(), TokenId(1), PRICE);
    assert!(matches!(
        result,
        Err(MarketError::Unauthorized {
            required: Capability::Owner,
            ..
        })
    ));
    assert_eq!(fixture.exchange.listing_price(TokenId(1)).unwrap(), NEW_PRICE);
}

#[test]
fn test_buy_artwork() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);

    let purchase = fixture.exchange.buy(&buyer1(), TokenId(1), PRICE).unwrap();

    assert_eq!(
        purchase,
        Purchase {
            token_id: TokenId(1),
            buyer: buyer1(),
            seller: artist1(),
            price: PRICE,
        }
    );
    assert_eq!(fixture.exchange.listing_count().unwrap(), 0);
    assert_eq!(fixture.registry.owner_of(TokenId(1)).unwrap(), buyer1());
    assert_eq!(fixture.balance(artist1()), STARTING_BALANCE + PRICE);
    assert_eq!(fixture.balance(buyer1()), STARTING_BALANCE - PRICE);
    assert_eq!(fixture.balances.total_supply().unwrap(), 4 * STARTING_BALANCE);

    assert_eq!(
        fixture.exchange_log.last_event(),
        Some(Event::Bought {
            buyer: buyer1(),
            token_id: TokenId(1),
            seller: artist1(),
            price: PRICE,
        })
    );
    assert_eq!(
        fixture.registry_log.last_event(),
        Some(Event::OwnerUpdated {
            token_id: TokenId(1),
            previous_owner: artist1(),
            new_owner: buyer1(),
        })
    );
}

#[test]
fn test_buyer_can_resell() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);
    fixture.exchange.buy(&buyer1(), TokenId(1), PRICE).unwrap();

    // The previous owner can no longer list it
    let result = fixture.exchange.list(&artist1(), TokenId(1), PRICE);
    assert!(matches!(result, Err(MarketError::Unauthorized { .. })));

    fixture.exchange.list(&buyer1(), TokenId(1), NEW_PRICE).unwrap();
    fixture.exchange.buy(&buyer2(), TokenId(1), NEW_PRICE).unwrap();

    assert_eq!(fixture.registry.owner_of(TokenId(1)).unwrap(), buyer2());
    assert_eq!(fixture.balance(buyer1()), STARTING_BALANCE - PRICE + NEW_PRICE);
    assert_eq!(fixture.balance(buyer2()), STARTING_BALANCE - NEW_PRICE);
}

#[test]
fn test_buy_unlisted_item() {
    let fixture = Fixture::new();

    let result = fixture.exchange.buy(&buyer1(), TokenId(1), PRICE);
    assert!(matches!(
        result,
        Err(MarketError::NotFound(Missing::Listing(TokenId(1))))
    ));

    fixture.mint_and_list(artist1(), 1, PRICE);
    fixture.exchange.unlist(&artist1(), TokenId(1)).unwrap();

    let result = fixture.exchange.buy(&buyer1(), TokenId(1), PRICE);
    assert!(matches!(result, Err(MarketError::NotFound(_))));
    assert_eq!(fixture.registry.owner_of(TokenId(1)).unwrap(), artist1());
}

#[test]
fn test_buy_own_artwork() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);

    let result = fixture.exchange.buy(&artist1(), TokenId(1), PRICE);
    assert!(matches!(result, Err(MarketError::AlreadyOwned { .. })));
    assert!(fixture.exchange.is_listed(TokenId(1)).unwrap());
}

#[test]
fn test_buy_with_incorrect_payment() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);

    for payment in [NEW_PRICE, PRICE - 1, PRICE + 1, 0] {
        let result = fixture.exchange.buy(&buyer1(), TokenId(1), payment);
        assert!(matches!(
            result,
            Err(MarketError::IncorrectPayment {
                expected: PRICE,
                ..
            })
        ));
    }

    assert_eq!(fixture.exchange.listing(TokenId(1)).unwrap().price, PRICE);
    assert_eq!(fixture.registry.owner_of(TokenId(1)).unwrap(), artist1());
    assert_eq!(fixture.balance(buyer1()), STARTING_BALANCE);
}

#[test]
fn test_buy_with_insufficient_funds() {
    let fixture = Fixture::new();
    let broke = Address::new([8; 32]);
    fixture.balances.deposit(broke, PRICE - 1).unwrap();
    fixture.mint_and_list(artist1(), 1, PRICE);
    let registry_events = fixture.registry_log.len();

    let result = fixture.exchange.buy(&broke, TokenId(1), PRICE);

    assert!(matches!(result, Err(MarketError::InsufficientFunds { .. })));
    assert!(fixture.exchange.is_listed(TokenId(1)).unwrap());
    assert_eq!(fixture.registry.owner_of(TokenId(1)).unwrap(), artist1());
    assert_eq!(fixture.balance(broke), PRICE - 1);
    assert_eq!(fixture.balance(artist1()), STARTING_BALANCE);
    assert_eq!(fixture.registry_log.len(), registry_events);
}

#[test]
fn test_buy_through_unauthorized_engine_has_no_effect() {
    let fixture = Fixture::new();
    let rogue = ExchangeEngine::new(
        fixture.registry.clone(),
        fixture.balances.clone(),
        ExchangeConfig {
            min_price: PRICE,
            label: "rogue".to_string(),
        },
    )
    .unwrap();
    assert_ne!(rogue.address(), fixture.exchange.address());

    fixture.mint(artist1(), 1);
    rogue.list(&artist1(), TokenId(1), PRICE).unwrap();

    let result = rogue.buy(&buyer1(), TokenId(1), PRICE);

    assert!(matches!(
        result,
        Err(MarketError::Unauthorized {
            required: Capability::ExchangeAuthority,
            ..
        })
    ));
    assert!(rogue.is_listed(TokenId(1)).unwrap());
    assert_eq!(fixture.registry.owner_of(TokenId(1)).unwrap(), artist1());
    assert_eq!(fixture.balance(buyer1()), STARTING_BALANCE);
    assert_eq!(fixture.balance(artist1()), STARTING_BALANCE);
}

#[test]
fn test_price_floor_boundary() {
    let fixture = Fixture::new();
    fixture.mint(artist1(), 1);
    fixture.mint(artist1(), 2);

    let result = fixture.exchange.list(&artist1(), TokenId(1), PRICE - 1);
    assert!(matches!(
        result,
        Err(MarketError::PriceTooLow {
            price,
            minimum: PRICE,
        }) if price == PRICE - 1
    ));
    let result = fixture.exchange.list(&artist1(), TokenId(1), LOW_PRICE);
    assert!(matches!(result, Err(MarketError::PriceTooLow { .. })));
    assert_eq!(fixture.exchange.listing_count().unwrap(), 0);

    fixture.exchange.list(&artist1(), TokenId(1), PRICE).unwrap();

    // The floor is checked before ownership
    let result = fixture.exchange.list(&buyer1(), TokenId(2), PRICE - 1);
    assert!(matches!(result, Err(MarketError::PriceTooLow { .. })));
}

#[test]
fn test_list_unknown_artwork() {
    let fixture = Fixture::new();

    let result = fixture.exchange.list(&artist1(), TokenId(1), PRICE);
    assert!(matches!(
        result,
        Err(MarketError::NotFound(Missing::Token(TokenId(1))))
    ));
}

#[test]
fn test_list_requires_owner() {
    let fixture = Fixture::new();
    fixture.mint(artist1(), 1);

    let result = fixture.exchange.list(&artist2(), TokenId(1), PRICE);
    assert!(matches!(
        result,
        Err(MarketError::Unauthorized {
            required: Capability::Owner,
            ..
        })
    ));
    assert_eq!(fixture.exchange.listing_count().unwrap(), 0);
}

#[test]
fn test_list_twice() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);
    let listings_before = fixture.exchange.listings().unwrap();
    let events_before = fixture.exchange_log.len();

    let result = fixture.exchange.list(&artist1(), TokenId(1), NEW_PRICE);

    assert!(matches!(result, Err(MarketError::AlreadyListed(TokenId(1)))));
    assert_eq!(fixture.exchange.listings().unwrap(), listings_before);
    assert_eq!(fixture.exchange_log.len(), events_before);
}

#[test]
fn test_unlist_requires_owner() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);

    let result = fixture.exchange.unlist(&artist2(), TokenId(1));
    assert!(matches!(result, Err(MarketError::Unauthorized { .. })));
    assert!(fixture.exchange.is_listed(TokenId(1)).unwrap());
}

#[test]
fn test_unlist_unknown_listing() {
    let fixture = Fixture::new();
    fixture.mint(artist1(), 1);

    let result = fixture.exchange.unlist(&artist1(), TokenId(1));
    assert!(matches!(
        result,
        Err(MarketError::NotFound(Missing::Listing(TokenId(1))))
    ));
}

#[test]
fn test_set_price_unknown_listing() {
    let fixture = Fixture::new();
    fixture.mint(artist1(), 1);

    let result = fixture.exchange.set_price(&artist1(), TokenId(1), PRICE);
    assert!(matches!(result, Err(MarketError::NotFound(_))));
}

#[test]
fn test_set_price_too_low() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);

    let result = fixture.exchange.set_price(&artist1(), TokenId(1), LOW_PRICE);
    assert!(matches!(result, Err(MarketError::PriceTooLow { .. })));
    assert_eq!(fixture.exchange.listing_price(TokenId(1)).unwrap(), PRICE);
}

#[test]
fn test_burned_listing() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);
    fixture.registry.burn(&artist1(), TokenId(1)).unwrap();

    let result = fixture.exchange.buy(&buyer1(), TokenId(1), PRICE);
    assert!(matches!(
        result,
        Err(MarketError::NotFound(Missing::Token(TokenId(1))))
    ));
    assert_eq!(fixture.balance(buyer1()), STARTING_BALANCE);

    // Only the recorded seller may clear the stale listing
    let result = fixture.exchange.unlist(&buyer1(), TokenId(1));
    assert!(matches!(
        result,
        Err(MarketError::Unauthorized {
            required: Capability::Owner,
            ..
        })
    ));
    assert!(fixture.exchange.is_listed(TokenId(1)).unwrap());

    fixture.exchange.unlist(&artist1(), TokenId(1)).unwrap();
    assert_eq!(fixture.exchange.listing_count().unwrap(), 0);

    // A burned token cannot be listed again
    let result = fixture.exchange.list(&artist1(), TokenId(1), PRICE);
    assert!(matches!(result, Err(MarketError::NotFound(_))));
}

#[test]
fn test_listing_from_before_a_reminted_token() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);
    fixture.registry.burn(&artist1(), TokenId(1)).unwrap();
    fixture.mint(artist2(), 1);

    let result = fixture.exchange.buy(&buyer1(), TokenId(1), PRICE);
    assert!(matches!(
        result,
        Err(MarketError::Unauthorized {
            required: Capability::Owner,
            ..
        })
    ));
    assert_eq!(fixture.registry.owner_of(TokenId(1)).unwrap(), artist2());
    assert_eq!(fixture.balance(buyer1()), STARTING_BALANCE);
    assert_eq!(fixture.balance(artist1()), STARTING_BALANCE);
    assert_eq!(fixture.balance(artist2()), STARTING_BALANCE);
    assert!(fixture.exchange.is_listed(TokenId(1)).unwrap());

    // The new owner clears the old listing and lists it themselves
    fixture.exchange.unlist(&artist2(), TokenId(1)).unwrap();
    assert_eq!(
        fixture.exchange_log.last_event(),
        Some(Event::Unlisted {
            token_id: TokenId(1),
            seller: artist1(),
        })
    );
    fixture.exchange.list(&artist2(), TokenId(1), PRICE).unwrap();

    let purchase = fixture.exchange.buy(&buyer1(), TokenId(1), PRICE).unwrap();
    assert_eq!(purchase.seller, artist2());
    assert_eq!(fixture.balance(artist2()), STARTING_BALANCE + PRICE);
    assert_eq!(fixture.balance(artist1()), STARTING_BALANCE);
}

#[test]
fn test_invalid_config_rejected() {
    let registry = Arc::new(OwnershipRegistry::new(admin()));
    let result = ExchangeEngine::new(
        registry,
        Arc::new(Balances::new()),
        ExchangeConfig::with_min_price(0),
    );
    assert!(matches!(result, Err(MarketError::Config(_))));
}

#[test]
fn test_concurrent_buyers_single_winner() {
    let fixture = Fixture::new();
    fixture.mint_and_list(artist1(), 1, PRICE);

    let buyers: Vec<Address> = (0..8u8).map(|n| Address::new([100 + n; 32])).collect();
    for buyer in &buyers {
        fixture.balances.deposit(*buyer, PRICE).unwrap();
    }

    let exchange = Arc::new(fixture.exchange);
    let handles: Vec<_> = buyers
        .iter()
        .map(|buyer| {
            let exchange = exchange.clone();
            let buyer = *buyer;
            thread::spawn(move || exchange.buy(&buyer, TokenId(1), PRICE).is_ok())
        })
        .collect();

    let winners: Vec<Address> = handles
        .into_iter()
        .zip(buyers.iter())
        .filter_map(|(handle, buyer)| handle.join().unwrap().then_some(*buyer))
        .collect();

    assert_eq!(winners.len(), 1);
    let winner = winners[0];
    assert_eq!(fixture.registry.owner_of(TokenId(1)).unwrap(), winner);
    assert_eq!(fixture.balances.balance_of(&winner).unwrap(), 0);
    assert_eq!(
        fixture.balances.balance_of(&artist1()).unwrap(),
        STARTING_BALANCE + PRICE
    );
    assert_eq!(exchange.listing_count().unwrap(), 0);
}

#[test]
fn test_full_sale_is_journaled() {
    let temp_dir = tempdir().unwrap();
    let fixture = Fixture::new();
    let registry_journal = Arc::new(
        FileEventJournal::open(&temp_dir.path().join("registry.journal")).unwrap(),
    );
    let exchange_journal = Arc::new(
        FileEventJournal::open(&temp_dir.path().join("exchange.journal")).unwrap(),
    );
    fixture.registry.subscribe(registry_journal.clone()).unwrap();
    fixture.exchange.subscribe(exchange_journal.clone()).unwrap();

    fixture.mint_and_list(artist1(), 1, PRICE);
    fixture.exchange.buy(&buyer1(), TokenId(1), PRICE).unwrap();

    let registry_events: Vec<Event> = registry_journal
        .records()
        .unwrap()
        .map(|r| r.unwrap().event)
        .collect();
    assert_eq!(
        registry_events,
        vec![
            Event::Minted {
                token_id: TokenId(1),
                uri: "URITest1".to_string(),
                owner: artist1(),
            },
            Event::OwnerUpdated {
                token_id: TokenId(1),
                previous_owner: artist1(),
                new_owner: buyer1(),
            },
        ]
    );

    let exchange_records: Vec<(u64, &str)> = exchange_journal
        .records()
        .unwrap()
        .map(|r| {
            let record = r.unwrap();
            (record.sequence, record.event.name())
        })
        .collect();
    assert_eq!(exchange_records, vec![(0, "listed"), (1, "bought")]);
    assert!(exchange_journal
        .records()
        .unwrap()
        .all(|r| r.unwrap().source == *fixture.exchange.address()));
}
