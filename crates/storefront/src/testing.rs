//! In-memory stores and a scripted payment processor.
//!
//! Available to this crate's tests and, with the `test-util` feature, to the
//! integration tests. [`MemoryStore`] keeps all tables behind one mutex so
//! each trait call is atomic, matching the transactional guarantees of the
//! `PostgreSQL` repositories.

#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use url::Url;

use rygstore_core::{
    AddressId, CartItems, Money, OrderId, PaymentMethod, ProductId, SurchargeRate, UserId,
};

use crate::config::{CheckoutConfig, PaymentConfig, StorefrontConfig};
use crate::db::{
    AddressBook, CartEdit, CartStore, OrderStore, PaymentSettlement, ProductCatalog,
    RepositoryError, UnpaidRemoval,
};
use crate::models::{
    Address, AddressSnapshot, NewAddress, NewOrder, Order, OrderFilter, OrderLine, Product,
};
use crate::payments::{
    CheckoutSession, CheckoutSessionRequest, CorrelationMetadata, PaymentError, PaymentProcessor,
};

/// Webhook secret used by [`test_config`].
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_4Kd9sQ2mX7vB";

#[derive(Default)]
struct Tables {
    carts: HashMap<UserId, CartItems>,
    orders: HashMap<OrderId, Order>,
    addresses: HashMap<AddressId, Address>,
    products: HashMap<ProductId, Product>,
}

/// Every store trait over in-process maps.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    settlements: AtomicUsize,
    fail_next_write: AtomicBool,
    unavailable: AtomicBool,
    corrupted: AtomicBool,
    fail_next_delete: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trait calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of orders flipped to paid.
    pub fn settlements(&self) -> usize {
        self.settlements.load(Ordering::SeqCst)
    }

    /// Make the next write fail without applying it.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Make the next unpaid-order delete fail without applying it.
    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }

    /// Make every call fail as if the pool timed out.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every call fail with a non-transient database error.
    pub fn set_corrupted(&self, corrupted: bool) {
        self.corrupted.store(corrupted, Ordering::SeqCst);
    }

    /// Seed a catalog product charging `offer_price`.
    pub fn insert_product(&self, name: &str, offer_price: i64) -> Product {
        let price = Money::new(offer_price).unwrap_or_default();
        let product = Product {
            id: ProductId::generate(),
            name: name.to_string(),
            description: String::new(),
            category: "Fruit".to_string(),
            price,
            offer_price: price,
            created_at: Utc::now(),
        };
        self.lock().products.insert(product.id, product.clone());
        product
    }

    /// Seed an address owned by `owner`.
    pub fn insert_address(&self, owner: &UserId) -> Address {
        let address = Address {
            id: AddressId::generate(),
            user_id: owner.clone(),
            full_name: "Asha Rao".to_string(),
            phone_number: "5550100".to_string(),
            pincode: "560001".to_string(),
            area: "MG Road".to_string(),
            city: "Bengaluru".to_string(),
            state: "KA".to_string(),
            created_at: Utc::now(),
        };
        self.lock().addresses.insert(address.id, address.clone());
        address
    }

    /// Every order in the store regardless of owner or state.
    pub fn all_orders(&self) -> Vec<Order> {
        self.lock().orders.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        if self.corrupted.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::Protocol(
                "corrupt row".to_string(),
            )));
        }
        Ok(self.lock())
    }

    fn write(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        let tables = self.read()?;
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(tables)
    }
}

impl Tables {
    fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        if let Some(key) = &order.idempotency_key
            && self.orders.values().any(|o| {
                o.user_id == order.user_id && o.idempotency_key.as_deref() == Some(key.as_str())
            })
        {
            return Err(RepositoryError::Conflict(
                "order with this idempotency key already exists".to_string(),
            ));
        }
        let created = order.clone().into_order(Utc::now());
        self.orders.insert(created.id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn get(&self, user: &UserId) -> Result<CartItems, RepositoryError> {
        Ok(self.read()?.carts.get(user).cloned().unwrap_or_default())
    }

    async fn set(&self, user: &UserId, items: &CartItems) -> Result<(), RepositoryError> {
        self.write()?.carts.insert(user.clone(), items.clone());
        Ok(())
    }

    async fn modify(&self, user: &UserId, edit: CartEdit<'_>) -> Result<CartItems, RepositoryError> {
        let mut tables = self.write()?;
        let cart = tables.carts.entry(user.clone()).or_default();
        edit(cart);
        Ok(cart.clone())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        self.write()?.insert_order(order)
    }

    async fn create_order_and_clear_cart(
        &self,
        order: &NewOrder,
    ) -> Result<Order, RepositoryError> {
        let mut tables = self.write()?;
        let created = tables.insert_order(order)?;
        tables.carts.insert(order.user_id.clone(), CartItems::new());
        Ok(created)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        user: &UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .read()?
            .orders
            .values()
            .find(|o| &o.user_id == user && o.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn attach_payment_session(
        &self,
        id: OrderId,
        session_id: &str,
        redirect_url: &str,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.write()?;
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.payment_session_id = Some(session_id.to_string());
        order.payment_redirect_url = Some(redirect_url.to_string());
        Ok(())
    }

    async fn settle_payment(&self, id: OrderId) -> Result<PaymentSettlement, RepositoryError> {
        let mut tables = self.write()?;
        let Some(order) = tables
            .orders
            .get_mut(&id)
            .filter(|o| o.payment_method == PaymentMethod::Card)
        else {
            return Ok(PaymentSettlement::NotFound);
        };
        if order.paid {
            return Ok(PaymentSettlement::AlreadyPaid);
        }
        order.paid = true;
        let owner = order.user_id.clone();
        tables.carts.insert(owner, CartItems::new());
        self.settlements.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentSettlement::Settled)
    }

    async fn delete_unpaid(&self, id: OrderId) -> Result<UnpaidRemoval, RepositoryError> {
        let mut tables = self.write()?;
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        match tables.orders.get(&id).map(|o| o.paid) {
            None => Ok(UnpaidRemoval::NotFound),
            Some(true) => Ok(UnpaidRemoval::AlreadyPaid),
            Some(false) => {
                tables.orders.remove(&id);
                Ok(UnpaidRemoval::Deleted)
            }
        }
    }

    async fn list_orders(
        &self,
        user: &UserId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .read()?
            .orders
            .values()
            .filter(|o| &o.user_id == user && filter.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

#[async_trait]
impl AddressBook for MemoryStore {
    async fn create_address(
        &self,
        owner: &UserId,
        address: &NewAddress,
    ) -> Result<Address, RepositoryError> {
        let created = Address {
            id: AddressId::generate(),
            user_id: owner.clone(),
            full_name: address.full_name.clone(),
            phone_number: address.phone_number.clone(),
            pincode: address.pincode.clone(),
            area: address.area.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            created_at: Utc::now(),
        };
        self.write()?.addresses.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_address(
        &self,
        id: AddressId,
        owner: &UserId,
    ) -> Result<Option<Address>, RepositoryError> {
        Ok(self
            .read()?
            .addresses
            .get(&id)
            .filter(|a| &a.user_id == owner)
            .cloned())
    }

    async fn list_addresses(&self, owner: &UserId) -> Result<Vec<Address>, RepositoryError> {
        let mut addresses: Vec<Address> = self
            .read()?
            .addresses
            .values()
            .filter(|a| &a.user_id == owner)
            .cloned()
            .collect();
        addresses.sort_by_key(|a| a.created_at);
        Ok(addresses)
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    None,
    Timeout,
    Rejected,
}

/// Payment processor that records requests and hands out fake sessions.
#[derive(Debug)]
pub struct FakeProcessor {
    requests: Mutex<Vec<CheckoutSessionRequest>>,
    sessions: Mutex<Vec<CheckoutSession>>,
    session_failure: Mutex<Failure>,
    lookup_failure: Mutex<Failure>,
    lookups: AtomicUsize,
}

impl Default for FakeProcessor {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            session_failure: Mutex::new(Failure::None),
            lookup_failure: Mutex::new(Failure::None),
            lookups: AtomicUsize::new(0),
        }
    }
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn failure_error(failure: Failure) -> Option<PaymentError> {
    match failure {
        Failure::None => None,
        Failure::Timeout => Some(PaymentError::Timeout),
        Failure::Rejected => Some(PaymentError::Rejected {
            status: 400,
            message: "invalid request".to_string(),
        }),
    }
}

impl FakeProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session creation requests received so far.
    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        guard(&self.requests).clone()
    }

    /// Number of session lookups made.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn fail_sessions_with_timeout(&self) {
        *guard(&self.session_failure) = Failure::Timeout;
    }

    pub fn reject_sessions(&self) {
        *guard(&self.session_failure) = Failure::Rejected;
    }

    pub fn fail_lookups_with_timeout(&self) {
        *guard(&self.lookup_failure) = Failure::Timeout;
    }

    /// Register a session for an order created outside checkout.
    pub fn open_session(&self, order_id: OrderId, user_id: &UserId) -> CheckoutSession {
        let metadata = CorrelationMetadata {
            order_id,
            user_id: user_id.clone(),
        };
        self.record_session(&metadata)
    }

    /// The most recent session for `order_id`.
    pub fn session_for(&self, order_id: OrderId) -> Option<CheckoutSession> {
        let key = order_id.to_string();
        guard(&self.sessions)
            .iter()
            .rev()
            .find(|s| s.metadata.get(crate::payments::ORDER_ID_KEY) == Some(&key))
            .cloned()
    }

    fn record_session(&self, metadata: &CorrelationMetadata) -> CheckoutSession {
        let mut sessions = guard(&self.sessions);
        let n = sessions.len() + 1;
        let session = CheckoutSession {
            id: format!("cs_test_{n}"),
            url: Some(format!("https://checkout.test/pay/cs_test_{n}")),
            payment_intent: Some(format!("pi_test_{n}")),
            metadata: metadata
                .to_pairs()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        sessions.push(session.clone());
        session
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        guard(&self.requests).push(request.clone());
        if let Some(err) = failure_error(*guard(&self.session_failure)) {
            return Err(err);
        }
        Ok(self.record_session(&request.metadata))
    }

    async fn list_sessions_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Vec<CheckoutSession>, PaymentError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = failure_error(*guard(&self.lookup_failure)) {
            return Err(err);
        }
        Ok(guard(&self.sessions)
            .iter()
            .filter(|s| s.payment_intent.as_deref() == Some(payment_intent))
            .cloned()
            .collect())
    }
}

/// A single-line unpaid order for `user`.
#[must_use]
pub fn new_order(user: &UserId, method: PaymentMethod) -> NewOrder {
    let unit_price = Money::new(10).unwrap_or_default();
    NewOrder {
        id: OrderId::generate(),
        user_id: user.clone(),
        address_id: AddressId::generate(),
        shipping_address: AddressSnapshot {
            full_name: "Asha Rao".to_string(),
            phone_number: "5550100".to_string(),
            pincode: "560001".to_string(),
            area: "MG Road".to_string(),
            city: "Bengaluru".to_string(),
            state: "KA".to_string(),
        },
        items: vec![OrderLine {
            product: ProductId::generate(),
            name: "Mango".to_string(),
            quantity: 2,
            unit_price,
        }],
        amount: Money::new(20).unwrap_or_default(),
        payment_method: method,
        idempotency_key: None,
    }
}

/// Raw payload of a payment-intent event.
#[must_use]
pub fn event_payload(event_id: &str, event_type: &str, payment_intent: &str) -> Vec<u8> {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": {"object": {"id": payment_intent, "object": "payment_intent"}}
    })
    .to_string()
    .into_bytes()
}

/// Configuration suitable for tests; no network or database is touched.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://localhost/rygstore_test"),
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: Url::parse("https://shop.test/").expect("valid test url"),
        payment: PaymentConfig {
            api_base: "https://payments.test".to_string(),
            secret_key: SecretString::from("sk_test_9xQ2"),
            webhook_secret: SecretString::from(TEST_WEBHOOK_SECRET),
            currency: "usd".to_string(),
            timeout: Duration::from_secs(10),
            webhook_tolerance: Duration::from_secs(300),
        },
        checkout: CheckoutConfig {
            surcharge_rate: SurchargeRate::default(),
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// In-memory collaborators wired into an [`crate::state::AppState`].
#[must_use]
pub fn memory_state() -> (crate::state::AppState, Arc<MemoryStore>, Arc<FakeProcessor>) {
    let store = Arc::new(MemoryStore::new());
    let processor = Arc::new(FakeProcessor::new());
    let state = crate::state::AppState::from_parts(
        test_config(),
        crate::state::Stores {
            carts: store.clone(),
            orders: store.clone(),
            addresses: store.clone(),
            products: store.clone(),
        },
        processor.clone(),
        None,
    );
    (state, store, processor)
}
