//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{
    AddressBook, AddressRepository, CartRepository, CartStore, OrderRepository, OrderStore,
    ProductCatalog, ProductRepository,
};
use crate::payments::{PaymentProcessor, WebhookVerifier};
use crate::services::{
    CartService, CheckoutService, OrderLedger, PaymentReconciler, RedirectUrls,
};

/// The storage seams every service is built on.
#[derive(Clone)]
pub struct Stores {
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub addresses: Arc<dyn AddressBook>,
    pub products: Arc<dyn ProductCatalog>,
}

impl Stores {
    /// `PostgreSQL`-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            carts: Arc::new(CartRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool.clone())),
            addresses: Arc::new(AddressRepository::new(pool.clone())),
            products: Arc::new(ProductRepository::new(pool.clone())),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the configuration and the services built from the injected stores.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    addresses: Arc<dyn AddressBook>,
    carts: CartService,
    ledger: OrderLedger,
    checkout: CheckoutService,
    reconciler: PaymentReconciler,
}

impl AppState {
    /// Create the production state over a `PostgreSQL` pool.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    /// * `processor` - Payment processor client
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let stores = Stores::postgres(&pool);
        Self::from_parts(config, stores, processor, Some(pool))
    }

    /// Wire services from explicit stores.
    ///
    /// `pool` is only used by the readiness check; without one the check
    /// reports ready.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        stores: Stores,
        processor: Arc<dyn PaymentProcessor>,
        pool: Option<PgPool>,
    ) -> Self {
        let ledger = OrderLedger::new(stores.orders);
        let checkout = CheckoutService::new(
            stores.products,
            stores.addresses.clone(),
            ledger.clone(),
            processor.clone(),
            config.checkout.surcharge_rate,
            config.payment.currency.clone(),
            RedirectUrls {
                success: config.payment_success_url(),
                cancel: config.payment_cancel_url(),
            },
        );
        let verifier = WebhookVerifier::new(
            config.payment.webhook_secret.clone(),
            config.payment.webhook_tolerance,
        );
        let reconciler = PaymentReconciler::new(verifier, processor, ledger.clone());

        Self {
            inner: Arc::new(AppStateInner {
                carts: CartService::new(stores.carts),
                addresses: stores.addresses,
                ledger,
                checkout,
                reconciler,
                pool,
                config,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get the database pool, if the state was built over one.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn addresses(&self) -> &dyn AddressBook {
        self.inner.addresses.as_ref()
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn ledger(&self) -> &OrderLedger {
        &self.inner.ledger
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn reconciler(&self) -> &PaymentReconciler {
        &self.inner.reconciler
    }
}
