//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::OmsConfig;
use crate::db::Store;
use crate::middleware::auth::TokenVerifier;
use crate::services::{InventoryService, Notifier, OrderService, PaymentService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// store, the services built on it and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: OmsConfig,
    store: Arc<dyn Store>,
    tokens: TokenVerifier,
    orders: OrderService,
    payments: PaymentService,
    inventory: InventoryService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `store` - Persistent store (`PgStore` in production, `MemoryStore` in tests)
    /// * `notifier` - Receiver of order events
    #[must_use]
    pub fn new(config: OmsConfig, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        let tokens = TokenVerifier::new(&config.jwt_secret);
        let orders = OrderService::new(Arc::clone(&store), Arc::clone(&notifier));
        let payments = PaymentService::new(
            Arc::clone(&store),
            notifier,
            config.ecpay.clone(),
            config.frontend_url.clone(),
        );
        let inventory = InventoryService::new(Arc::clone(&store));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                tokens,
                orders,
                payments,
                inventory,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &OmsConfig {
        &self.inner.config
    }

    /// Get a reference to the persistent store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Bearer token verification.
    #[must_use]
    pub fn tokens(&self) -> &TokenVerifier {
        &self.inner.tokens
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn payments(&self) -> &PaymentService {
        &self.inner.payments
    }

    #[must_use]
    pub fn inventory(&self) -> &InventoryService {
        &self.inner.inventory
    }
}
