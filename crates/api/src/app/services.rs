//! Infrastructure wiring (event store, bus, caches, projections, workers,
//! purchasing ports) and the command flows the routes call into.

use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::MySqlPool;
use thiserror::Error;

use commerce_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use commerce_infra::adapters::{CatalogAdapter, InventoryAdapter};
use commerce_infra::cache::{InMemoryProductCache, InMemoryStockCache, ProductCache, StockCache};
use commerce_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use commerce_infra::db;
use commerce_infra::event_bus::SharedBus;
use commerce_infra::event_store::{
    EventQuery, EventStore, EventStoreError, InMemoryEventStore, MySqlEventStore, StoredEvent,
};
use commerce_infra::projections::{
    CartsProjection, OrdersProjection, ProductCatalogProjection, Projection, ReplayError, ReviewsProjection,
    StockLevelsProjection, rebuild,
};
use commerce_infra::read_model::{InMemoryReadStore, MySqlReadStore, ReadStore};
use commerce_infra::workers::{ProjectionWorker, WorkerHandle};
use commerce_products::{
    AGGREGATE_TYPE as PRODUCT_TYPE, OptionCombination, Product, ProductCommand, ProductId,
};
use commerce_purchasing::{
    AddItemRequest, CART_AGGREGATE_TYPE, CART_EXPIRY_DAYS, Cart, CartCommand, CartErrorCode, CartId, CartItemId,
    CartPricing, ChangeItemQuantity, CustomerId, DeleteCart, FailPayment, InventoryChecker, InventoryManager, MergeCarts,
    ORDER_AGGREGATE_TYPE, Order, OrderCommand, OrderDraft, OrderId, OrderLineRequest, OrderStatus, PaymentId,
    RestoreCart, UseCaseError, prepare_add_item, prepare_checkout, prepare_order, price_cart, release_stock,
    review_availability, settle_payment,
};
use commerce_reviews::{AGGREGATE_TYPE as REVIEW_TYPE, Review, ReviewCommand, ReviewId};
use commerce_search::{InMemorySearchIndex, SearchIndex};
use commerce_stock::{AGGREGATE_TYPE as STOCK_TYPE, RegisterStock, Stock, StockCommand, StockId};

use crate::config::AppConfig;

#[cfg(feature = "redis")]
use commerce_infra::cache::{RedisCacheError, RedisProductCache, RedisStockCache};
#[cfg(feature = "redis")]
use commerce_infra::event_bus::{RedisBusError, RedisPubSubEventBus};

/// Pub/sub channel events are published on when Redis carries the bus.
#[cfg(feature = "redis")]
pub const EVENTS_CHANNEL: &str = "commerce.events";

pub type Store = Arc<dyn EventStore>;
pub type Dispatcher = CommandDispatcher<Store, SharedBus>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("failed to start worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error("read store {0} could not be opened")]
    ReadStore(String),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    RedisCache(#[from] RedisCacheError),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    RedisBus(#[from] RedisBusError),
}

/// Failure of a flow that mixes aggregate commands with the purchasing use cases.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    UseCase(#[from] UseCaseError),
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        CommandError::Dispatch(value.into())
    }
}

enum Backend {
    InMemory,
    MySql(MySqlPool),
}

impl Backend {
    fn store<K, V>(&self, collection: &str) -> Result<Arc<dyn ReadStore<K, V>>, ServiceError>
    where
        K: Eq + Hash + Display + Send + Sync + 'static,
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        match self {
            Backend::InMemory => Ok(Arc::new(InMemoryReadStore::<K, V>::new())),
            Backend::MySql(pool) => MySqlReadStore::<K, V>::new(pool.clone(), collection)
                .map(|s| Arc::new(s) as Arc<dyn ReadStore<K, V>>)
                .ok_or_else(|| ServiceError::ReadStore(collection.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredStock {
    pub sku: String,
    pub stock_id: StockId,
}

#[derive(Debug, Clone)]
pub struct ProductChange {
    pub events_committed: usize,
    pub stocks: Vec<RegisteredStock>,
}

#[derive(Debug, Clone)]
pub struct CartDetails {
    pub cart: Cart,
    pub pricing: CartPricing,
    pub expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    events: Arc<dyn EventQuery>,
    catalog: Arc<ProductCatalogProjection>,
    stock: Arc<StockLevelsProjection>,
    carts: Arc<CartsProjection>,
    orders: Arc<OrdersProjection>,
    reviews: Arc<ReviewsProjection>,
    search: Arc<dyn SearchIndex>,
    catalog_port: CatalogAdapter,
    inventory: InventoryAdapter<Store, SharedBus>,
    /// SKUs with a stock record, including ones the projection has not caught up with yet.
    stock_skus: Mutex<HashSet<String>>,
    workers: Mutex<Vec<WorkerHandle>>,
}

/// Wire everything, rebuild the read models from the event store, then
/// start the projection workers.
pub async fn build_services(config: &AppConfig) -> Result<Arc<AppServices>, ServiceError> {
    let (backend, store, events): (Backend, Store, Arc<dyn EventQuery>) = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, config.database_max_connections).await?;
            db::ensure_schema(&pool).await?;
            let mysql = Arc::new(MySqlEventStore::new(pool.clone())?);
            tracing::info!("using MySQL event store and read models");
            (Backend::MySql(pool), mysql.clone(), mysql)
        }
        None => {
            let memory = Arc::new(InMemoryEventStore::new());
            tracing::info!("using in-memory event store and read models");
            (Backend::InMemory, memory.clone(), memory)
        }
    };

    let ttl = Duration::from_secs(config.product_cache_ttl_secs);
    let (product_cache, stock_cache, bus) = caches_and_bus(config, ttl)?;

    let search: Arc<dyn SearchIndex> = Arc::new(InMemorySearchIndex::new());
    let catalog = Arc::new(
        ProductCatalogProjection::new(backend.store("products")?, backend.store("product_skus")?)
            .with_cache(product_cache)
            .with_search(search.clone()),
    );
    let stock = Arc::new(
        StockLevelsProjection::new(backend.store("stocks")?, backend.store("stock_skus")?)
            .with_cache(stock_cache.clone()),
    );
    let carts = Arc::new(CartsProjection::new(backend.store("carts")?));
    let orders = Arc::new(OrdersProjection::new(backend.store("orders")?));
    let reviews = Arc::new(ReviewsProjection::new(backend.store("reviews")?, backend.store("review_counts")?));

    let projections: [Arc<dyn Projection>; 5] = [
        catalog.clone(),
        stock.clone(),
        carts.clone(),
        orders.clone(),
        reviews.clone(),
    ];
    for projection in &projections {
        rebuild(&store, projection.as_ref())?;
    }
    let stock_skus = stock.list().into_iter().map(|view| view.sku).collect();
    let mut workers = Vec::with_capacity(projections.len());
    for projection in projections {
        workers.push(ProjectionWorker::spawn_projection(&bus, projection)?);
    }

    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));
    Ok(Arc::new(AppServices {
        catalog_port: CatalogAdapter::new(catalog.clone()),
        inventory: InventoryAdapter::new(stock.clone(), stock_cache, dispatcher.clone()),
        dispatcher,
        events,
        catalog,
        stock,
        carts,
        orders,
        reviews,
        search,
        stock_skus: Mutex::new(stock_skus),
        workers: Mutex::new(workers),
    }))
}

type HotPath = (Arc<dyn ProductCache>, Arc<dyn StockCache>, SharedBus);

fn in_memory_caches_and_bus(ttl: Duration) -> HotPath {
    (
        Arc::new(InMemoryProductCache::new(ttl)),
        Arc::new(InMemoryStockCache::new()),
        SharedBus::in_memory(),
    )
}

#[cfg(feature = "redis")]
fn caches_and_bus(config: &AppConfig, ttl: Duration) -> Result<HotPath, ServiceError> {
    let Some(url) = &config.redis_url else {
        return Ok(in_memory_caches_and_bus(ttl));
    };
    let product: Arc<dyn ProductCache> = Arc::new(RedisProductCache::new(url, ttl)?);
    let stock: Arc<dyn StockCache> = Arc::new(RedisStockCache::new(url)?);
    let bus = SharedBus::new(RedisPubSubEventBus::new(url, EVENTS_CHANNEL)?);
    tracing::info!(channel = EVENTS_CHANNEL, "using Redis caches and pub/sub");
    Ok((product, stock, bus))
}

#[cfg(not(feature = "redis"))]
fn caches_and_bus(config: &AppConfig, ttl: Duration) -> Result<HotPath, ServiceError> {
    if config.redis_url.is_some() {
        tracing::warn!("redis_url is set but the redis feature is disabled; using in-memory caches");
    }
    Ok(in_memory_caches_and_bus(ttl))
}

fn product_of(id: AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

fn stock_of(id: AggregateId) -> Stock {
    Stock::empty(StockId::new(id))
}

fn cart_of(id: AggregateId) -> Cart {
    Cart::empty(CartId::new(id))
}

fn order_of(id: AggregateId) -> Order {
    Order::empty(OrderId::new(id))
}

impl AppServices {
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: commerce_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatcher.dispatch(aggregate_id, aggregate_type, command, make_aggregate)
    }

    pub fn catalog(&self) -> &ProductCatalogProjection {
        &self.catalog
    }

    pub fn stock_levels(&self) -> &StockLevelsProjection {
        &self.stock
    }

    pub fn carts(&self) -> &CartsProjection {
        &self.carts
    }

    pub fn orders(&self) -> &OrdersProjection {
        &self.orders
    }

    pub fn reviews(&self) -> &ReviewsProjection {
        &self.reviews
    }

    pub fn search(&self) -> &dyn SearchIndex {
        self.search.as_ref()
    }

    pub fn events(&self) -> &dyn EventQuery {
        self.events.as_ref()
    }

    /// Stop the projection workers.
    pub fn shutdown(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            tracing::debug!(worker = worker.name(), "stopping worker");
            worker.shutdown();
        }
    }

    // products

    /// `initial_stock` pairs an option combination with the quantity to
    /// register for the variant created from it; zero means no stock record.
    /// A failed stock registration fails the request after the product
    /// events are committed.
    pub fn product_command(
        &self,
        product_id: ProductId,
        command: ProductCommand,
        initial_stock: &[(OptionCombination, i64)],
    ) -> Result<ProductChange, DispatchError> {
        if let Some((_, quantity)) = initial_stock.iter().find(|(_, q)| *q < 0) {
            return Err(DomainError::validation(format!("stock_quantity cannot be negative: {quantity}")).into());
        }
        let committed = self.dispatch(product_id.0, PRODUCT_TYPE, command, product_of)?;
        let stocks = if initial_stock.iter().any(|(_, q)| *q > 0) {
            let product = self.dispatcher.load(product_id.0, product_of)?;
            self.register_variant_stock(&product, initial_stock)?
        } else {
            Vec::new()
        };
        Ok(ProductChange { events_committed: committed.len(), stocks })
    }

    fn register_variant_stock(
        &self,
        product: &Product,
        wanted: &[(OptionCombination, i64)],
    ) -> Result<Vec<RegisteredStock>, DispatchError> {
        let mut registered = Vec::new();
        for (options, quantity) in wanted.iter().filter(|(_, q)| *q > 0) {
            let Some(variant) = product.variants().iter().find(|v| &v.options == options) else {
                continue;
            };
            let (stock_id, _) = self.register_stock(&variant.sku, *quantity).inspect_err(|err| {
                tracing::warn!(sku = %variant.sku, error = %err, "failed to register variant stock");
            })?;
            registered.push(RegisteredStock { sku: variant.sku.clone(), stock_id });
        }
        Ok(registered)
    }

    // stock

    /// One stock record per SKU; a second registration is a conflict.
    pub fn register_stock(&self, sku: &str, quantity: i64) -> Result<(StockId, usize), DispatchError> {
        let sku = sku.trim();
        let mut claimed = match self.stock_skus.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if claimed.contains(sku) || self.stock.stock_id_for(sku).is_some() {
            return Err(DomainError::conflict(format!("stock already registered for sku {sku}")).into());
        }

        let stock_id = StockId::new(AggregateId::new());
        let committed = self.stock_command(
            stock_id,
            StockCommand::Register(RegisterStock {
                stock_id,
                sku: sku.to_string(),
                quantity,
                occurred_at: Utc::now(),
            }),
        )?;
        claimed.insert(sku.to_string());
        Ok((stock_id, committed))
    }

    pub fn stock_command(&self, stock_id: StockId, command: StockCommand) -> Result<usize, DispatchError> {
        Ok(self.dispatch(stock_id.0, STOCK_TYPE, command, stock_of)?.len())
    }

    /// Cache first, then the read model.
    pub fn stock_quantity(&self, stock_id: StockId) -> Option<i64> {
        self.stock.available(stock_id)
    }

    // carts

    pub fn cart_command(&self, cart_id: CartId, command: CartCommand) -> Result<usize, DispatchError> {
        Ok(self.dispatch(cart_id.0, CART_AGGREGATE_TYPE, command, cart_of)?.len())
    }

    fn load_cart(&self, cart_id: CartId) -> Result<Cart, DispatchError> {
        let cart = self.dispatcher.load(cart_id.0, cart_of)?;
        if !cart.exists() {
            return Err(DispatchError::NotFound);
        }
        Ok(cart)
    }

    /// Current cart with availability re-checked against catalog and stock.
    pub fn cart_details(&self, cart_id: CartId) -> Result<CartDetails, CommandError> {
        let mut cart = self.load_cart(cart_id)?;

        let marks = review_availability(&cart, Utc::now(), &self.catalog_port, &self.inventory)?;
        if !marks.is_empty() {
            for command in marks {
                if let Err(err) = self.cart_command(cart_id, command) {
                    tracing::warn!(cart_id = %cart_id, error = %err, "failed to update item availability");
                }
            }
            cart = self.load_cart(cart_id)?;
        }

        let pricing = price_cart(&cart, &self.catalog_port)?;
        let now = Utc::now();
        Ok(CartDetails {
            expired: cart.is_expired(now),
            expires_at: cart.last_modified_at().map(|at| at + chrono::Duration::days(CART_EXPIRY_DAYS)),
            pricing,
            cart,
        })
    }

    pub fn add_cart_item(&self, cart_id: CartId, request: &AddItemRequest) -> Result<(CartItemId, usize), CommandError> {
        let cart = self.load_cart(cart_id)?;
        let item_id = CartItemId::new(AggregateId::new());
        let command = prepare_add_item(&cart, request, item_id, Utc::now(), &self.catalog_port, &self.inventory)?;
        Ok((item_id, self.cart_command(cart_id, command)?))
    }

    /// Raising a quantity is checked against stock; lowering never is.
    pub fn change_item_quantity(&self, cart_id: CartId, item_id: CartItemId, quantity: u32) -> Result<usize, CommandError> {
        let cart = self.load_cart(cart_id)?;
        if let Some(item) = cart.item(item_id).filter(|i| quantity > i.quantity) {
            let on_hand = self
                .inventory
                .available(&item.sku)
                .map_err(UseCaseError::from)?
                .unwrap_or(0);
            if i64::from(quantity) > on_hand {
                return Err(CartErrorCode::InsufficientStock.with_detail(&item.sku).into());
            }
        }
        let command = CartCommand::ChangeItemQuantity(ChangeItemQuantity {
            cart_id,
            item_id,
            quantity,
            occurred_at: Utc::now(),
        });
        Ok(self.cart_command(cart_id, command)?)
    }

    /// Move the source cart's items into `cart_id`; the source is deleted
    /// afterwards unless it changed since it was read.
    pub fn merge_carts(&self, cart_id: CartId, source_cart_id: CartId) -> Result<usize, DispatchError> {
        let source = self.load_cart(source_cart_id)?;
        let source_version = ExpectedVersion::Exact(source.version());
        let committed = self.cart_command(
            cart_id,
            CartCommand::Merge(MergeCarts {
                cart_id,
                source_cart_id,
                source_items: source.items().to_vec(),
                source_converted: source.is_converted(),
                occurred_at: Utc::now(),
            }),
        )?;

        let delete = CartCommand::Delete(DeleteCart { cart_id: source_cart_id, occurred_at: Utc::now() });
        if let Err(err) =
            self.dispatcher.dispatch_at(source_cart_id.0, CART_AGGREGATE_TYPE, delete, source_version, cart_of)
        {
            tracing::warn!(cart_id = %source_cart_id, error = %err, "merged cart was not deleted");
        }
        Ok(committed)
    }

    /// Create an order from the cart and mark the cart converted.
    pub fn checkout(
        &self,
        cart_id: CartId,
        customer_id: CustomerId,
        message: Option<String>,
        channel: Option<String>,
    ) -> Result<OrderId, CommandError> {
        let cart = self.load_cart(cart_id)?;
        let order_id = OrderId::new(AggregateId::new());
        let draft = OrderDraft { order_id, customer_id, message, channel, occurred_at: Utc::now() };
        let checkout = prepare_checkout(&cart, &draft, &self.catalog_port, &self.inventory)?;

        self.order_command(order_id, checkout.create_order)?;
        if let Err(err) = self.cart_command(cart_id, checkout.convert_cart) {
            tracing::error!(cart_id = %cart_id, order_id = %order_id, error = %err, "cart conversion failed");
            let abandon = OrderCommand::FailPayment(FailPayment {
                order_id,
                reason: "cart conversion failed".to_string(),
                occurred_at: Utc::now(),
            });
            if let Err(e) = self.order_command(order_id, abandon) {
                tracing::error!(order_id = %order_id, error = %e, "failed to abandon order");
            }
            return Err(err.into());
        }
        Ok(order_id)
    }

    // orders

    pub fn order_command(&self, order_id: OrderId, command: OrderCommand) -> Result<usize, DispatchError> {
        Ok(self.dispatch(order_id.0, ORDER_AGGREGATE_TYPE, command, order_of)?.len())
    }

    fn load_order(&self, order_id: OrderId) -> Result<Order, DispatchError> {
        let order = self.dispatcher.load(order_id.0, order_of)?;
        if !order.is_created() {
            return Err(DispatchError::NotFound);
        }
        Ok(order)
    }

    pub fn create_order(&self, draft: &OrderDraft, lines: &[OrderLineRequest]) -> Result<usize, CommandError> {
        let command = prepare_order(draft, lines, &self.catalog_port, &self.inventory)?;
        Ok(self.order_command(draft.order_id, command)?)
    }

    /// Take stock for every line, then confirm; a short line marks the order out of stock.
    pub fn confirm_payment(&self, order_id: OrderId, payment_id: PaymentId) -> Result<(usize, OrderStatus), CommandError> {
        let order = self.load_order(order_id)?;
        let command = settle_payment(&order, payment_id, Utc::now(), &self.inventory)?;
        let status = match command {
            OrderCommand::ConfirmPayment(_) => OrderStatus::Paid,
            _ => OrderStatus::OutOfStock,
        };

        match self.order_command(order_id, command) {
            Ok(committed) => Ok((committed, status)),
            Err(err) => {
                if status == OrderStatus::Paid {
                    for item in order.items() {
                        if let Err(e) = self.inventory.restore(&item.sku, item.quantity) {
                            tracing::warn!(sku = %item.sku, error = %e, "failed to restore stock");
                        }
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Fail the payment and give the source cart back to the shopper.
    pub fn fail_payment(&self, order_id: OrderId, reason: String) -> Result<usize, DispatchError> {
        let committed = self.order_command(
            order_id,
            OrderCommand::FailPayment(FailPayment { order_id, reason, occurred_at: Utc::now() }),
        )?;
        if let Some(cart_id) = self.load_order(order_id)?.source_cart_id() {
            let restore = CartCommand::Restore(RestoreCart { cart_id, occurred_at: Utc::now() });
            if let Err(err) = self.cart_command(cart_id, restore) {
                tracing::warn!(cart_id = %cart_id, error = %err, "failed to restore cart");
            }
        }
        Ok(committed)
    }

    /// Cancel, returning stock when the order held it. Returns the units restored.
    pub fn cancel_order(&self, order_id: OrderId, command: OrderCommand) -> Result<(usize, u64), CommandError> {
        let before = self.load_order(order_id)?;
        let committed = self.order_command(order_id, command)?;
        let restored = match release_stock(&before, &self.inventory) {
            Ok(units) => units,
            Err(err) => {
                tracing::error!(order_id = %order_id, error = %err, "canceled order did not release its stock");
                0
            }
        };
        Ok((committed, restored))
    }

    // reviews

    pub fn review_command(&self, review_id: ReviewId, command: ReviewCommand) -> Result<usize, DispatchError> {
        Ok(self
            .dispatch(review_id.0, REVIEW_TYPE, command, |id| Review::empty(ReviewId::new(id)))?
            .len())
    }
}

impl Drop for AppServices {
    fn drop(&mut self) {
        self.shutdown();
    }
}
