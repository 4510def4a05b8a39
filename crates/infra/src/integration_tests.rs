//! Full pipeline: command → event store → bus → worker → projection → read
//! model, plus the purchasing ports running on top of it.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chrono::Utc;

    use commerce_core::{AggregateId, Money};
    use commerce_products::{
        AGGREGATE_TYPE as PRODUCT_TYPE, CreateProduct, Product, ProductCommand, ProductId, SellerId,
    };
    use commerce_purchasing::{
        AddItemRequest, CART_AGGREGATE_TYPE, Cart, CartCommand, CartId, CartItemId, CreateCart, CustomerId,
        ORDER_AGGREGATE_TYPE, Order, OrderCommand, OrderDraft, OrderId, OrderStatus, PaymentId, ProductOptions,
        prepare_add_item, prepare_checkout, settle_payment,
    };
    use commerce_search::{InMemorySearchIndex, ProductDocument, SearchIndex, SearchOptions};
    use commerce_stock::{AGGREGATE_TYPE as STOCK_TYPE, DecreaseStock, RegisterStock, Stock, StockCommand, StockId};

    use crate::adapters::{CatalogAdapter, InventoryAdapter};
    use crate::cache::{InMemoryProductCache, InMemoryStockCache, StockCache};
    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_bus::SharedBus;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::projections::{
        CartView, CartsProjection, OrderView, OrdersProjection, ProductCatalogProjection, StockLevelsProjection,
        StockView, rebuild,
    };
    use crate::read_model::InMemoryReadStore;
    use crate::workers::{ProjectionWorker, WorkerHandle};

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, SharedBus>;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        catalog: Arc<ProductCatalogProjection>,
        stock: Arc<StockLevelsProjection>,
        carts: Arc<CartsProjection>,
        orders: Arc<OrdersProjection>,
        search: Arc<InMemorySearchIndex>,
        stock_cache: Arc<InMemoryStockCache>,
        workers: Vec<WorkerHandle>,
    }

    impl Harness {
        fn new() -> Self {
            let bus = SharedBus::in_memory();
            let store = Arc::new(InMemoryEventStore::new());
            let dispatcher = Arc::new(CommandDispatcher::new(store, bus.clone()));

            let search = Arc::new(InMemorySearchIndex::new());
            let stock_cache = Arc::new(InMemoryStockCache::new());
            let catalog = Arc::new(
                ProductCatalogProjection::new(
                    Arc::new(InMemoryReadStore::<ProductId, ProductDocument>::new()),
                    Arc::new(InMemoryReadStore::<String, ProductId>::new()),
                )
                .with_cache(Arc::new(InMemoryProductCache::default()))
                .with_search(search.clone()),
            );
            let stock = Arc::new(
                StockLevelsProjection::new(
                    Arc::new(InMemoryReadStore::<StockId, StockView>::new()),
                    Arc::new(InMemoryReadStore::<String, StockId>::new()),
                )
                .with_cache(stock_cache.clone()),
            );
            let carts = Arc::new(CartsProjection::new(Arc::new(InMemoryReadStore::<CartId, CartView>::new())));
            let orders = Arc::new(OrdersProjection::new(Arc::new(InMemoryReadStore::<OrderId, OrderView>::new())));

            let workers = vec![
                ProjectionWorker::spawn_projection(&bus, catalog.clone()).unwrap(),
                ProjectionWorker::spawn_projection(&bus, stock.clone()).unwrap(),
                ProjectionWorker::spawn_projection(&bus, carts.clone()).unwrap(),
                ProjectionWorker::spawn_projection(&bus, orders.clone()).unwrap(),
            ];

            Self { dispatcher, catalog, stock, carts, orders, search, stock_cache, workers }
        }

        fn inventory(&self) -> InventoryAdapter<Arc<InMemoryEventStore>, SharedBus> {
            InventoryAdapter::new(self.stock.clone(), self.stock_cache.clone(), self.dispatcher.clone())
        }

        fn create_product(&self, name: &str, price: i64) -> ProductId {
            let product_id = ProductId::new(AggregateId::new());
            self.dispatcher
                .dispatch(
                    product_id.0,
                    PRODUCT_TYPE,
                    ProductCommand::Create(CreateProduct {
                        product_id,
                        seller_id: SellerId::new("seller-1"),
                        name: name.to_string(),
                        brand: "Acme".to_string(),
                        description: String::new(),
                        category_id: "shoes".to_string(),
                        base_price: Money::krw(price),
                        variants: vec![],
                        occurred_at: Utc::now(),
                    }),
                    |id| Product::empty(ProductId::new(id)),
                )
                .unwrap();
            product_id
        }

        fn register_stock(&self, sku: &str, quantity: i64) -> StockId {
            let stock_id = StockId::new(AggregateId::new());
            self.dispatcher
                .dispatch(
                    stock_id.0,
                    STOCK_TYPE,
                    StockCommand::Register(RegisterStock {
                        stock_id,
                        sku: sku.to_string(),
                        quantity,
                        occurred_at: Utc::now(),
                    }),
                    |id| Stock::empty(StockId::new(id)),
                )
                .unwrap();
            stock_id
        }

        fn shutdown(self) {
            for w in self.workers {
                w.shutdown();
            }
        }
    }

    /// Read models are eventually consistent; poll until `f` holds.
    fn eventually<T>(mut f: impl FnMut() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            if let Some(v) = f() {
                return v;
            }
            assert!(Instant::now() < deadline, "read model did not converge");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn created_product_reaches_catalog_and_search() {
        let h = Harness::new();
        let product_id = h.create_product("Trail Runner", 59_000);

        let doc = eventually(|| h.catalog.get(product_id));
        assert_eq!(doc.variants.len(), 1);
        assert_eq!(doc.variants[0].sku, product_id.to_string());

        let page = h
            .search
            .search(&SearchOptions { keyword: Some("trail".to_string()), ..SearchOptions::default() })
            .unwrap();
        assert_eq!(page.items.len(), 1);
        h.shutdown();
    }

    #[test]
    fn rejected_stock_command_leaves_read_model_untouched() {
        let h = Harness::new();
        let stock_id = h.register_stock("SKU-1", 2);
        eventually(|| h.stock.get(stock_id));

        let err = h
            .dispatcher
            .dispatch(
                stock_id.0,
                STOCK_TYPE,
                StockCommand::Decrease(DecreaseStock { stock_id, quantity: 3, occurred_at: Utc::now() }),
                |id| Stock::empty(StockId::new(id)),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(h.stock.get(stock_id).unwrap().quantity, 2);
        assert_eq!(h.dispatcher.store().load_stream(stock_id.0).unwrap().len(), 1);
        h.shutdown();
    }

    #[test]
    fn checkout_and_payment_take_stock() {
        let h = Harness::new();
        let product_id = h.create_product("Runner", 10_000);
        let sku = product_id.to_string();
        let stock_id = h.register_stock(&sku, 3);
        eventually(|| h.catalog.get(product_id));
        eventually(|| h.stock.get(stock_id));

        let catalog = CatalogAdapter::new(h.catalog.clone());
        let inventory = h.inventory();
        let customer = CustomerId::new("customer-1").unwrap();

        // Cart with two units.
        let cart_id = CartId::new(AggregateId::new());
        h.dispatcher
            .dispatch(
                cart_id.0,
                CART_AGGREGATE_TYPE,
                CartCommand::Create(CreateCart { cart_id, customer_id: customer.clone(), occurred_at: Utc::now() }),
                |id| Cart::empty(CartId::new(id)),
            )
            .unwrap();
        let cart: Cart = h.dispatcher.load(cart_id.0, |id| Cart::empty(CartId::new(id))).unwrap();
        let add = prepare_add_item(
            &cart,
            &AddItemRequest { product_id, options: ProductOptions::empty(), quantity: 2 },
            CartItemId::new(AggregateId::new()),
            Utc::now(),
            &catalog,
            &inventory,
        )
        .unwrap();
        h.dispatcher.dispatch(cart_id.0, CART_AGGREGATE_TYPE, add, |id| Cart::empty(CartId::new(id))).unwrap();

        // Checkout.
        let cart: Cart = h.dispatcher.load(cart_id.0, |id| Cart::empty(CartId::new(id))).unwrap();
        let order_id = OrderId::new(AggregateId::new());
        let draft = OrderDraft {
            order_id,
            customer_id: customer.clone(),
            message: None,
            channel: None,
            occurred_at: Utc::now(),
        };
        let checkout = prepare_checkout(&cart, &draft, &catalog, &inventory).unwrap();
        h.dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE_TYPE, checkout.create_order, |id| Order::empty(OrderId::new(id)))
            .unwrap();
        h.dispatcher
            .dispatch(cart_id.0, CART_AGGREGATE_TYPE, checkout.convert_cart, |id| Cart::empty(CartId::new(id)))
            .unwrap();

        // Payment.
        let order: Order = h.dispatcher.load(order_id.0, |id| Order::empty(OrderId::new(id))).unwrap();
        let command = settle_payment(&order, PaymentId::new("pay-1").unwrap(), Utc::now(), &inventory).unwrap();
        assert!(matches!(command, OrderCommand::ConfirmPayment(_)));
        h.dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE_TYPE, command, |id| Order::empty(OrderId::new(id)))
            .unwrap();

        let view = eventually(|| h.orders.get(order_id).filter(|o| o.status == OrderStatus::Paid));
        assert_eq!(view.total, Money::krw(20_000));
        assert_eq!(h.orders.by_customer(&customer).len(), 1);
        eventually(|| h.carts.get(cart_id).filter(|c| c.converted));
        eventually(|| h.stock.get(stock_id).filter(|s| s.quantity == 1));
        assert_eq!(h.stock_cache.get(&stock_id), Some(1));
        h.shutdown();
    }

    #[test]
    fn payment_for_more_than_stock_marks_order_out_of_stock() {
        let h = Harness::new();
        let product_id = h.create_product("Runner", 10_000);
        let stock_id = h.register_stock(&product_id.to_string(), 1);
        eventually(|| h.catalog.get(product_id));
        eventually(|| h.stock.get(stock_id));

        let catalog = CatalogAdapter::new(h.catalog.clone());
        let inventory = h.inventory();
        let order_id = OrderId::new(AggregateId::new());
        let create = commerce_purchasing::prepare_order(
            &OrderDraft {
                order_id,
                customer_id: CustomerId::new("customer-2").unwrap(),
                message: None,
                channel: None,
                occurred_at: Utc::now(),
            },
            &[commerce_purchasing::OrderLineRequest { product_id, options: ProductOptions::empty(), quantity: 1 }],
            &catalog,
            &inventory,
        )
        .unwrap();
        h.dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE_TYPE, create, |id| Order::empty(OrderId::new(id)))
            .unwrap();

        // Someone else takes the last unit first.
        inventory_take(&h, stock_id, 1);

        let order: Order = h.dispatcher.load(order_id.0, |id| Order::empty(OrderId::new(id))).unwrap();
        let command = settle_payment(&order, PaymentId::new("pay-2").unwrap(), Utc::now(), &inventory).unwrap();
        assert!(matches!(command, OrderCommand::MarkOutOfStock(_)));
        h.shutdown();
    }

    fn inventory_take(h: &Harness, stock_id: StockId, quantity: i64) {
        h.dispatcher
            .dispatch(
                stock_id.0,
                STOCK_TYPE,
                StockCommand::Decrease(DecreaseStock { stock_id, quantity, occurred_at: Utc::now() }),
                |id| Stock::empty(StockId::new(id)),
            )
            .unwrap();
        eventually(|| h.stock.get(stock_id).filter(|s| s.quantity == 0));
    }

    #[test]
    fn projections_rebuild_from_the_store() {
        let h = Harness::new();
        let product_id = h.create_product("Runner", 10_000);
        eventually(|| h.catalog.get(product_id));

        let fresh = ProductCatalogProjection::new(
            Arc::new(InMemoryReadStore::<ProductId, ProductDocument>::new()),
            Arc::new(InMemoryReadStore::<String, ProductId>::new()),
        );
        let report = rebuild(h.dispatcher.store(), &fresh).unwrap();
        assert_eq!(report.events, 1);
        assert_eq!(fresh.get(product_id).unwrap().name, "Runner");
        h.shutdown();
    }
}
