//! Purchasing domain: carts and orders (event-sourced), plus the
//! ports-and-adapters layer that checks them against catalog and stock.
//!
//! Pure logic only. Adapters for the ports live in `commerce-infra`.

pub mod application;
pub mod cart;
pub mod common;
pub mod order;
pub mod ports;

pub use application::{
    AddItemRequest, CartPricing, Checkout, OrderDraft, OrderLineRequest, PricedLine, UseCaseError,
    prepare_add_item, prepare_checkout, prepare_order, price_cart, release_stock,
    review_availability, settle_payment,
};
pub use cart::{
    AddItem, CART_EXPIRY_DAYS, Cart, CartCleared, CartCommand, CartConverted, CartCreated,
    CartDeleted, CartErrorCode, CartEvent, CartId, CartItem, CartItemAdded, CartItemId,
    CartItemMarkedAvailable, CartItemMarkedUnavailable, CartItemQuantityChanged, CartItemRemoved,
    CartRestored, CartsMerged, ChangeItemQuantity, ClearCart, ConvertCart, CreateCart, DeleteCart,
    MAX_ITEM_QUANTITY, MAX_ITEM_TYPES, MIN_ITEM_QUANTITY, MarkItemAvailable, MarkItemUnavailable,
    MergeCarts, MergedQuantity, RemoveItem, RestoreCart,
};
pub use common::{CustomerId, ProductOptions};
pub use order::{
    CancelOrder, CompleteRefund, ConfirmPayment, ConfirmPurchase, CreateOrder, FailPayment,
    MarkOutOfStock, NewOrderItem, Order, OrderCanceled, OrderCommand, OrderCreated, OrderEvent,
    OrderId, OrderItem, OrderMarkedOutOfStock, OrderRefunded, OrderStatus, PaymentConfirmed,
    PaymentFailed, PaymentId, PurchaseConfirmed, REFUND_WINDOW_DAYS, RefundRequested, RequestRefund,
};
pub use ports::{
    CatalogProduct, CatalogVariant, InventoryChecker, InventoryManager, PortError, ProductCatalog,
};

/// Aggregate type names used for event streams.
pub const CART_AGGREGATE_TYPE: &str = "purchasing.cart";
pub const ORDER_AGGREGATE_TYPE: &str = "purchasing.order";
