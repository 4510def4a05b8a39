//! Stock domain (event-sourced).
//!
//! One `Stock` aggregate tracks the on-hand quantity of one SKU.

pub mod stock;

pub use stock::{
    DecreaseStock, IncreaseStock, MarkStockEmpty, RegisterStock, Stock, StockCommand,
    StockDecreased, StockEmptied, StockEvent, StockId, StockIncreased, StockRegistered,
    StockStatus,
};

pub const AGGREGATE_TYPE: &str = "stock.stock";
