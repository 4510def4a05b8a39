//! Product catalog domain (event-sourced).
//!
//! A product belongs to one seller and owns its variants; each variant is an
//! option combination (e.g. `color=red, size=M`) addressed by a generated SKU.
//! Pure domain logic only: no IO, no HTTP, no storage.

pub mod product;
pub mod variant;

pub use product::{
    ActivateProduct, AddVariants, ChangeProductCategory, ChangeProductPrice, ChangeVariantStatus,
    CreateProduct, DeleteProduct, InactivateProduct, Product, ProductActivated,
    ProductCategoryChanged, ProductCommand, ProductCreated, ProductDeleted, ProductEvent,
    ProductId, ProductInactivated, ProductInfoUpdated, ProductPriceChanged, ProductStatus,
    RemoveVariant, SellerId, UpdateProductInfo, UpdateVariant, VariantRemoved,
    VariantStatusChanged, VariantUpdated, VariantsAdded,
};
pub use variant::{OptionCombination, ProductVariant, VariantSpec, VariantStatus, generate_sku};

/// Aggregate type name used for product event streams.
pub const AGGREGATE_TYPE: &str = "products.product";
