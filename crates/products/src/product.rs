use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use commerce_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use commerce_events::Event;

use crate::variant::{OptionCombination, ProductVariant, VariantSpec, VariantStatus, generate_sku};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Identity of the seller that owns a product (issued by an external account system).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SellerId(String);

impl SellerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SellerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Active,
    Inactive,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    seller_id: SellerId,
    name: String,
    brand: String,
    description: String,
    category_id: String,
    base_price: Money,
    status: ProductStatus,
    variants: Vec<ProductVariant>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Product {
    /// Not-yet-created instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            seller_id: SellerId::default(),
            name: String::new(),
            brand: String::new(),
            description: String::new(),
            category_id: String::new(),
            base_price: Money::krw(0),
            status: ProductStatus::Inactive,
            variants: Vec::new(),
            is_deleted: false,
            deleted_at: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn seller_id(&self) -> &SellerId {
        &self.seller_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    pub fn base_price(&self) -> &Money {
        &self.base_price
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn variants(&self) -> &[ProductVariant] {
        &self.variants
    }

    pub fn variant(&self, sku: &str) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.sku == sku)
    }

    fn variant_mut(&mut self, sku: &str) -> Option<&mut ProductVariant> {
        self.variants.iter_mut().find(|v| v.sku == sku)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub category_id: String,
    pub base_price: Money,
    pub variants: Vec<VariantSpec>,
    pub occurred_at: DateTime<Utc>,
}

/// Absent fields stay unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductInfo {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProductCategory {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub category_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProductPrice {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateProduct {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivateProduct {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProduct {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVariants {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub variants: Vec<VariantSpec>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateVariant {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub sku: String,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeVariantStatus {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub sku: String,
    pub status: VariantStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveVariant {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub sku: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    Create(CreateProduct),
    UpdateInfo(UpdateProductInfo),
    ChangeCategory(ChangeProductCategory),
    ChangePrice(ChangeProductPrice),
    Activate(ActivateProduct),
    Inactivate(InactivateProduct),
    Delete(DeleteProduct),
    AddVariants(AddVariants),
    UpdateVariant(UpdateVariant),
    ChangeVariantStatus(ChangeVariantStatus),
    RemoveVariant(RemoveVariant),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub category_id: String,
    pub base_price: Money,
    pub variants: Vec<ProductVariant>,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the resulting values of all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfoUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategoryChanged {
    pub product_id: ProductId,
    pub category_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPriceChanged {
    pub product_id: ProductId,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivated {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Every variant becomes inactive with the product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInactivated {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Soft delete; every variant is discontinued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantsAdded {
    pub product_id: ProductId,
    pub variants: Vec<ProductVariant>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantUpdated {
    pub product_id: ProductId,
    pub sku: String,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantStatusChanged {
    pub product_id: ProductId,
    pub sku: String,
    pub status: VariantStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRemoved {
    pub product_id: ProductId,
    pub sku: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductInfoUpdated(ProductInfoUpdated),
    ProductCategoryChanged(ProductCategoryChanged),
    ProductPriceChanged(ProductPriceChanged),
    ProductActivated(ProductActivated),
    ProductInactivated(ProductInactivated),
    ProductDeleted(ProductDeleted),
    VariantsAdded(VariantsAdded),
    VariantUpdated(VariantUpdated),
    VariantStatusChanged(VariantStatusChanged),
    VariantRemoved(VariantRemoved),
}

impl ProductEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductInfoUpdated(e) => e.product_id,
            ProductEvent::ProductCategoryChanged(e) => e.product_id,
            ProductEvent::ProductPriceChanged(e) => e.product_id,
            ProductEvent::ProductActivated(e) => e.product_id,
            ProductEvent::ProductInactivated(e) => e.product_id,
            ProductEvent::ProductDeleted(e) => e.product_id,
            ProductEvent::VariantsAdded(e) => e.product_id,
            ProductEvent::VariantUpdated(e) => e.product_id,
            ProductEvent::VariantStatusChanged(e) => e.product_id,
            ProductEvent::VariantRemoved(e) => e.product_id,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductInfoUpdated(_) => "products.product.info_updated",
            ProductEvent::ProductCategoryChanged(_) => "products.product.category_changed",
            ProductEvent::ProductPriceChanged(_) => "products.product.price_changed",
            ProductEvent::ProductActivated(_) => "products.product.activated",
            ProductEvent::ProductInactivated(_) => "products.product.inactivated",
            ProductEvent::ProductDeleted(_) => "products.product.deleted",
            ProductEvent::VariantsAdded(_) => "products.product.variants_added",
            ProductEvent::VariantUpdated(_) => "products.product.variant_updated",
            ProductEvent::VariantStatusChanged(_) => "products.product.variant_status_changed",
            ProductEvent::VariantRemoved(_) => "products.product.variant_removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductInfoUpdated(e) => e.occurred_at,
            ProductEvent::ProductCategoryChanged(e) => e.occurred_at,
            ProductEvent::ProductPriceChanged(e) => e.occurred_at,
            ProductEvent::ProductActivated(e) => e.occurred_at,
            ProductEvent::ProductInactivated(e) => e.occurred_at,
            ProductEvent::ProductDeleted(e) => e.occurred_at,
            ProductEvent::VariantsAdded(e) => e.occurred_at,
            ProductEvent::VariantUpdated(e) => e.occurred_at,
            ProductEvent::VariantStatusChanged(e) => e.occurred_at,
            ProductEvent::VariantRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.seller_id = e.seller_id.clone();
                self.name = e.name.clone();
                self.brand = e.brand.clone();
                self.description = e.description.clone();
                self.category_id = e.category_id.clone();
                self.base_price = e.base_price.clone();
                self.variants = e.variants.clone();
                self.status = ProductStatus::Active;
                self.is_deleted = false;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ProductEvent::ProductInfoUpdated(e) => {
                self.name = e.name.clone();
                self.brand = e.brand.clone();
                self.description = e.description.clone();
            }
            ProductEvent::ProductCategoryChanged(e) => {
                self.category_id = e.category_id.clone();
            }
            ProductEvent::ProductPriceChanged(e) => {
                self.base_price = e.price.clone();
            }
            ProductEvent::ProductActivated(_) => {
                self.status = ProductStatus::Active;
            }
            ProductEvent::ProductInactivated(e) => {
                self.status = ProductStatus::Inactive;
                for variant in &mut self.variants {
                    variant.status = VariantStatus::Inactive;
                    variant.updated_at = e.occurred_at;
                }
            }
            ProductEvent::ProductDeleted(e) => {
                self.is_deleted = true;
                self.deleted_at = Some(e.occurred_at);
                for variant in &mut self.variants {
                    variant.status = VariantStatus::Discontinued;
                    variant.updated_at = e.occurred_at;
                }
            }
            ProductEvent::VariantsAdded(e) => {
                self.variants.extend(e.variants.iter().cloned());
            }
            ProductEvent::VariantUpdated(e) => {
                if let Some(variant) = self.variant_mut(&e.sku) {
                    variant.price = e.price.clone();
                    variant.updated_at = e.occurred_at;
                }
            }
            ProductEvent::VariantStatusChanged(e) => {
                if let Some(variant) = self.variant_mut(&e.sku) {
                    variant.status = e.status;
                    variant.updated_at = e.occurred_at;
                }
            }
            ProductEvent::VariantRemoved(e) => {
                if let Some(variant) = self.variant_mut(&e.sku) {
                    variant.status = VariantStatus::Discontinued;
                    variant.updated_at = e.occurred_at;
                }
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Create(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateInfo(cmd) => self.handle_update_info(cmd),
            ProductCommand::ChangeCategory(cmd) => self.handle_change_category(cmd),
            ProductCommand::ChangePrice(cmd) => self.handle_change_price(cmd),
            ProductCommand::Activate(cmd) => self.handle_activate(cmd),
            ProductCommand::Inactivate(cmd) => self.handle_inactivate(cmd),
            ProductCommand::Delete(cmd) => self.handle_delete(cmd),
            ProductCommand::AddVariants(cmd) => self.handle_add_variants(cmd),
            ProductCommand::UpdateVariant(cmd) => self.handle_update_variant(cmd),
            ProductCommand::ChangeVariantStatus(cmd) => self.handle_change_variant_status(cmd),
            ProductCommand::RemoveVariant(cmd) => self.handle_remove_variant(cmd),
        }
    }
}

impl Product {
    /// Existence, identity and seller ownership; shared by every non-create command.
    fn ensure_owned(&self, product_id: ProductId, seller_id: &SellerId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        if &self.seller_id != seller_id {
            return Err(DomainError::Unauthorized);
        }
        Ok(())
    }

    fn ensure_not_deleted(&self) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::invariant("product is deleted"));
        }
        Ok(())
    }

    fn ensure_price(&self, price: &Money, what: &str) -> Result<(), DomainError> {
        if !price.is_positive() {
            return Err(DomainError::validation(format!("{what} must be greater than zero")));
        }
        Ok(())
    }

    fn ensure_currency(&self, price: &Money, base: &Money) -> Result<(), DomainError> {
        if price.currency() != base.currency() {
            return Err(DomainError::validation(format!(
                "variant price currency {} differs from product currency {}",
                price.currency(),
                base.currency()
            )));
        }
        Ok(())
    }

    /// Materialise variant specs, rejecting SKUs that collide with each other
    /// or with `existing`.
    fn build_variants(
        &self,
        product_id: ProductId,
        base_price: &Money,
        specs: &[VariantSpec],
        existing: &[ProductVariant],
        at: DateTime<Utc>,
    ) -> Result<Vec<ProductVariant>, DomainError> {
        let mut built: Vec<ProductVariant> = Vec::with_capacity(specs.len());
        for spec in specs {
            validate_options(&spec.options)?;

            let price = spec.price.clone().unwrap_or_else(|| base_price.clone());
            self.ensure_price(&price, "variant price")?;
            self.ensure_currency(&price, base_price)?;

            let sku = generate_sku(&product_id, &spec.options);
            if existing.iter().chain(built.iter()).any(|v| v.sku == sku) {
                return Err(DomainError::conflict(format!("duplicate variant sku: {sku}")));
            }
            built.push(ProductVariant::new(&product_id, spec.options.clone(), price, at));
        }
        Ok(built)
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        require_text(cmd.seller_id.as_str(), "seller_id")?;
        require_text(&cmd.name, "name")?;
        require_text(&cmd.brand, "brand")?;
        require_text(&cmd.category_id, "category_id")?;
        self.ensure_price(&cmd.base_price, "base price")?;

        // A product without options is sold as a single default variant.
        let default_spec = [VariantSpec::default()];
        let specs: &[VariantSpec] = if cmd.variants.is_empty() { &default_spec } else { &cmd.variants };
        let variants = self.build_variants(cmd.product_id, &cmd.base_price, specs, &[], cmd.occurred_at)?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            seller_id: cmd.seller_id.clone(),
            name: cmd.name.trim().to_string(),
            brand: cmd.brand.trim().to_string(),
            description: cmd.description.clone(),
            category_id: cmd.category_id.trim().to_string(),
            base_price: cmd.base_price.clone(),
            variants,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_info(&self, cmd: &UpdateProductInfo) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        self.ensure_not_deleted()?;

        if let Some(name) = &cmd.name {
            require_text(name, "name")?;
        }
        if let Some(brand) = &cmd.brand {
            require_text(brand, "brand")?;
        }
        if cmd.name.is_none() && cmd.brand.is_none() && cmd.description.is_none() {
            return Err(DomainError::validation("nothing to update"));
        }

        Ok(vec![ProductEvent::ProductInfoUpdated(ProductInfoUpdated {
            product_id: cmd.product_id,
            name: cmd.name.as_deref().map(str::trim).unwrap_or(&self.name).to_string(),
            brand: cmd.brand.as_deref().map(str::trim).unwrap_or(&self.brand).to_string(),
            description: cmd.description.clone().unwrap_or_else(|| self.description.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_category(&self, cmd: &ChangeProductCategory) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        self.ensure_not_deleted()?;
        require_text(&cmd.category_id, "category_id")?;

        let category_id = cmd.category_id.trim();
        if category_id == self.category_id {
            return Err(DomainError::invariant("product is already in this category"));
        }

        Ok(vec![ProductEvent::ProductCategoryChanged(ProductCategoryChanged {
            product_id: cmd.product_id,
            category_id: category_id.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_price(&self, cmd: &ChangeProductPrice) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        self.ensure_not_deleted()?;
        self.ensure_price(&cmd.price, "price")?;
        self.ensure_currency(&cmd.price, &self.base_price)?;

        Ok(vec![ProductEvent::ProductPriceChanged(ProductPriceChanged {
            product_id: cmd.product_id,
            price: cmd.price.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        if self.is_deleted {
            return Err(DomainError::invariant("deleted products cannot be activated"));
        }
        if self.status == ProductStatus::Active {
            return Err(DomainError::conflict("product is already active"));
        }

        Ok(vec![ProductEvent::ProductActivated(ProductActivated {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_inactivate(&self, cmd: &InactivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        if self.status == ProductStatus::Inactive {
            return Err(DomainError::conflict("product is already inactive"));
        }

        Ok(vec![ProductEvent::ProductInactivated(ProductInactivated {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        if self.is_deleted {
            return Err(DomainError::conflict("product is already deleted"));
        }
        if self.status == ProductStatus::Active {
            return Err(DomainError::invariant("active products must be inactivated before deletion"));
        }

        Ok(vec![ProductEvent::ProductDeleted(ProductDeleted {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_variants(&self, cmd: &AddVariants) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        self.ensure_not_deleted()?;
        if cmd.variants.is_empty() {
            return Err(DomainError::validation("at least one variant is required"));
        }

        let variants = self.build_variants(
            cmd.product_id,
            &self.base_price,
            &cmd.variants,
            &self.variants,
            cmd.occurred_at,
        )?;

        Ok(vec![ProductEvent::VariantsAdded(VariantsAdded {
            product_id: cmd.product_id,
            variants,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_variant(&self, cmd: &UpdateVariant) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        self.ensure_not_deleted()?;
        self.existing_variant(&cmd.sku)?;
        self.ensure_price(&cmd.price, "variant price")?;
        self.ensure_currency(&cmd.price, &self.base_price)?;

        Ok(vec![ProductEvent::VariantUpdated(VariantUpdated {
            product_id: cmd.product_id,
            sku: cmd.sku.clone(),
            price: cmd.price.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_variant_status(&self, cmd: &ChangeVariantStatus) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        self.ensure_not_deleted()?;
        let variant = self.existing_variant(&cmd.sku)?;
        if variant.status == cmd.status {
            return Err(DomainError::conflict(format!("variant {} is already {:?}", cmd.sku, cmd.status)));
        }

        Ok(vec![ProductEvent::VariantStatusChanged(VariantStatusChanged {
            product_id: cmd.product_id,
            sku: cmd.sku.clone(),
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_variant(&self, cmd: &RemoveVariant) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owned(cmd.product_id, &cmd.seller_id)?;
        self.ensure_not_deleted()?;
        let variant = self.existing_variant(&cmd.sku)?;
        if variant.status == VariantStatus::Discontinued {
            return Err(DomainError::conflict(format!("variant {} is already discontinued", cmd.sku)));
        }

        Ok(vec![ProductEvent::VariantRemoved(VariantRemoved {
            product_id: cmd.product_id,
            sku: cmd.sku.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn existing_variant(&self, sku: &str) -> Result<&ProductVariant, DomainError> {
        self.variant(sku)
            .ok_or_else(|| DomainError::invariant(format!("SKU not found: {sku}")))
    }
}

fn require_text(value: &str, field: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn validate_options(options: &OptionCombination) -> Result<(), DomainError> {
    for (name, value) in options {
        if name.trim().is_empty() || value.trim().is_empty() {
            return Err(DomainError::validation("option names and values cannot be empty"));
        }
    }
    Ok(())
}
