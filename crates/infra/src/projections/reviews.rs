use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use commerce_events::EventEnvelope;
use commerce_products::ProductId;
use commerce_reviews::{AGGREGATE_TYPE, Review, ReviewEvent, ReviewId, UserId};

use super::{Projection, ProjectionError, StreamFold};
use crate::read_model::ReadStore;

pub const DEFAULT_REVIEW_PAGE_SIZE: usize = 10;
pub const MAX_REVIEW_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewView {
    pub review_id: ReviewId,
    pub order_id: Option<String>,
    pub product_id: ProductId,
    pub sku: String,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
}

/// Live (not deleted) reviews of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReviewCount {
    pub product_id: ProductId,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPage {
    pub items: Vec<ReviewView>,
    pub total: usize,
    /// 1-based.
    pub page: usize,
    pub size: usize,
}

pub struct ReviewsProjection {
    fold: StreamFold<Review>,
    reviews: Arc<dyn ReadStore<ReviewId, ReviewView>>,
    counts: Arc<dyn ReadStore<ProductId, ProductReviewCount>>,
}

impl ReviewsProjection {
    pub fn new(
        reviews: Arc<dyn ReadStore<ReviewId, ReviewView>>,
        counts: Arc<dyn ReadStore<ProductId, ProductReviewCount>>,
    ) -> Self {
        Self {
            fold: StreamFold::new(AGGREGATE_TYPE, |id| Review::empty(ReviewId::new(id))),
            reviews,
            counts,
        }
    }

    pub fn get(&self, id: ReviewId) -> Option<ReviewView> {
        self.reviews.get(&id)
    }

    pub fn count(&self, product_id: ProductId) -> u64 {
        self.counts.get(&product_id).map(|c| c.count).unwrap_or(0)
    }

    /// Reviews of one variant, newest first. `page` is 1-based; 0 is treated as 1.
    pub fn page(&self, product_id: ProductId, sku: &str, page: usize, size: usize) -> ReviewPage {
        let page = page.max(1);
        let size = size.clamp(1, MAX_REVIEW_PAGE_SIZE);

        let mut matching: Vec<_> = self
            .reviews
            .list()
            .into_iter()
            .filter(|r| r.product_id == product_id && r.sku == sku)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.review_id.cmp(&a.review_id)));

        let total = matching.len();
        let items = matching.into_iter().skip((page - 1).saturating_mul(size)).take(size).collect();
        ReviewPage { items, total, page, size }
    }

    fn adjust_count(&self, product_id: ProductId, delta: i64) {
        let current = self.count(product_id);
        let count = if delta >= 0 {
            current.saturating_add(delta.unsigned_abs())
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };
        self.counts.upsert(product_id, ProductReviewCount { product_id, count });
    }
}

impl Projection for ReviewsProjection {
    fn name(&self) -> &'static str {
        "reviews"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &[AGGREGATE_TYPE]
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some((event, _)) = self.fold.fold(envelope)? else {
            return Ok(());
        };

        match event {
            ReviewEvent::ReviewCreated(e) => {
                self.reviews.upsert(
                    e.review_id,
                    ReviewView {
                        review_id: e.review_id,
                        order_id: e.order_id,
                        product_id: e.product_id,
                        sku: e.sku,
                        user_id: e.user_id,
                        title: e.title,
                        content: e.content,
                        rating: e.rating,
                        created_at: e.occurred_at,
                    },
                );
                self.adjust_count(e.product_id, 1);
            }
            ReviewEvent::ReviewDeleted(e) => {
                self.reviews.remove(&e.review_id);
                self.adjust_count(e.product_id, -1);
            }
        }
        Ok(())
    }

    fn reset(&self) {
        self.reviews.clear();
        self.counts.clear();
        self.fold.clear();
    }
}
