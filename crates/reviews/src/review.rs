use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use commerce_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use commerce_events::Event;
use commerce_products::ProductId;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(pub AggregateId);

impl ReviewId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReviewId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Author identity, issued by the external account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Aggregate root: Review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    id: ReviewId,
    order_id: Option<String>,
    product_id: Option<ProductId>,
    sku: String,
    user_id: UserId,
    title: String,
    content: String,
    rating: u8,
    deleted: bool,
    created_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Review {
    pub fn empty(id: ReviewId) -> Self {
        Self {
            id,
            order_id: None,
            product_id: None,
            sku: String::new(),
            user_id: UserId::default(),
            title: String::new(),
            content: String::new(),
            rating: 0,
            deleted: false,
            created_at: None,
            deleted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReviewId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

impl AggregateRoot for Review {
    type Id = ReviewId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReview {
    pub review_id: ReviewId,
    pub order_id: Option<String>,
    pub product_id: ProductId,
    pub sku: String,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub rating: u8,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReview {
    pub review_id: ReviewId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewCommand {
    Create(CreateReview),
    Delete(DeleteReview),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCreated {
    pub review_id: ReviewId,
    pub order_id: Option<String>,
    pub product_id: ProductId,
    pub sku: String,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub rating: u8,
    pub occurred_at: DateTime<Utc>,
}

/// Carries product and sku so read models can adjust counts without a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDeleted {
    pub review_id: ReviewId,
    pub product_id: ProductId,
    pub sku: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ReviewEvent {
    ReviewCreated(ReviewCreated),
    ReviewDeleted(ReviewDeleted),
}

impl Event for ReviewEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReviewEvent::ReviewCreated(_) => "reviews.review.created",
            ReviewEvent::ReviewDeleted(_) => "reviews.review.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReviewEvent::ReviewCreated(e) => e.occurred_at,
            ReviewEvent::ReviewDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Review {
    type Command = ReviewCommand;
    type Event = ReviewEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReviewEvent::ReviewCreated(e) => {
                self.id = e.review_id;
                self.order_id = e.order_id.clone();
                self.product_id = Some(e.product_id);
                self.sku = e.sku.clone();
                self.user_id = e.user_id.clone();
                self.title = e.title.clone();
                self.content = e.content.clone();
                self.rating = e.rating;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ReviewEvent::ReviewDeleted(e) => {
                self.deleted = true;
                self.deleted_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReviewCommand::Create(cmd) => self.handle_create(cmd),
            ReviewCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Review {
    fn handle_create(&self, cmd: &CreateReview) -> Result<Vec<ReviewEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("review already exists"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.user_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("user_id cannot be empty"));
        }
        if cmd.title.trim().is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }
        if !(MIN_RATING..=MAX_RATING).contains(&cmd.rating) {
            return Err(DomainError::validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }

        Ok(vec![ReviewEvent::ReviewCreated(ReviewCreated {
            review_id: cmd.review_id,
            order_id: cmd.order_id.clone().filter(|o| !o.trim().is_empty()),
            product_id: cmd.product_id,
            sku: cmd.sku.trim().to_string(),
            user_id: cmd.user_id.clone(),
            title: cmd.title.trim().to_string(),
            content: cmd.content.clone(),
            rating: cmd.rating,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteReview) -> Result<Vec<ReviewEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cmd.review_id {
            return Err(DomainError::invariant("review_id mismatch"));
        }
        if self.user_id != cmd.user_id {
            return Err(DomainError::Unauthorized);
        }
        if self.deleted {
            return Err(DomainError::conflict("review is already deleted"));
        }
        let product_id = self
            .product_id
            .ok_or_else(|| DomainError::invariant("review has no product"))?;

        Ok(vec![ReviewEvent::ReviewDeleted(ReviewDeleted {
            review_id: cmd.review_id,
            product_id,
            sku: self.sku.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commerce_events::execute;

    fn create_cmd(review_id: ReviewId, rating: u8) -> CreateReview {
        CreateReview {
            review_id,
            order_id: Some("order-1".to_string()),
            product_id: ProductId::new(AggregateId::new()),
            sku: "sku-1".to_string(),
            user_id: UserId::new("user-1"),
            title: "Fits well".to_string(),
            content: "True to size.".to_string(),
            rating,
            occurred_at: Utc::now(),
        }
    }

    fn created_review() -> Review {
        let review_id = ReviewId::new(AggregateId::new());
        let mut review = Review::empty(review_id);
        execute(&mut review, &ReviewCommand::Create(create_cmd(review_id, 5))).unwrap();
        review
    }

    #[test]
    fn create_records_review() {
        let review = created_review();
        assert!(review.is_created());
        assert_eq!(review.rating(), 5);
        assert_eq!(review.title(), "Fits well");
        assert_eq!(review.version(), 1);
    }

    #[test]
    fn rating_outside_one_to_five_is_rejected() {
        let review_id = ReviewId::new(AggregateId::new());
        let review = Review::empty(review_id);
        for rating in [0u8, 6] {
            let result = review.handle(&ReviewCommand::Create(create_cmd(review_id, rating)));
            assert!(matches!(result, Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn blank_title_is_rejected() {
        let review_id = ReviewId::new(AggregateId::new());
        let mut cmd = create_cmd(review_id, 3);
        cmd.title = "  ".to_string();
        assert!(Review::empty(review_id).handle(&ReviewCommand::Create(cmd)).is_err());
    }

    #[test]
    fn only_author_can_delete() {
        let mut review = created_review();
        let stranger = ReviewCommand::Delete(DeleteReview {
            review_id: review.id_typed(),
            user_id: UserId::new("someone-else"),
            occurred_at: Utc::now(),
        });
        assert_eq!(review.handle(&stranger), Err(DomainError::Unauthorized));

        let author = ReviewCommand::Delete(DeleteReview {
            review_id: review.id_typed(),
            user_id: UserId::new("user-1"),
            occurred_at: Utc::now(),
        });
        execute(&mut review, &author).unwrap();
        assert!(review.is_deleted());
        assert!(matches!(review.handle(&author), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn deleting_missing_review_is_not_found() {
        let review = Review::empty(ReviewId::new(AggregateId::new()));
        let cmd = ReviewCommand::Delete(DeleteReview {
            review_id: review.id_typed(),
            user_id: UserId::new("user-1"),
            occurred_at: Utc::now(),
        });
        assert_eq!(review.handle(&cmd), Err(DomainError::NotFound));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

            #[test]
            fn only_ratings_in_range_are_accepted(rating in any::<u8>()) {
                let review_id = ReviewId::new(AggregateId::new());
                let review = Review::empty(review_id);
                let accepted = review.handle(&ReviewCommand::Create(create_cmd(review_id, rating))).is_ok();
                prop_assert_eq!(accepted, (MIN_RATING..=MAX_RATING).contains(&rating));
                prop_assert!(!review.is_created());
            }
        }
    }
}
