//! Product reviews (event-sourced). One review per aggregate; only its
//! author may delete it.

pub mod review;

pub use review::{
    CreateReview, DeleteReview, MAX_RATING, MIN_RATING, Review, ReviewCommand, ReviewCreated,
    ReviewDeleted, ReviewEvent, ReviewId, UserId,
};

/// Aggregate type name used for review event streams.
pub const AGGREGATE_TYPE: &str = "reviews.review";
