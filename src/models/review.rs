use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::utils::to_rfc3339;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub booking_id: ObjectId,
    pub customer_id: ObjectId,
    /// Copied from the booking; a booking's worker never changes once set.
    pub worker_id: Option<ObjectId>,
    pub rating: i32, // 1-5
    pub comment: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateReviewDto {
    pub booking_id: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ReviewResponse {
    pub id: String,
    pub booking_id: String,
    pub customer_id: String,
    pub worker_id: Option<String>,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: String,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        ReviewResponse {
            id: review.id.map(|id| id.to_hex()).unwrap_or_default(),
            booking_id: review.booking_id.to_hex(),
            customer_id: review.customer_id.to_hex(),
            worker_id: review.worker_id.map(|id| id.to_hex()),
            rating: review.rating,
            comment: review.comment,
            created_at: to_rfc3339(review.created_at),
        }
    }
}
