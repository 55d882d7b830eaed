use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use crate::utils::to_rfc3339;

/// Worker extension of a `User` with role `worker`.
///
/// `rating`, `total_jobs` and `total_reviews` are aggregate fields. They are only
/// written by booking completion and review submission, never by profile edits.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerProfile {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub bio: Option<String>,
    pub hourly_rate: f64,
    pub rating: f64,
    pub total_jobs: i32,
    pub total_reviews: i32,
    pub is_verified: bool,
    pub is_available: bool,
    pub service_areas: Vec<String>,
    pub working_hours: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
}

impl WorkerProfile {
    pub fn new(user_id: ObjectId) -> Self {
        let now = DateTime::now();
        WorkerProfile {
            id: Some(ObjectId::new()),
            user_id,
            bio: None,
            hourly_rate: 0.0,
            rating: 0.0,
            total_jobs: 0,
            total_reviews: 0,
            is_verified: false,
            is_available: true,
            service_areas: Vec::new(),
            working_hours: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Editable worker fields. Aggregates are intentionally absent.
#[derive(Debug, Default, Clone, Deserialize, JsonSchema)]
pub struct UpdateWorkerProfileDto {
    pub bio: Option<String>,
    pub hourly_rate: Option<f64>,
    pub service_areas: Option<Vec<String>>,
    pub working_hours: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AvailabilityDto {
    pub is_available: bool,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct WorkerListQuery {
    pub verified: Option<bool>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct WorkerResponse {
    pub id: String,
    pub user_id: String,
    pub bio: Option<String>,
    pub hourly_rate: f64,
    pub rating: f64,
    pub total_jobs: i32,
    pub total_reviews: i32,
    pub is_verified: bool,
    pub is_available: bool,
    pub service_areas: Vec<String>,
    pub working_hours: Option<String>,
    pub created_at: String,
}

impl From<WorkerProfile> for WorkerResponse {
    fn from(worker: WorkerProfile) -> Self {
        WorkerResponse {
            id: worker.id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: worker.user_id.to_hex(),
            bio: worker.bio,
            hourly_rate: worker.hourly_rate,
            rating: worker.rating,
            total_jobs: worker.total_jobs,
            total_reviews: worker.total_reviews,
            is_verified: worker.is_verified,
            is_available: worker.is_available,
            service_areas: worker.service_areas,
            working_hours: worker.working_hours,
            created_at: to_rfc3339(worker.created_at),
        }
    }
}
