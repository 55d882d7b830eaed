use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

pub const DEFAULT_MIN_DURATION_MINUTES: i32 = 60;
pub const DEFAULT_MAX_DURATION_MINUTES: i32 = 480;

/// A bookable service. Pricing is read once when a booking is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub category_id: ObjectId,
    pub name: String,
    pub description: Option<String>,
    pub base_price: f64,
    pub price_per_hour: f64,
    /// minutes
    pub min_duration: i32,
    /// minutes
    pub max_duration: i32,
    pub image: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
}

impl Service {
    pub fn new(category_id: ObjectId, name: String, base_price: f64, price_per_hour: f64) -> Self {
        let now = DateTime::now();
        Service {
            id: Some(ObjectId::new()),
            category_id,
            name,
            description: None,
            base_price,
            price_per_hour,
            min_duration: DEFAULT_MIN_DURATION_MINUTES,
            max_duration: DEFAULT_MAX_DURATION_MINUTES,
            image: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether `hours` fits inside this service's duration window.
    pub fn accepts_duration(&self, hours: f64) -> bool {
        let minutes = hours * 60.0;
        minutes >= f64::from(self.min_duration) && minutes <= f64::from(self.max_duration)
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateServiceDto {
    pub category_id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub base_price: f64,
    #[validate(range(min = 0.0))]
    pub price_per_hour: f64,
    #[validate(range(min = 1))]
    pub min_duration: Option<i32>,
    #[validate(range(min = 1))]
    pub max_duration: Option<i32>,
    pub image: Option<String>,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct ServiceListQuery {
    pub category_id: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ServiceResponse {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub description: Option<String>,
    pub base_price: f64,
    pub price_per_hour: f64,
    pub min_duration: i32,
    pub max_duration: i32,
    pub image: Option<String>,
    pub is_active: bool,
}

impl From<Service> for ServiceResponse {
    fn from(service: Service) -> Self {
        ServiceResponse {
            id: service.id.map(|id| id.to_hex()).unwrap_or_default(),
            category_id: service.category_id.to_hex(),
            name: service.name,
            description: service.description,
            base_price: service.base_price,
            price_per_hour: service.price_per_hour,
            min_duration: service.min_duration,
            max_duration: service.max_duration,
            image: service.image,
            is_active: service.is_active,
        }
    }
}
