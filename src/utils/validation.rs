use mongodb::bson::{oid::ObjectId, DateTime};
use regex::Regex;

use super::ApiError;

pub fn validate_phone(phone: &str) -> bool {
    Regex::new(r"^\+?[0-9]{7,15}$")
        .map(|re| re.is_match(phone))
        .unwrap_or(false)
}

/// Parses a path/body identifier, naming the entity in the error.
pub fn parse_object_id(raw: &str, entity: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid {} ID", entity)))
}

pub fn to_rfc3339(value: DateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(value.timestamp_millis())
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

pub fn from_chrono(value: chrono::DateTime<chrono::Utc>) -> DateTime {
    DateTime::from_millis(value.timestamp_millis())
}
