use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

/// Service category stored in MongoDB
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceCategory {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateCategoryDto {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

impl ServiceCategory {
    pub fn new(name: String) -> Self {
        let now = DateTime::now();
        ServiceCategory {
            id: Some(ObjectId::new()),
            name: name.trim().to_string(),
            description: None,
            icon: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl From<CreateCategoryDto> for ServiceCategory {
    fn from(dto: CreateCategoryDto) -> Self {
        ServiceCategory {
            description: dto.description,
            icon: dto.icon,
            ..ServiceCategory::new(dto.name)
        }
    }
}

/// Response model returned to clients
#[derive(Debug, Serialize, JsonSchema)]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

impl From<ServiceCategory> for CategoryResponse {
    fn from(category: ServiceCategory) -> Self {
        CategoryResponse {
            id: category.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: category.name,
            description: category.description,
            icon: category.icon,
        }
    }
}
