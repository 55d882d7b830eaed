use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::utils::to_rfc3339;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Worker,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Worker => "worker",
            UserRole::Admin => "admin",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
}

impl User {
    pub fn new(email: String, phone: String, password_hash: String, name: String, role: UserRole) -> Self {
        let now = DateTime::now();
        User {
            id: Some(ObjectId::new()),
            email: email.to_lowercase(),
            phone,
            password_hash,
            name,
            role,
            avatar: None,
            address: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RegisterDto {
    #[validate(email)]
    pub email: String,
    pub phone: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub role: UserRole,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct LoginDto {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct UpdateProfileDto {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ChangePasswordDto {
    pub old_password: String,
    #[validate(length(min = 6))]
    pub new_password: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub phone: String,
    pub name: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            email: user.email,
            phone: user.phone,
            name: user.name,
            role: user.role,
            avatar: user.avatar,
            address: user.address,
            is_active: user.is_active,
            created_at: to_rfc3339(user.created_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}
