use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::DbConn;
use crate::models::{AuthResponse, LoginDto, RegisterDto, User, UserRole, WorkerProfile};
use crate::services::{JwtService, PasswordService};
use crate::utils::{validate_phone, ApiError, ApiResponse};

fn issue_token(user: User) -> Result<AuthResponse, ApiError> {
    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal_error("User has no id"))?;

    let token = JwtService::generate_token(&user_id, user.role)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))?;

    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    dto.validate()?;

    if !validate_phone(&dto.phone) {
        return Err(ApiError::bad_request("Invalid phone number"));
    }

    match dto.role {
        UserRole::Customer | UserRole::Worker => {}
        UserRole::Admin => {
            return Err(ApiError::bad_request("Admin accounts cannot be registered"));
        }
    }

    let dto = dto.into_inner();
    let password_hash = PasswordService::hash_password(&dto.password)
        .map_err(|e| ApiError::internal_error(format!("Failed to hash password: {}", e)))?;

    let user = User::new(dto.email, dto.phone, password_hash, dto.name.trim().to_string(), dto.role);
    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal_error("User has no id"))?;

    match user.role {
        UserRole::Worker => db.insert_worker_user(&user, &WorkerProfile::new(user_id)).await?,
        UserRole::Customer | UserRole::Admin => db.insert_user(&user).await?,
    }

    log::info!("Registered {} account {}", user.role.as_str(), user_id);

    Ok(Json(ApiResponse::success_with_message(
        "Registration successful".to_string(),
        issue_token(user)?,
    )))
}

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    dto.validate()?;

    let user = db
        .find_user_by_email(&dto.email)
        .await?
        .filter(|user| PasswordService::verify_password(&dto.password, &user.password_hash))
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !user.is_active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }

    Ok(Json(ApiResponse::success_with_message(
        "Login successful".to_string(),
        issue_token(user)?,
    )))
}
