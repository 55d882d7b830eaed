use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{ChangePasswordDto, UpdateProfileDto, UserResponse};
use crate::services::PasswordService;
use crate::utils::{validate_phone, ApiError, ApiResponse};

#[openapi(tag = "User")]
#[get("/users/profile")]
pub async fn get_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = db
        .find_user(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let worker_profile = db.find_worker_by_user(auth.user_id).await?;

    let user_response: UserResponse = user.into();
    let mut response_data = serde_json::to_value(&user_response)
        .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;

    response_data["worker_profile_id"] =
        serde_json::json!(worker_profile.and_then(|w| w.id).map(|id| id.to_hex()));

    Ok(Json(ApiResponse::success(response_data)))
}

#[openapi(tag = "User")]
#[put("/users/profile", data = "<dto>")]
pub async fn update_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<UpdateProfileDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    if let Some(ref phone) = dto.phone {
        if !validate_phone(phone) {
            return Err(ApiError::bad_request("Invalid phone number"));
        }
    }

    if let Some(ref name) = dto.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("Name cannot be empty"));
        }
    }

    let user = db
        .update_user_profile(auth.user_id, &dto)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully".to_string(),
        user.into(),
    )))
}

#[openapi(tag = "User")]
#[put("/users/password", data = "<dto>")]
pub async fn change_password(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<ChangePasswordDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    let user = db
        .find_user(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !PasswordService::verify_password(&dto.old_password, &user.password_hash) {
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }

    let password_hash = PasswordService::hash_password(&dto.new_password)
        .map_err(|e| ApiError::internal_error(format!("Failed to hash password: {}", e)))?;

    if !db.update_user_password(auth.user_id, &password_hash).await? {
        return Err(ApiError::not_found("User not found"));
    }

    Ok(Json(ApiResponse::success_with_message(
        "Password changed successfully".to_string(),
        serde_json::json!({}),
    )))
}

#[openapi(tag = "User")]
#[delete("/users/account")]
pub async fn delete_account(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if !db.deactivate_user(auth.user_id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    log::info!("Account {} deactivated", auth.user_id);

    Ok(Json(ApiResponse::success_with_message(
        "Account deactivated".to_string(),
        serde_json::json!({}),
    )))
}
