use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{
    CategoryResponse, CreateCategoryDto, CreateServiceDto, Service, ServiceCategory,
    ServiceResponse,
};
use crate::utils::{parse_object_id, ApiError, ApiResponse};

#[openapi(tag = "Admin - Categories")]
#[post("/admin/categories", data = "<dto>")]
pub async fn create_category(
    db: &State<DbConn>,
    admin: AdminGuard,
    dto: Json<CreateCategoryDto>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ApiError> {
    dto.validate()?;

    let category = ServiceCategory::from(dto.into_inner());
    if category.name.is_empty() {
        return Err(ApiError::bad_request("Category name cannot be empty"));
    }

    db.insert_category(&category).await?;
    log::info!("Admin {} created category '{}'", admin.auth.user_id, category.name);

    Ok(Json(ApiResponse::success_with_message(
        "Category created successfully".to_string(),
        category.into(),
    )))
}

#[openapi(tag = "Admin - Services")]
#[post("/admin/services", data = "<dto>")]
pub async fn create_service(
    db: &State<DbConn>,
    admin: AdminGuard,
    dto: Json<CreateServiceDto>,
) -> Result<Json<ApiResponse<ServiceResponse>>, ApiError> {
    dto.validate()?;

    let category_id = parse_object_id(&dto.category_id, "category")?;
    db.find_category(category_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    let dto = dto.into_inner();
    let defaults = Service::new(category_id, dto.name.trim().to_string(), dto.base_price, dto.price_per_hour);
    let service = Service {
        description: dto.description,
        image: dto.image,
        min_duration: dto.min_duration.unwrap_or(defaults.min_duration),
        max_duration: dto.max_duration.unwrap_or(defaults.max_duration),
        ..defaults
    };

    if service.min_duration > service.max_duration {
        return Err(ApiError::bad_request(
            "Minimum duration cannot exceed maximum duration",
        ));
    }

    db.insert_service(&service).await?;
    log::info!("Admin {} created service '{}'", admin.auth.user_id, service.name);

    Ok(Json(ApiResponse::success_with_message(
        "Service created successfully".to_string(),
        service.into(),
    )))
}
