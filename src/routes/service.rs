use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::models::{ServiceListQuery, ServiceResponse};
use crate::utils::{parse_object_id, ApiError, ApiResponse};

#[openapi(tag = "Services")]
#[get("/services?<query..>")]
pub async fn list_services(
    db: &State<DbConn>,
    query: ServiceListQuery,
) -> Result<Json<ApiResponse<Vec<ServiceResponse>>>, ApiError> {
    let category_id = query
        .category_id
        .as_deref()
        .map(|raw| parse_object_id(raw, "category"))
        .transpose()?;

    let services = db.list_services(category_id).await?;

    Ok(Json(ApiResponse::success(
        services.into_iter().map(ServiceResponse::from).collect(),
    )))
}

#[openapi(tag = "Services")]
#[get("/services/<service_id>")]
pub async fn get_service(
    db: &State<DbConn>,
    service_id: String,
) -> Result<Json<ApiResponse<ServiceResponse>>, ApiError> {
    let service_id = parse_object_id(&service_id, "service")?;

    let service = db
        .find_service(service_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    Ok(Json(ApiResponse::success(service.into())))
}
