use crate::db::DbConn;
use crate::models::CategoryResponse;
use crate::utils::{ApiError, ApiResponse};
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

#[openapi(tag = "Category")]
#[get("/categories")]
pub async fn list_categories(
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<Vec<CategoryResponse>>>, ApiError> {
    let categories = db.list_categories().await?;

    Ok(Json(ApiResponse::success(
        categories.into_iter().map(CategoryResponse::from).collect(),
    )))
}
