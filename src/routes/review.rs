use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::engine::BookingEngine;
use crate::guards::AuthGuard;
use crate::models::{CreateReviewDto, ReviewResponse};
use crate::utils::{parse_object_id, ApiError, ApiResponse};

#[openapi(tag = "Review")]
#[post("/reviews", data = "<dto>")]
pub async fn create_review(
    engine: &State<BookingEngine>,
    auth: AuthGuard,
    dto: Json<CreateReviewDto>,
) -> Result<Json<ApiResponse<ReviewResponse>>, ApiError> {
    dto.validate()?;

    let booking_id = parse_object_id(&dto.booking_id, "booking")?;
    let dto = dto.into_inner();

    let review = engine
        .submit_review(&auth.actor(), booking_id, dto.rating, dto.comment)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Review submitted successfully".to_string(),
        review.into(),
    )))
}

#[openapi(tag = "Review")]
#[get("/workers/<worker_id>/reviews")]
pub async fn get_worker_reviews(
    engine: &State<BookingEngine>,
    worker_id: String,
) -> Result<Json<ApiResponse<Vec<ReviewResponse>>>, ApiError> {
    let worker_id = parse_object_id(&worker_id, "worker")?;
    let reviews = engine.worker_reviews(worker_id).await?;

    Ok(Json(ApiResponse::success(
        reviews.into_iter().map(ReviewResponse::from).collect(),
    )))
}
