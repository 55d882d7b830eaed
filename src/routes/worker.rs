use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::oid::ObjectId;

use crate::db::DbConn;
use crate::engine::BookingEngine;
use crate::guards::WorkerGuard;
use crate::models::{
    AvailabilityDto, BookingResponse, UpdateWorkerProfileDto, WorkerListQuery, WorkerProfile,
    WorkerResponse,
};
use crate::store::WorkerFilter;
use crate::utils::{parse_object_id, ApiError, ApiResponse};

async fn own_profile(db: &DbConn, user_id: ObjectId) -> Result<WorkerProfile, ApiError> {
    db.find_worker_by_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Worker profile not found"))
}

async fn apply_profile_changes(
    db: &DbConn,
    user_id: ObjectId,
    changes: &UpdateWorkerProfileDto,
) -> Result<WorkerProfile, ApiError> {
    let profile_id = own_profile(db, user_id)
        .await?
        .id
        .ok_or_else(|| ApiError::not_found("Worker profile not found"))?;

    db.update_worker_profile(profile_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Worker profile not found"))
}

/* ----------------------------- PUBLIC ----------------------------- */

#[openapi(tag = "Worker")]
#[get("/workers?<query..>")]
pub async fn list_workers(
    db: &State<DbConn>,
    query: WorkerListQuery,
) -> Result<Json<ApiResponse<Vec<WorkerResponse>>>, ApiError> {
    let filter = WorkerFilter {
        verified_only: query.verified.unwrap_or(false),
    };

    let workers = db.list_workers(filter).await?;

    Ok(Json(ApiResponse::success(
        workers.into_iter().map(WorkerResponse::from).collect(),
    )))
}

#[openapi(tag = "Worker")]
#[get("/workers/<worker_id>")]
pub async fn get_worker(
    db: &State<DbConn>,
    worker_id: String,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    let worker_id = parse_object_id(&worker_id, "worker")?;

    let worker = db
        .find_worker(worker_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Worker not found"))?;

    Ok(Json(ApiResponse::success(worker.into())))
}

/* ----------------------------- PROFILE ----------------------------- */

#[openapi(tag = "Worker")]
#[get("/worker/profile")]
pub async fn get_worker_profile(
    db: &State<DbConn>,
    worker: WorkerGuard,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    let profile = own_profile(db, worker.auth.user_id).await?;
    Ok(Json(ApiResponse::success(profile.into())))
}

#[openapi(tag = "Worker")]
#[put("/worker/profile", data = "<dto>")]
pub async fn update_worker_profile(
    db: &State<DbConn>,
    worker: WorkerGuard,
    dto: Json<UpdateWorkerProfileDto>,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    if dto.hourly_rate.is_some_and(|rate| !rate.is_finite() || rate < 0.0) {
        return Err(ApiError::bad_request("Hourly rate must be a non-negative number"));
    }

    let profile = apply_profile_changes(db, worker.auth.user_id, &dto).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Worker profile updated successfully".to_string(),
        profile.into(),
    )))
}

#[openapi(tag = "Worker")]
#[put("/worker/availability", data = "<dto>")]
pub async fn update_availability(
    db: &State<DbConn>,
    worker: WorkerGuard,
    dto: Json<AvailabilityDto>,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    let changes = UpdateWorkerProfileDto {
        is_available: Some(dto.is_available),
        ..Default::default()
    };

    let profile = apply_profile_changes(db, worker.auth.user_id, &changes).await?;

    Ok(Json(ApiResponse::success(profile.into())))
}

/* ----------------------------- BOOKINGS ----------------------------- */

#[openapi(tag = "Worker")]
#[get("/worker/pending-bookings")]
pub async fn pending_bookings(
    engine: &State<BookingEngine>,
    worker: WorkerGuard,
) -> Result<Json<ApiResponse<Vec<BookingResponse>>>, ApiError> {
    let bookings = engine.pending_queue(&worker.auth.actor()).await?;

    Ok(Json(ApiResponse::success(
        bookings.into_iter().map(BookingResponse::from).collect(),
    )))
}

#[openapi(tag = "Worker")]
#[put("/worker/bookings/<booking_id>/accept")]
pub async fn accept_booking(
    engine: &State<BookingEngine>,
    worker: WorkerGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking_id = parse_object_id(&booking_id, "booking")?;
    let booking = engine.accept(&worker.auth.actor(), booking_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking accepted".to_string(),
        booking.into(),
    )))
}

#[openapi(tag = "Worker")]
#[put("/worker/bookings/<booking_id>/start")]
pub async fn start_booking(
    engine: &State<BookingEngine>,
    worker: WorkerGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking_id = parse_object_id(&booking_id, "booking")?;
    let booking = engine.start(&worker.auth.actor(), booking_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking started".to_string(),
        booking.into(),
    )))
}

#[openapi(tag = "Worker")]
#[put("/worker/bookings/<booking_id>/complete")]
pub async fn complete_booking(
    engine: &State<BookingEngine>,
    worker: WorkerGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking_id = parse_object_id(&booking_id, "booking")?;
    let booking = engine.complete(&worker.auth.actor(), booking_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking completed".to_string(),
        booking.into(),
    )))
}
