use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::engine::{BookingEngine, NewBooking};
use crate::guards::AuthGuard;
use crate::models::{BookingListQuery, BookingResponse, BookingStatus, CancelBookingDto, CreateBookingDto};
use crate::utils::{from_chrono, parse_object_id, ApiError, ApiResponse};

#[openapi(tag = "Booking")]
#[post("/bookings", data = "<dto>")]
pub async fn create_booking(
    engine: &State<BookingEngine>,
    auth: AuthGuard,
    dto: Json<CreateBookingDto>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    dto.validate()?;

    let dto = dto.into_inner();
    let request = NewBooking {
        service_id: parse_object_id(&dto.service_id, "service")?,
        scheduled_at: from_chrono(dto.scheduled_at),
        duration_hours: dto.duration_hours,
        address: dto.address,
        notes: dto.notes,
    };

    let booking = engine.create(&auth.actor(), request).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking created successfully".to_string(),
        booking.into(),
    )))
}

#[openapi(tag = "Booking")]
#[get("/bookings?<query..>")]
pub async fn list_bookings(
    engine: &State<BookingEngine>,
    auth: AuthGuard,
    query: BookingListQuery,
) -> Result<Json<ApiResponse<Vec<BookingResponse>>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<BookingStatus>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let bookings = engine.list(&auth.actor(), status).await?;

    Ok(Json(ApiResponse::success(
        bookings.into_iter().map(BookingResponse::from).collect(),
    )))
}

#[openapi(tag = "Booking")]
#[get("/bookings/<booking_id>")]
pub async fn get_booking(
    engine: &State<BookingEngine>,
    auth: AuthGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking_id = parse_object_id(&booking_id, "booking")?;
    let booking = engine.get(&auth.actor(), booking_id).await?;

    Ok(Json(ApiResponse::success(booking.into())))
}

#[openapi(tag = "Booking")]
#[put("/bookings/<booking_id>/cancel", data = "<dto>")]
pub async fn cancel_booking(
    engine: &State<BookingEngine>,
    auth: AuthGuard,
    booking_id: String,
    dto: Option<Json<CancelBookingDto>>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking_id = parse_object_id(&booking_id, "booking")?;
    // The body is optional; no body means no reason.
    let reason = dto.map(|dto| dto.into_inner().reason).unwrap_or_default();
    let booking = engine.cancel(&auth.actor(), booking_id, reason).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking cancelled".to_string(),
        booking.into(),
    )))
}
