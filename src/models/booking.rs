use std::fmt;
use std::str::FromStr;

use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::models::Service;
use crate::utils::to_rfc3339;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "in_progress" => Ok(BookingStatus::InProgress),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("Unknown booking status '{}'", other)),
        }
    }
}

/// A lifecycle step requested against a booking.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Accept { worker_id: ObjectId },
    Start,
    Complete,
    Cancel { reason: String },
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Accept { .. } => "accept",
            Transition::Start => "start",
            Transition::Complete => "complete",
            Transition::Cancel { .. } => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("Cannot {action} a booking that is {from}")]
    InvalidState {
        from: BookingStatus,
        action: &'static str,
    },
}

/// `total_price = base_price + price_per_hour * duration_hours`
pub fn quote_price(service: &Service, duration_hours: f64) -> f64 {
    service.base_price + service.price_per_hour * duration_hours
}

/// A scheduled unit of work.
///
/// The lifecycle fields (`status`, `worker_id` and the timestamps) are private:
/// they only change through [`Booking::apply`], which keeps the worker assignment
/// and the status in step. `total_price` is fixed at construction.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub customer_id: ObjectId,
    pub service_id: ObjectId,
    pub scheduled_at: DateTime,
    pub duration_hours: f64,
    pub address: String,
    pub notes: Option<String>,
    total_price: f64,
    status: BookingStatus,
    worker_id: Option<ObjectId>,
    started_at: Option<DateTime>,
    completed_at: Option<DateTime>,
    cancelled_at: Option<DateTime>,
    cancel_reason: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
}

impl Booking {
    pub fn new(
        customer_id: ObjectId,
        service: &Service,
        scheduled_at: DateTime,
        duration_hours: f64,
        address: String,
        notes: Option<String>,
    ) -> Option<Self> {
        let service_id = service.id?;
        let now = DateTime::now();

        Some(Booking {
            id: Some(ObjectId::new()),
            customer_id,
            service_id,
            scheduled_at,
            duration_hours,
            address,
            notes,
            total_price: quote_price(service, duration_hours),
            status: BookingStatus::Pending,
            worker_id: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn total_price(&self) -> f64 {
        self.total_price
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn worker_id(&self) -> Option<ObjectId> {
        self.worker_id
    }

    pub fn started_at(&self) -> Option<DateTime> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime> {
        self.completed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime> {
        self.cancelled_at
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn is_assigned_to(&self, worker_id: &ObjectId) -> bool {
        self.worker_id.as_ref() == Some(worker_id)
    }

    /// Computes the booking that results from `transition` at `now`.
    ///
    /// The receiver is left untouched; callers persist the returned value with a
    /// conditional write keyed on `self.status()`.
    pub fn apply(&self, transition: Transition, now: DateTime) -> Result<Booking, TransitionError> {
        let mut next = self.clone();

        match (self.status, transition) {
            (BookingStatus::Pending, Transition::Accept { worker_id }) => {
                next.status = BookingStatus::Confirmed;
                next.worker_id = Some(worker_id);
            }
            (BookingStatus::Confirmed, Transition::Start) => {
                next.status = BookingStatus::InProgress;
                next.started_at = Some(now);
            }
            (BookingStatus::InProgress, Transition::Complete) => {
                next.status = BookingStatus::Completed;
                next.completed_at = Some(now);
            }
            (
                BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::InProgress,
                Transition::Cancel { reason },
            ) => {
                next.status = BookingStatus::Cancelled;
                next.cancelled_at = Some(now);
                next.cancel_reason = Some(reason);
            }
            (from, transition) => {
                return Err(TransitionError::InvalidState {
                    from,
                    action: transition.name(),
                });
            }
        }

        next.updated_at = now;
        Ok(next)
    }

    /// `$set` body carrying only the lifecycle fields.
    pub(crate) fn lifecycle_document(&self) -> Document {
        doc! {
            "status": self.status.as_str(),
            "worker_id": self.worker_id,
            "started_at": self.started_at,
            "completed_at": self.completed_at,
            "cancelled_at": self.cancelled_at,
            "cancel_reason": self.cancel_reason.clone(),
            "updated_at": self.updated_at,
        }
    }

    /// Copies the lifecycle fields of `next` onto `self`. Price, customer and
    /// schedule are left as stored, and an existing worker is never replaced.
    pub(crate) fn adopt_lifecycle(&mut self, next: &Booking) {
        self.status = next.status;
        if self.worker_id.is_none() {
            self.worker_id = next.worker_id;
        }
        self.started_at = next.started_at;
        self.completed_at = next.completed_at;
        self.cancelled_at = next.cancelled_at;
        self.cancel_reason = next.cancel_reason.clone();
        self.updated_at = next.updated_at;
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateBookingDto {
    pub service_id: String,
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
    pub duration_hours: f64,
    #[validate(length(min = 1))]
    pub address: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct CancelBookingDto {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct BookingListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BookingResponse {
    pub id: String,
    pub customer_id: String,
    pub worker_id: Option<String>,
    pub service_id: String,
    pub status: BookingStatus,
    pub scheduled_at: String,
    pub duration_hours: f64,
    pub address: String,
    pub notes: Option<String>,
    pub total_price: f64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        let status = booking.status();
        let worker_id = booking.worker_id().map(|id| id.to_hex());
        let total_price = booking.total_price();
        let started_at = booking.started_at().map(to_rfc3339);
        let completed_at = booking.completed_at().map(to_rfc3339);
        let cancelled_at = booking.cancelled_at().map(to_rfc3339);
        let cancel_reason = booking.cancel_reason().map(str::to_string);

        BookingResponse {
            id: booking.id.map(|id| id.to_hex()).unwrap_or_default(),
            customer_id: booking.customer_id.to_hex(),
            worker_id,
            service_id: booking.service_id.to_hex(),
            status,
            scheduled_at: to_rfc3339(booking.scheduled_at),
            duration_hours: booking.duration_hours,
            address: booking.address,
            notes: booking.notes,
            total_price,
            started_at,
            completed_at,
            cancelled_at,
            cancel_reason,
            created_at: to_rfc3339(booking.created_at),
            updated_at: to_rfc3339(booking.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: f64, per_hour: f64) -> Service {
        Service::new(ObjectId::new(), "Deep cleaning".to_string(), base, per_hour)
    }

    fn pending_booking() -> Booking {
        let tomorrow = DateTime::from_millis(DateTime::now().timestamp_millis() + 86_400_000);
        Booking::new(
            ObjectId::new(),
            &service(20.0, 10.0),
            tomorrow,
            2.0,
            "12 Harbour Road".to_string(),
            None,
        )
        .unwrap()
    }

    /// Worker is unset exactly while the booking has never been accepted.
    fn assignment_matches_status(booking: &Booking) -> bool {
        match booking.status() {
            BookingStatus::Pending => booking.worker_id().is_none(),
            BookingStatus::Confirmed | BookingStatus::InProgress | BookingStatus::Completed => {
                booking.worker_id().is_some()
            }
            BookingStatus::Cancelled => true,
        }
    }

    #[test]
    fn price_is_base_plus_hourly_rate() {
        let booking = pending_booking();
        assert_eq!(booking.total_price(), 40.0);
        assert_eq!(booking.status(), BookingStatus::Pending);
        assert!(booking.worker_id().is_none());
    }

    #[test]
    fn happy_path_sets_worker_and_timestamps() {
        let worker = ObjectId::new();
        let now = DateTime::now();

        let confirmed = pending_booking()
            .apply(Transition::Accept { worker_id: worker }, now)
            .unwrap();
        assert_eq!(confirmed.status(), BookingStatus::Confirmed);
        assert!(confirmed.is_assigned_to(&worker));

        let started = confirmed.apply(Transition::Start, now).unwrap();
        assert_eq!(started.status(), BookingStatus::InProgress);
        assert_eq!(started.started_at(), Some(now));

        let completed = started.apply(Transition::Complete, now).unwrap();
        assert_eq!(completed.status(), BookingStatus::Completed);
        assert_eq!(completed.completed_at(), Some(now));
        assert!(completed.is_assigned_to(&worker));

        for booking in [&confirmed, &started, &completed] {
            assert!(assignment_matches_status(booking));
            assert_eq!(booking.total_price(), 40.0);
        }
    }

    #[test]
    fn out_of_order_steps_are_rejected() {
        let now = DateTime::now();
        let pending = pending_booking();

        assert_eq!(
            pending.apply(Transition::Start, now).unwrap_err(),
            TransitionError::InvalidState { from: BookingStatus::Pending, action: "start" }
        );
        assert!(pending.apply(Transition::Complete, now).is_err());

        let confirmed = pending
            .apply(Transition::Accept { worker_id: ObjectId::new() }, now)
            .unwrap();
        assert!(confirmed
            .apply(Transition::Accept { worker_id: ObjectId::new() }, now)
            .is_err());
        assert!(confirmed.apply(Transition::Complete, now).is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        let now = DateTime::now();
        let cancelled = pending_booking()
            .apply(Transition::Cancel { reason: "changed plans".to_string() }, now)
            .unwrap();

        assert_eq!(cancelled.status(), BookingStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason(), Some("changed plans"));
        assert!(assignment_matches_status(&cancelled));

        for transition in [
            Transition::Accept { worker_id: ObjectId::new() },
            Transition::Start,
            Transition::Complete,
            Transition::Cancel { reason: String::new() },
        ] {
            assert!(matches!(
                cancelled.apply(transition, now),
                Err(TransitionError::InvalidState { from: BookingStatus::Cancelled, .. })
            ));
        }
    }

    #[test]
    fn completed_cannot_be_cancelled() {
        let now = DateTime::now();
        let completed = pending_booking()
            .apply(Transition::Accept { worker_id: ObjectId::new() }, now)
            .and_then(|b| b.apply(Transition::Start, now))
            .and_then(|b| b.apply(Transition::Complete, now))
            .unwrap();

        assert!(completed
            .apply(Transition::Cancel { reason: String::new() }, now)
            .is_err());
    }

    #[test]
    fn adopt_lifecycle_keeps_price_and_first_worker() {
        let now = DateTime::now();
        let first = ObjectId::new();
        let mut stored = pending_booking()
            .apply(Transition::Accept { worker_id: first }, now)
            .unwrap();

        let mut forged = stored.apply(Transition::Start, now).unwrap();
        forged.total_price = 1.0;
        forged.worker_id = Some(ObjectId::new());

        stored.adopt_lifecycle(&forged);
        assert_eq!(stored.status(), BookingStatus::InProgress);
        assert_eq!(stored.total_price(), 40.0);
        assert!(stored.is_assigned_to(&first));
    }

    #[test]
    fn status_parses_from_query_strings() {
        assert_eq!("in_progress".parse::<BookingStatus>(), Ok(BookingStatus::InProgress));
        assert!("done".parse::<BookingStatus>().is_err());
    }
}
