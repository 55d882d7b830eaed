//! Persistence collaborator.
//!
//! Every entity is soft-deleted only: rows with `deleted_at` set never come back
//! from lookups or listings. The two primitives the booking engine relies on for
//! linearizability are explicit here instead of being rebuilt at each call site:
//! [`Store::compare_and_swap_booking`] (conditional write keyed on the expected
//! prior status) and [`Store::insert_review_and_aggregate`] (atomic
//! read-modify-write of the worker's rating).

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use mongodb::bson::oid::ObjectId;

use crate::models::{
    Booking, BookingStatus, Review, Service, ServiceCategory, UpdateProfileDto,
    UpdateWorkerProfileDto, User, WorkerProfile,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    /// A row the write depends on disappeared underneath it.
    #[error("{0} not found")]
    Missing(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub customer_id: Option<ObjectId>,
    pub worker_id: Option<ObjectId>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.customer_id.is_none_or(|id| booking.customer_id == id)
            && self.worker_id.is_none_or(|id| booking.worker_id() == Some(id))
            && self.status.is_none_or(|status| booking.status() == status)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerFilter {
    pub verified_only: bool,
}

#[rocket::async_trait]
pub trait Store: Send + Sync {
    // Users

    /// Fails with `Conflict` when the email or phone is already registered.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    /// Inserts a worker account and its profile as one unit: on any failure
    /// neither row exists.
    async fn insert_worker_user(&self, user: &User, worker: &WorkerProfile) -> StoreResult<()>;
    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update_user_profile(&self, id: ObjectId, changes: &UpdateProfileDto) -> StoreResult<Option<User>>;
    async fn update_user_password(&self, id: ObjectId, password_hash: &str) -> StoreResult<bool>;
    async fn deactivate_user(&self, id: ObjectId) -> StoreResult<bool>;

    // Workers

    /// Fails with `Conflict` when the user already has a worker profile.
    async fn insert_worker(&self, worker: &WorkerProfile) -> StoreResult<()>;
    async fn find_worker(&self, id: ObjectId) -> StoreResult<Option<WorkerProfile>>;
    async fn find_worker_by_user(&self, user_id: ObjectId) -> StoreResult<Option<WorkerProfile>>;
    /// Touches profile fields only; aggregates are owned by the booking engine.
    async fn update_worker_profile(
        &self,
        id: ObjectId,
        changes: &UpdateWorkerProfileDto,
    ) -> StoreResult<Option<WorkerProfile>>;
    /// Available workers, best rated first.
    async fn list_workers(&self, filter: WorkerFilter) -> StoreResult<Vec<WorkerProfile>>;

    // Catalog

    async fn insert_category(&self, category: &ServiceCategory) -> StoreResult<()>;
    async fn find_category(&self, id: ObjectId) -> StoreResult<Option<ServiceCategory>>;
    async fn list_categories(&self) -> StoreResult<Vec<ServiceCategory>>;
    async fn insert_service(&self, service: &Service) -> StoreResult<()>;
    async fn find_service(&self, id: ObjectId) -> StoreResult<Option<Service>>;
    async fn list_services(&self, category_id: Option<ObjectId>) -> StoreResult<Vec<Service>>;

    // Bookings

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;
    async fn find_booking(&self, id: ObjectId) -> StoreResult<Option<Booking>>;
    /// Newest first.
    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>>;
    /// Unassigned pending bookings, earliest scheduled first.
    async fn list_pending_bookings(&self) -> StoreResult<Vec<Booking>>;

    /// Writes the lifecycle fields of `next` only if the stored booking is still
    /// in `expected`. Returns whether the write happened.
    async fn compare_and_swap_booking(&self, next: &Booking, expected: BookingStatus) -> StoreResult<bool>;

    /// Same as [`Store::compare_and_swap_booking`], plus `total_jobs += 1` on the
    /// worker in the same atomic unit.
    async fn complete_booking(
        &self,
        next: &Booking,
        expected: BookingStatus,
        worker_id: ObjectId,
    ) -> StoreResult<bool>;

    // Reviews

    /// Inserts the review and, when it names a worker, folds its rating into the
    /// worker's running average. Either both happen or neither does. A second
    /// review for the same booking fails with `Conflict`.
    async fn insert_review_and_aggregate(&self, review: &Review) -> StoreResult<()>;
    async fn find_review_by_booking(&self, booking_id: ObjectId) -> StoreResult<Option<Review>>;
    /// Newest first.
    async fn list_reviews_for_worker(&self, worker_id: ObjectId) -> StoreResult<Vec<Review>>;
}
