//! Booking lifecycle and review aggregation.
//!
//! The engine owns every state change of a booking and every write to a worker's
//! aggregate fields. Route handlers resolve identities and parse input; all
//! ownership checks are repeated here against the stored records.

mod lifecycle;
mod review;

pub use lifecycle::NewBooking;

use std::sync::Arc;

use mongodb::bson::oid::ObjectId;

use crate::models::{TransitionError, UserRole, WorkerProfile};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    State(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Persistence(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => EngineError::Conflict(message),
            StoreError::Missing(what) => EngineError::NotFound(format!("{} not found", what)),
            other => EngineError::Persistence(other.to_string()),
        }
    }
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        EngineError::State(err.to_string())
    }
}

/// The authenticated caller as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: ObjectId,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: ObjectId, role: UserRole) -> Self {
        Actor { user_id, role }
    }
}

/// New running average after folding `value` into `total_reviews` prior ratings.
pub fn running_average(rating: f64, total_reviews: i32, value: i32) -> f64 {
    let count = f64::from(total_reviews);
    (rating * count + f64::from(value)) / (count + 1.0)
}

#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn Store>,
}

impl BookingEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        BookingEngine { store }
    }

    /// Worker profile of the acting user. Worker-only actions fail with
    /// `NotFound` when the profile is missing.
    async fn resolve_worker(&self, actor: &Actor) -> EngineResult<WorkerProfile> {
        self.store
            .find_worker_by_user(actor.user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Worker profile not found".to_string()))
    }

    fn worker_id(worker: &WorkerProfile) -> EngineResult<ObjectId> {
        worker
            .id
            .ok_or_else(|| EngineError::NotFound("Worker profile not found".to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use mongodb::bson::{oid::ObjectId, DateTime};

    use super::{Actor, BookingEngine, NewBooking};
    use crate::models::{Booking, Service, ServiceCategory, User, UserRole, WorkerProfile};
    use crate::store::{MemoryStore, Store};

    pub struct Fixture {
        pub store: Arc<MemoryStore>,
        pub engine: BookingEngine,
        pub customer: Actor,
        pub service: Service,
    }

    impl Fixture {
        pub async fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let engine = BookingEngine::new(store.clone());

            let category = ServiceCategory::new("Cleaning".to_string());
            store.insert_category(&category).await.unwrap();

            let service = Service::new(category.id.unwrap(), "Deep cleaning".to_string(), 20.0, 10.0);
            store.insert_service(&service).await.unwrap();

            let customer = Fixture::register(&store, UserRole::Customer).await;

            Fixture {
                store,
                engine,
                customer,
                service,
            }
        }

        pub async fn register(store: &MemoryStore, role: UserRole) -> Actor {
            let id = ObjectId::new();
            let user = User::new(
                format!("{}@example.com", id.to_hex()),
                id.to_hex(),
                "hash".to_string(),
                "Test".to_string(),
                role,
            );
            let user_id = user.id.unwrap();
            store.insert_user(&user).await.unwrap();
            Actor::new(user_id, role)
        }

        /// Registers a worker user with a profile; returns the actor and profile id.
        pub async fn worker(&self) -> (Actor, ObjectId) {
            let actor = Fixture::register(&self.store, UserRole::Worker).await;
            let profile = WorkerProfile::new(actor.user_id);
            let profile_id = profile.id.unwrap();
            self.store.insert_worker(&profile).await.unwrap();
            (actor, profile_id)
        }

        pub fn request(&self, duration_hours: f64) -> NewBooking {
            NewBooking {
                service_id: self.service.id.unwrap(),
                scheduled_at: DateTime::from_millis(DateTime::now().timestamp_millis() + 86_400_000),
                duration_hours,
                address: "12 Harbour Road".to_string(),
                notes: None,
            }
        }

        pub async fn pending(&self) -> Booking {
            self.engine.create(&self.customer, self.request(2.0)).await.unwrap()
        }

        pub async fn completed(&self, worker: &Actor) -> Booking {
            let booking_id = self.pending().await.id.unwrap();
            self.engine.accept(worker, booking_id).await.unwrap();
            self.engine.start(worker, booking_id).await.unwrap();
            self.engine.complete(worker, booking_id).await.unwrap()
        }
    }
}
