use mongodb::bson::{oid::ObjectId, DateTime};

use super::{Actor, BookingEngine, EngineError, EngineResult};
use crate::models::{Booking, BookingStatus, Transition, UserRole};
use crate::store::BookingFilter;

/// Booking request after the route layer has parsed identifiers and timestamps.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub service_id: ObjectId,
    pub scheduled_at: DateTime,
    pub duration_hours: f64,
    pub address: String,
    pub notes: Option<String>,
}

fn booking_not_found() -> EngineError {
    EngineError::NotFound("Booking not found".to_string())
}

impl BookingEngine {
    pub async fn create(&self, actor: &Actor, request: NewBooking) -> EngineResult<Booking> {
        let now = DateTime::now();
        if request.scheduled_at <= now {
            return Err(EngineError::Validation(
                "Booking must be scheduled in the future".to_string(),
            ));
        }
        if !request.duration_hours.is_finite() || request.duration_hours < 1.0 {
            return Err(EngineError::Validation(
                "Duration must be at least one hour".to_string(),
            ));
        }
        if request.address.trim().is_empty() {
            return Err(EngineError::Validation("Address is required".to_string()));
        }

        let service = self
            .store
            .find_service(request.service_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| EngineError::Validation("Service is not available".to_string()))?;

        if !service.accepts_duration(request.duration_hours) {
            return Err(EngineError::Validation(format!(
                "Duration must be between {} and {} minutes for this service",
                service.min_duration, service.max_duration
            )));
        }

        let booking = Booking::new(
            actor.user_id,
            &service,
            request.scheduled_at,
            request.duration_hours,
            request.address.trim().to_string(),
            request.notes,
        )
        .ok_or_else(|| EngineError::Validation("Service is not available".to_string()))?;

        self.store.insert_booking(&booking).await?;

        log::info!(
            "Booking {:?} created by {} for service {} (total {:.2})",
            booking.id,
            actor.user_id,
            booking.service_id,
            booking.total_price()
        );
        Ok(booking)
    }

    pub async fn accept(&self, actor: &Actor, booking_id: ObjectId) -> EngineResult<Booking> {
        let worker = self.resolve_worker(actor).await?;
        let worker_id = Self::worker_id(&worker)?;

        let booking = self.store.find_booking(booking_id).await?.ok_or_else(booking_not_found)?;
        self.transition(booking, Transition::Accept { worker_id }).await
    }

    pub async fn start(&self, actor: &Actor, booking_id: ObjectId) -> EngineResult<Booking> {
        let booking = self.assigned_booking(actor, booking_id).await?;
        self.transition(booking, Transition::Start).await
    }

    pub async fn complete(&self, actor: &Actor, booking_id: ObjectId) -> EngineResult<Booking> {
        let worker = self.resolve_worker(actor).await?;
        let worker_id = Self::worker_id(&worker)?;

        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .filter(|b| b.is_assigned_to(&worker_id))
            .ok_or_else(booking_not_found)?;

        let expected = booking.status();
        let next = booking.apply(Transition::Complete, DateTime::now()).map_err(|e| {
            log::debug!("Rejected complete on booking {}: {}", booking_id, e);
            EngineError::from(e)
        })?;

        if !self.store.complete_booking(&next, expected, worker_id).await? {
            return Err(Self::lost_race(booking_id, "complete"));
        }

        log::info!("Booking {} completed by worker {}", booking_id, worker_id);
        Ok(next)
    }

    pub async fn cancel(&self, actor: &Actor, booking_id: ObjectId, reason: String) -> EngineResult<Booking> {
        let booking = self.store.find_booking(booking_id).await?.ok_or_else(booking_not_found)?;

        if booking.customer_id != actor.user_id && !self.is_assigned_worker(actor, &booking).await? {
            log::debug!("User {} may not cancel booking {}", actor.user_id, booking_id);
            return Err(EngineError::Authorization(
                "Only the customer or the assigned worker can cancel this booking".to_string(),
            ));
        }

        self.transition(booking, Transition::Cancel { reason }).await
    }

    /// A booking visible to the actor: its customer, its assigned worker, or an admin.
    pub async fn get(&self, actor: &Actor, booking_id: ObjectId) -> EngineResult<Booking> {
        let booking = self.store.find_booking(booking_id).await?.ok_or_else(booking_not_found)?;

        let visible = match actor.role {
            UserRole::Admin => true,
            UserRole::Customer | UserRole::Worker => {
                booking.customer_id == actor.user_id || self.is_assigned_worker(actor, &booking).await?
            }
        };

        if visible { Ok(booking) } else { Err(booking_not_found()) }
    }

    /// Newest first. Customers see what they booked, workers what they were
    /// assigned, admins everything.
    pub async fn list(&self, actor: &Actor, status: Option<BookingStatus>) -> EngineResult<Vec<Booking>> {
        let filter = match actor.role {
            UserRole::Customer => BookingFilter {
                customer_id: Some(actor.user_id),
                status,
                ..Default::default()
            },
            UserRole::Worker => {
                let worker = self.resolve_worker(actor).await?;
                BookingFilter {
                    worker_id: Some(Self::worker_id(&worker)?),
                    status,
                    ..Default::default()
                }
            }
            UserRole::Admin => BookingFilter {
                status,
                ..Default::default()
            },
        };

        Ok(self.store.list_bookings(&filter).await?)
    }

    /// Unassigned pending bookings, earliest scheduled first.
    pub async fn pending_queue(&self, actor: &Actor) -> EngineResult<Vec<Booking>> {
        self.resolve_worker(actor).await?;
        Ok(self.store.list_pending_bookings().await?)
    }

    async fn assigned_booking(&self, actor: &Actor, booking_id: ObjectId) -> EngineResult<Booking> {
        let worker = self.resolve_worker(actor).await?;
        let worker_id = Self::worker_id(&worker)?;

        self.store
            .find_booking(booking_id)
            .await?
            .filter(|b| b.is_assigned_to(&worker_id))
            .ok_or_else(booking_not_found)
    }

    /// Whether the actor has a worker profile assigned to `booking`. A missing
    /// profile just means "no".
    async fn is_assigned_worker(&self, actor: &Actor, booking: &Booking) -> EngineResult<bool> {
        let assigned = self
            .store
            .find_worker_by_user(actor.user_id)
            .await?
            .and_then(|w| w.id)
            .is_some_and(|worker_id| booking.is_assigned_to(&worker_id));
        Ok(assigned)
    }

    async fn transition(&self, booking: Booking, transition: Transition) -> EngineResult<Booking> {
        let booking_id = booking.id.ok_or_else(booking_not_found)?;
        let action = transition.name();
        let expected = booking.status();

        let next = booking.apply(transition, DateTime::now()).map_err(|e| {
            log::debug!("Rejected {} on booking {}: {}", action, booking_id, e);
            EngineError::from(e)
        })?;

        if !self.store.compare_and_swap_booking(&next, expected).await? {
            return Err(Self::lost_race(booking_id, action));
        }

        log::info!("Booking {} {} -> {}", booking_id, expected, next.status());
        Ok(next)
    }

    fn lost_race(booking_id: ObjectId, action: &str) -> EngineError {
        log::debug!("Concurrent update won over {} on booking {}", action, booking_id);
        EngineError::State(format!("Booking {} was modified concurrently, cannot {}", booking_id, action))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::testing::Fixture;
    use crate::models::{Service, UserRole};
    use crate::store::{MemoryStore, Store};

    #[tokio::test]
    async fn create_freezes_price() {
        let fx = Fixture::new().await;
        let booking = fx.pending().await;

        assert_eq!(booking.total_price(), 40.0);
        assert_eq!(booking.status(), BookingStatus::Pending);
        assert!(booking.worker_id().is_none());

        let mut repriced = fx.service.clone();
        repriced.base_price = 100.0;
        repriced.price_per_hour = 50.0;
        fx.store.insert_service(&repriced).await.unwrap();

        let stored = fx.engine.get(&fx.customer, booking.id.unwrap()).await.unwrap();
        assert_eq!(stored.total_price(), 40.0);
    }

    #[tokio::test]
    async fn create_validates_request() {
        let fx = Fixture::new().await;

        let mut past = fx.request(2.0);
        past.scheduled_at = DateTime::from_millis(DateTime::now().timestamp_millis() - 1000);
        assert!(matches!(
            fx.engine.create(&fx.customer, past).await,
            Err(EngineError::Validation(_))
        ));

        for hours in [0.5, 9.0, f64::NAN] {
            assert!(matches!(
                fx.engine.create(&fx.customer, fx.request(hours)).await,
                Err(EngineError::Validation(_))
            ));
        }

        let mut blank = fx.request(2.0);
        blank.address = "   ".to_string();
        assert!(matches!(
            fx.engine.create(&fx.customer, blank).await,
            Err(EngineError::Validation(_))
        ));

        let mut unknown = fx.request(2.0);
        unknown.service_id = ObjectId::new();
        assert!(matches!(
            fx.engine.create(&fx.customer, unknown).await,
            Err(EngineError::Validation(_))
        ));

        let mut inactive = Service::new(fx.service.category_id, "Retired".to_string(), 1.0, 1.0);
        inactive.is_active = false;
        fx.store.insert_service(&inactive).await.unwrap();
        let mut retired = fx.request(2.0);
        retired.service_id = inactive.id.unwrap();
        assert!(matches!(
            fx.engine.create(&fx.customer, retired).await,
            Err(EngineError::Validation(_))
        ));

        let filter = BookingFilter::default();
        assert!(fx.store.list_bookings(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_lifecycle_counts_the_job() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;
        let booking_id = fx.pending().await.id.unwrap();

        let confirmed = fx.engine.accept(&worker, booking_id).await.unwrap();
        assert_eq!(confirmed.status(), BookingStatus::Confirmed);
        assert!(confirmed.is_assigned_to(&profile_id));

        let started = fx.engine.start(&worker, booking_id).await.unwrap();
        assert_eq!(started.status(), BookingStatus::InProgress);
        assert!(started.started_at().is_some());

        let completed = fx.engine.complete(&worker, booking_id).await.unwrap();
        assert_eq!(completed.status(), BookingStatus::Completed);
        assert!(completed.completed_at().is_some());
        assert_eq!(completed.total_price(), 40.0);

        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.total_jobs, 1);
    }

    #[tokio::test]
    async fn steps_out_of_order_are_state_errors() {
        let fx = Fixture::new().await;
        let (worker, _) = fx.worker().await;
        let booking_id = fx.pending().await.id.unwrap();

        // Not yet assigned, so the worker cannot see it.
        assert!(matches!(
            fx.engine.start(&worker, booking_id).await,
            Err(EngineError::NotFound(_))
        ));

        fx.engine.accept(&worker, booking_id).await.unwrap();
        assert!(matches!(
            fx.engine.complete(&worker, booking_id).await,
            Err(EngineError::State(_))
        ));
        assert!(matches!(
            fx.engine.accept(&worker, booking_id).await,
            Err(EngineError::State(_))
        ));
    }

    #[tokio::test]
    async fn other_workers_cannot_drive_the_booking() {
        let fx = Fixture::new().await;
        let (worker, _) = fx.worker().await;
        let (intruder, _) = fx.worker().await;
        let booking_id = fx.pending().await.id.unwrap();
        fx.engine.accept(&worker, booking_id).await.unwrap();

        assert!(matches!(
            fx.engine.start(&intruder, booking_id).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            fx.engine.cancel(&intruder, booking_id, String::new()).await,
            Err(EngineError::Authorization(_))
        ));
        assert!(matches!(
            fx.engine.get(&intruder, booking_id).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn worker_actions_need_a_profile() {
        let fx = Fixture::new().await;
        let booking_id = fx.pending().await.id.unwrap();
        let bare = Fixture::register(&fx.store, UserRole::Worker).await;

        assert!(matches!(
            fx.engine.accept(&bare, booking_id).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            fx.engine.pending_queue(&bare).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(fx.engine.list(&bare, None).await, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn cancelled_booking_is_terminal() {
        let fx = Fixture::new().await;
        let (worker, _) = fx.worker().await;
        let booking_id = fx.pending().await.id.unwrap();

        let cancelled = fx
            .engine
            .cancel(&fx.customer, booking_id, "changed plans".to_string())
            .await
            .unwrap();
        assert_eq!(cancelled.status(), BookingStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason(), Some("changed plans"));
        assert!(cancelled.cancelled_at().is_some());
        assert!(cancelled.worker_id().is_none());

        assert!(matches!(
            fx.engine.accept(&worker, booking_id).await,
            Err(EngineError::State(_))
        ));
        assert!(matches!(
            fx.engine.cancel(&fx.customer, booking_id, String::new()).await,
            Err(EngineError::State(_))
        ));
    }

    #[tokio::test]
    async fn worker_cannot_resume_a_cancelled_booking() {
        let fx = Fixture::new().await;
        let (worker, worker_id) = fx.worker().await;
        let booking_id = fx.pending().await.id.unwrap();
        fx.engine.accept(&worker, booking_id).await.unwrap();

        let cancelled = fx.engine.cancel(&fx.customer, booking_id, String::new()).await.unwrap();
        assert_eq!(cancelled.status(), BookingStatus::Cancelled);
        assert_eq!(cancelled.worker_id(), Some(worker_id));

        assert!(matches!(
            fx.engine.start(&worker, booking_id).await,
            Err(EngineError::State(_))
        ));
        assert!(matches!(
            fx.engine.complete(&worker, booking_id).await,
            Err(EngineError::State(_))
        ));

        let stored = fx.store.find_booking(booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Cancelled);
        let profile = fx.store.find_worker(worker_id).await.unwrap().unwrap();
        assert_eq!(profile.total_jobs, 0);
    }

    #[tokio::test]
    async fn assigned_worker_may_cancel() {
        let fx = Fixture::new().await;
        let (worker, _) = fx.worker().await;
        let booking_id = fx.pending().await.id.unwrap();
        fx.engine.accept(&worker, booking_id).await.unwrap();
        fx.engine.start(&worker, booking_id).await.unwrap();

        let cancelled = fx.engine.cancel(&worker, booking_id, String::new()).await.unwrap();
        assert_eq!(cancelled.status(), BookingStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason(), Some(""));
    }

    #[tokio::test]
    async fn completed_booking_cannot_be_cancelled() {
        let fx = Fixture::new().await;
        let (worker, _) = fx.worker().await;
        let booking = fx.completed(&worker).await;

        assert!(matches!(
            fx.engine.cancel(&fx.customer, booking.id.unwrap(), String::new()).await,
            Err(EngineError::State(_))
        ));
    }

    #[tokio::test]
    async fn listing_is_scoped_by_role() {
        let fx = Fixture::new().await;
        let (worker, _) = fx.worker().await;
        let other = Fixture::register(&fx.store, UserRole::Customer).await;
        let admin = Fixture::register(&fx.store, UserRole::Admin).await;

        let first = fx.pending().await;
        let second = fx.pending().await;
        fx.engine.create(&other, fx.request(1.0)).await.unwrap();
        fx.engine.accept(&worker, first.id.unwrap()).await.unwrap();

        let mine = fx.engine.list(&fx.customer, None).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, second.id);

        let pending = fx.engine.list(&fx.customer, Some(BookingStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);

        let assigned = fx.engine.list(&worker, None).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, first.id);

        assert_eq!(fx.engine.list(&admin, None).await.unwrap().len(), 3);
        assert!(fx.engine.get(&admin, first.id.unwrap()).await.is_ok());
        assert!(matches!(
            fx.engine.get(&other, first.id.unwrap()).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn pending_queue_orders_by_schedule() {
        let fx = Fixture::new().await;
        let (worker, _) = fx.worker().await;

        let mut later = fx.request(2.0);
        later.scheduled_at = DateTime::from_millis(DateTime::now().timestamp_millis() + 3 * 86_400_000);
        let later = fx.engine.create(&fx.customer, later).await.unwrap();
        let sooner = fx.pending().await;
        let taken = fx.pending().await;
        fx.engine.accept(&worker, taken.id.unwrap()).await.unwrap();

        let queue = fx.engine.pending_queue(&worker).await.unwrap();
        let ids: Vec<_> = queue.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_have_one_winner() {
        let fx = Fixture::new().await;
        let booking_id = fx.pending().await.id.unwrap();

        let mut workers = Vec::new();
        for _ in 0..8 {
            workers.push(fx.worker().await);
        }

        let handles: Vec<_> = workers
            .iter()
            .map(|(actor, _)| {
                let engine = fx.engine.clone();
                let actor = *actor;
                tokio::spawn(async move { engine.accept(&actor, booking_id).await })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(booking) => winners.push(booking),
                Err(err) => assert!(matches!(err, EngineError::State(_))),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = fx.store.find_booking(booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Confirmed);
        assert_eq!(stored.worker_id(), winners[0].worker_id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completes_all_count() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;

        let mut booking_ids = Vec::new();
        for _ in 0..10 {
            let id = fx.pending().await.id.unwrap();
            fx.engine.accept(&worker, id).await.unwrap();
            fx.engine.start(&worker, id).await.unwrap();
            booking_ids.push(id);
        }

        let handles: Vec<_> = booking_ids
            .into_iter()
            .map(|id| {
                let engine = fx.engine.clone();
                tokio::spawn(async move { engine.complete(&worker, id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.total_jobs, 10);
    }

    #[tokio::test]
    async fn storage_failure_leaves_no_trace() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;
        let booking_id = fx.pending().await.id.unwrap();
        fx.engine.accept(&worker, booking_id).await.unwrap();
        fx.engine.start(&worker, booking_id).await.unwrap();

        fx.store.set_failing(true);
        assert!(matches!(
            fx.engine.complete(&worker, booking_id).await,
            Err(EngineError::Persistence(_))
        ));
        assert!(matches!(
            fx.engine.create(&fx.customer, fx.request(2.0)).await,
            Err(EngineError::Persistence(_))
        ));
        fx.store.set_failing(false);

        let stored = fx.store.find_booking(booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::InProgress);
        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.total_jobs, 0);
        assert_eq!(fx.engine.list(&fx.customer, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn engine_works_through_trait_object() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let engine = BookingEngine::new(store);
        let actor = Actor::new(ObjectId::new(), UserRole::Customer);
        assert!(engine.list(&actor, None).await.unwrap().is_empty());
    }
}
