//! In-memory store.
//!
//! All tables sit behind a single async mutex and every trait method runs under
//! it, so each call is one atomic unit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use mongodb::bson::{oid::ObjectId, DateTime};
use tokio::sync::Mutex;

use super::{BookingFilter, Store, StoreError, StoreResult, WorkerFilter};
use crate::engine::running_average;
use crate::models::{
    Booking, BookingStatus, Review, Service, ServiceCategory, UpdateProfileDto,
    UpdateWorkerProfileDto, User, WorkerProfile,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<ObjectId, User>,
    workers: HashMap<ObjectId, WorkerProfile>,
    categories: HashMap<ObjectId, ServiceCategory>,
    services: HashMap<ObjectId, Service>,
    bookings: HashMap<ObjectId, Booking>,
    reviews: HashMap<ObjectId, Review>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write fails with `Unavailable` before touching any table.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is failing writes".to_string()));
        }
        Ok(())
    }
}

fn require_id(id: Option<ObjectId>, entity: &str) -> StoreResult<ObjectId> {
    id.ok_or_else(|| StoreError::Missing(format!("{} id", entity)))
}

fn check_user_unique(tables: &Tables, user: &User) -> StoreResult<()> {
    if tables.users.values().any(|u| u.email == user.email) {
        return Err(StoreError::Conflict("Email already registered".to_string()));
    }
    if tables.users.values().any(|u| u.phone == user.phone) {
        return Err(StoreError::Conflict("Phone number already registered".to_string()));
    }
    Ok(())
}

fn check_worker_unique(tables: &Tables, worker: &WorkerProfile) -> StoreResult<()> {
    if tables.workers.values().any(|w| w.user_id == worker.user_id) {
        return Err(StoreError::Conflict("Worker profile already exists".to_string()));
    }
    Ok(())
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.check_writable()?;
        let id = require_id(user.id, "user")?;
        let mut tables = self.tables.lock().await;

        check_user_unique(&tables, user)?;
        tables.users.insert(id, user.clone());
        Ok(())
    }

    async fn insert_worker_user(&self, user: &User, worker: &WorkerProfile) -> StoreResult<()> {
        self.check_writable()?;
        let user_id = require_id(user.id, "user")?;
        let worker_id = require_id(worker.id, "worker")?;
        let mut tables = self.tables.lock().await;

        // All checks run before either insert.
        check_user_unique(&tables, user)?;
        check_worker_unique(&tables, worker)?;

        tables.users.insert(user_id, user.clone());
        tables.workers.insert(worker_id, worker.clone());
        Ok(())
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).filter(|u| u.deleted_at.is_none()).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email == email && u.deleted_at.is_none())
            .cloned())
    }

    async fn update_user_profile(&self, id: ObjectId, changes: &UpdateProfileDto) -> StoreResult<Option<User>> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        if let Some(phone) = &changes.phone {
            if tables.users.values().any(|u| &u.phone == phone && u.id != Some(id)) {
                return Err(StoreError::Conflict("Phone number already registered".to_string()));
            }
        }

        let Some(user) = tables.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            user.name = name.clone();
        }
        if let Some(phone) = &changes.phone {
            user.phone = phone.clone();
        }
        if let Some(address) = &changes.address {
            user.address = Some(address.clone());
        }
        if let Some(avatar) = &changes.avatar {
            user.avatar = Some(avatar.clone());
        }
        user.updated_at = DateTime::now();
        Ok(Some(user.clone()))
    }

    async fn update_user_password(&self, id: ObjectId, password_hash: &str) -> StoreResult<bool> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = DateTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_user(&self, id: ObjectId) -> StoreResult<bool> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) {
            Some(user) => {
                let now = DateTime::now();
                user.is_active = false;
                user.deleted_at = Some(now);
                user.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_worker(&self, worker: &WorkerProfile) -> StoreResult<()> {
        self.check_writable()?;
        let id = require_id(worker.id, "worker")?;
        let mut tables = self.tables.lock().await;

        check_worker_unique(&tables, worker)?;
        tables.workers.insert(id, worker.clone());
        Ok(())
    }

    async fn find_worker(&self, id: ObjectId) -> StoreResult<Option<WorkerProfile>> {
        let tables = self.tables.lock().await;
        Ok(tables.workers.get(&id).filter(|w| w.deleted_at.is_none()).cloned())
    }

    async fn find_worker_by_user(&self, user_id: ObjectId) -> StoreResult<Option<WorkerProfile>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .workers
            .values()
            .find(|w| w.user_id == user_id && w.deleted_at.is_none())
            .cloned())
    }

    async fn update_worker_profile(
        &self,
        id: ObjectId,
        changes: &UpdateWorkerProfileDto,
    ) -> StoreResult<Option<WorkerProfile>> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        let Some(worker) = tables.workers.get_mut(&id).filter(|w| w.deleted_at.is_none()) else {
            return Ok(None);
        };
        if let Some(bio) = &changes.bio {
            worker.bio = Some(bio.clone());
        }
        if let Some(rate) = changes.hourly_rate {
            worker.hourly_rate = rate;
        }
        if let Some(areas) = &changes.service_areas {
            worker.service_areas = areas.clone();
        }
        if let Some(hours) = &changes.working_hours {
            worker.working_hours = Some(hours.clone());
        }
        if let Some(available) = changes.is_available {
            worker.is_available = available;
        }
        worker.updated_at = DateTime::now();
        Ok(Some(worker.clone()))
    }

    async fn list_workers(&self, filter: WorkerFilter) -> StoreResult<Vec<WorkerProfile>> {
        let tables = self.tables.lock().await;
        let mut workers: Vec<WorkerProfile> = tables
            .workers
            .values()
            .filter(|w| w.deleted_at.is_none() && w.is_available)
            .filter(|w| !filter.verified_only || w.is_verified)
            .cloned()
            .collect();

        workers.sort_by(|a, b| b.rating.total_cmp(&a.rating).then(a.id.cmp(&b.id)));
        Ok(workers)
    }

    async fn insert_category(&self, category: &ServiceCategory) -> StoreResult<()> {
        self.check_writable()?;
        let id = require_id(category.id, "category")?;
        let mut tables = self.tables.lock().await;

        if tables.categories.values().any(|c| c.name == category.name) {
            return Err(StoreError::Conflict("Category name already exists".to_string()));
        }

        tables.categories.insert(id, category.clone());
        Ok(())
    }

    async fn find_category(&self, id: ObjectId) -> StoreResult<Option<ServiceCategory>> {
        let tables = self.tables.lock().await;
        Ok(tables.categories.get(&id).filter(|c| c.deleted_at.is_none()).cloned())
    }

    async fn list_categories(&self) -> StoreResult<Vec<ServiceCategory>> {
        let tables = self.tables.lock().await;
        let mut categories: Vec<ServiceCategory> = tables
            .categories
            .values()
            .filter(|c| c.deleted_at.is_none() && c.is_active)
            .cloned()
            .collect();

        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_service(&self, service: &Service) -> StoreResult<()> {
        self.check_writable()?;
        let id = require_id(service.id, "service")?;
        let mut tables = self.tables.lock().await;
        tables.services.insert(id, service.clone());
        Ok(())
    }

    async fn find_service(&self, id: ObjectId) -> StoreResult<Option<Service>> {
        let tables = self.tables.lock().await;
        Ok(tables.services.get(&id).filter(|s| s.deleted_at.is_none()).cloned())
    }

    async fn list_services(&self, category_id: Option<ObjectId>) -> StoreResult<Vec<Service>> {
        let tables = self.tables.lock().await;
        let mut services: Vec<Service> = tables
            .services
            .values()
            .filter(|s| s.deleted_at.is_none() && s.is_active)
            .filter(|s| category_id.is_none_or(|id| s.category_id == id))
            .cloned()
            .collect();

        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.check_writable()?;
        let id = require_id(booking.id, "booking")?;
        let mut tables = self.tables.lock().await;
        tables.bookings.insert(id, booking.clone());
        Ok(())
    }

    async fn find_booking(&self, id: ObjectId) -> StoreResult<Option<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables.bookings.get(&id).filter(|b| b.deleted_at.is_none()).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.deleted_at.is_none() && filter.matches(b))
            .cloned()
            .collect();

        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn list_pending_bookings(&self) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| {
                b.deleted_at.is_none()
                    && b.status() == BookingStatus::Pending
                    && b.worker_id().is_none()
            })
            .cloned()
            .collect();

        bookings.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        Ok(bookings)
    }

    async fn compare_and_swap_booking(&self, next: &Booking, expected: BookingStatus) -> StoreResult<bool> {
        self.check_writable()?;
        let id = require_id(next.id, "booking")?;
        let mut tables = self.tables.lock().await;

        match tables.bookings.get_mut(&id) {
            Some(stored) if stored.deleted_at.is_none() && stored.status() == expected => {
                stored.adopt_lifecycle(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_booking(
        &self,
        next: &Booking,
        expected: BookingStatus,
        worker_id: ObjectId,
    ) -> StoreResult<bool> {
        self.check_writable()?;
        let id = require_id(next.id, "booking")?;
        let mut tables = self.tables.lock().await;

        if !tables.workers.get(&worker_id).is_some_and(|w| w.deleted_at.is_none()) {
            return Err(StoreError::Missing("Worker profile".to_string()));
        }

        match tables.bookings.get_mut(&id) {
            Some(stored) if stored.deleted_at.is_none() && stored.status() == expected => {
                stored.adopt_lifecycle(next);
            }
            _ => return Ok(false),
        }

        if let Some(worker) = tables.workers.get_mut(&worker_id) {
            worker.total_jobs += 1;
            worker.updated_at = DateTime::now();
        }
        Ok(true)
    }

    async fn insert_review_and_aggregate(&self, review: &Review) -> StoreResult<()> {
        self.check_writable()?;
        let id = require_id(review.id, "review")?;
        let mut tables = self.tables.lock().await;

        if tables.reviews.values().any(|r| r.booking_id == review.booking_id) {
            return Err(StoreError::Conflict("Booking already reviewed".to_string()));
        }

        if let Some(worker_id) = review.worker_id {
            let worker = tables
                .workers
                .get_mut(&worker_id)
                .filter(|w| w.deleted_at.is_none())
                .ok_or_else(|| StoreError::Missing("Worker profile".to_string()))?;

            worker.rating = running_average(worker.rating, worker.total_reviews, review.rating);
            worker.total_reviews += 1;
            worker.updated_at = DateTime::now();
        }

        tables.reviews.insert(id, review.clone());
        Ok(())
    }

    async fn find_review_by_booking(&self, booking_id: ObjectId) -> StoreResult<Option<Review>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reviews
            .values()
            .find(|r| r.booking_id == booking_id && r.deleted_at.is_none())
            .cloned())
    }

    async fn list_reviews_for_worker(&self, worker_id: ObjectId) -> StoreResult<Vec<Review>> {
        let tables = self.tables.lock().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| r.worker_id == Some(worker_id) && r.deleted_at.is_none())
            .cloned()
            .collect();

        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Transition, UserRole};

    fn user(email: &str, phone: &str) -> User {
        User::new(
            email.to_string(),
            phone.to_string(),
            "hash".to_string(),
            "Test".to_string(),
            UserRole::Customer,
        )
    }

    #[tokio::test]
    async fn duplicate_email_or_phone_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(&user("a@example.com", "0401111111")).await.unwrap();

        let err = store.insert_user(&user("A@example.com", "0402222222")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store.insert_user(&user("b@example.com", "0401111111")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn worker_registration_is_all_or_nothing() {
        let store = MemoryStore::new();
        let mut account = user("w@example.com", "0405555555");
        account.role = UserRole::Worker;
        let user_id = account.id.unwrap();

        store.set_failing(true);
        let err = store
            .insert_worker_user(&account, &WorkerProfile::new(user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        store.set_failing(false);

        assert!(store.find_user(user_id).await.unwrap().is_none());
        assert!(store.find_user_by_email("w@example.com").await.unwrap().is_none());
        assert!(store.find_worker_by_user(user_id).await.unwrap().is_none());

        // A profile clash also keeps the user row out.
        store.insert_worker(&WorkerProfile::new(user_id)).await.unwrap();
        let err = store
            .insert_worker_user(&account, &WorkerProfile::new(user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.find_user(user_id).await.unwrap().is_none());

        let fresh = MemoryStore::new();
        fresh
            .insert_worker_user(&account, &WorkerProfile::new(user_id))
            .await
            .unwrap();
        assert!(fresh.find_user(user_id).await.unwrap().is_some());
        assert!(fresh.find_worker_by_user(user_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deactivated_users_disappear_from_lookups() {
        let store = MemoryStore::new();
        let u = user("gone@example.com", "0403333333");
        let id = u.id.unwrap();
        store.insert_user(&u).await.unwrap();

        assert!(store.deactivate_user(id).await.unwrap());
        assert!(store.find_user(id).await.unwrap().is_none());
        assert!(store.find_user_by_email("gone@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn compare_and_swap_requires_expected_status() {
        let store = MemoryStore::new();
        let service = Service::new(ObjectId::new(), "Plumbing".to_string(), 20.0, 10.0);
        let booking = Booking::new(
            ObjectId::new(),
            &service,
            DateTime::now(),
            1.0,
            "1 Main St".to_string(),
            None,
        )
        .unwrap();
        store.insert_booking(&booking).await.unwrap();

        let accepted = booking
            .apply(Transition::Accept { worker_id: ObjectId::new() }, DateTime::now())
            .unwrap();

        assert!(!store
            .compare_and_swap_booking(&accepted, BookingStatus::Confirmed)
            .await
            .unwrap());
        assert!(store
            .compare_and_swap_booking(&accepted, BookingStatus::Pending)
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap_booking(&accepted, BookingStatus::Pending)
            .await
            .unwrap());

        let stored = store.find_booking(booking.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Confirmed);
        assert_eq!(stored.worker_id(), accepted.worker_id());
    }

    #[tokio::test]
    async fn failing_store_rejects_writes_without_side_effects() {
        let store = MemoryStore::new();
        store.set_failing(true);

        let err = store.insert_user(&user("x@example.com", "0404444444")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_failing(false);
        assert!(store.find_user_by_email("x@example.com").await.unwrap().is_none());
    }
}
