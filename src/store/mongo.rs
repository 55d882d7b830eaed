use std::time::Duration;

use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;

use super::{BookingFilter, Store, StoreError, StoreResult, WorkerFilter};
use crate::models::{
    Booking, BookingStatus, Review, Service, ServiceCategory, UpdateProfileDto,
    UpdateWorkerProfileDto, User, WorkerProfile,
};

const USERS: &str = "users";
const WORKERS: &str = "worker_profiles";
const CATEGORIES: &str = "service_categories";
const SERVICES: &str = "services";
const BOOKINGS: &str = "bookings";
const REVIEWS: &str = "reviews";

const MAX_TRANSACTION_ATTEMPTS: usize = 5;
const DUPLICATE_KEY: i32 = 11000;

/// Result of the body of a multi-document transaction.
enum TxOutcome {
    Applied,
    /// The guarded write matched nothing; abort and report `false`.
    Rejected,
    WorkerMissing,
}

pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("marketplace-server".to_string());
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);

        let client = Client::with_options(options)?;

        // Test connection
        client
            .database("admin")
            .run_command(doc! {"ping": 1}, None)
            .await?;

        let store = MongoStore {
            db: client.database(database),
            client,
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        self.users().create_index(unique(doc! { "email": 1 }), None).await?;
        self.users().create_index(unique(doc! { "phone": 1 }), None).await?;
        self.workers().create_index(unique(doc! { "user_id": 1 }), None).await?;
        self.categories().create_index(unique(doc! { "name": 1 }), None).await?;
        self.reviews().create_index(unique(doc! { "booking_id": 1 }), None).await?;
        self.bookings()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "status": 1, "scheduled_at": 1 })
                    .build(),
                None,
            )
            .await?;

        log::info!("✓ MongoDB indexes ensured");
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn workers(&self) -> Collection<WorkerProfile> {
        self.db.collection(WORKERS)
    }

    fn categories(&self) -> Collection<ServiceCategory> {
        self.db.collection(CATEGORIES)
    }

    fn services(&self) -> Collection<Service> {
        self.db.collection(SERVICES)
    }

    fn bookings(&self) -> Collection<Booking> {
        self.db.collection(BOOKINGS)
    }

    fn reviews(&self) -> Collection<Review> {
        self.db.collection(REVIEWS)
    }

    async fn find_many<T>(&self, collection: Collection<T>, filter: Document, sort: Document) -> StoreResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned + Unpin + Send + Sync,
    {
        let options = FindOptions::builder().sort(sort).build();
        let rows = collection.find(filter, options).await?.try_collect().await?;
        Ok(rows)
    }

    async fn complete_in_session(
        &self,
        session: &mut ClientSession,
        next: &Booking,
        booking_id: ObjectId,
        expected: BookingStatus,
        worker_id: ObjectId,
    ) -> mongodb::error::Result<TxOutcome> {
        let moved = self
            .bookings()
            .update_one_with_session(
                booking_guard(booking_id, expected),
                doc! { "$set": next.lifecycle_document() },
                None,
                session,
            )
            .await?;
        if moved.matched_count == 0 {
            return Ok(TxOutcome::Rejected);
        }

        let bumped = self
            .workers()
            .update_one_with_session(
                doc! { "_id": worker_id, "deleted_at": null },
                doc! {
                    "$inc": { "total_jobs": 1 },
                    "$set": { "updated_at": DateTime::now() }
                },
                None,
                session,
            )
            .await?;
        if bumped.matched_count == 0 {
            return Ok(TxOutcome::WorkerMissing);
        }

        Ok(TxOutcome::Applied)
    }

    async fn register_worker_in_session(
        &self,
        session: &mut ClientSession,
        user: &User,
        worker: &WorkerProfile,
    ) -> mongodb::error::Result<TxOutcome> {
        self.users().insert_one_with_session(user, None, session).await?;
        self.workers().insert_one_with_session(worker, None, session).await?;
        Ok(TxOutcome::Applied)
    }

    async fn review_in_session(
        &self,
        session: &mut ClientSession,
        review: &Review,
    ) -> mongodb::error::Result<TxOutcome> {
        self.reviews().insert_one_with_session(review, None, session).await?;

        let Some(worker_id) = review.worker_id else {
            return Ok(TxOutcome::Applied);
        };

        // Both expressions read the pre-update document, so this is
        // (rating * n + value) / (n + 1) and n + 1 in a single write.
        let pipeline = vec![doc! {
            "$set": {
                "rating": {
                    "$divide": [
                        { "$add": [ { "$multiply": ["$rating", "$total_reviews"] }, review.rating ] },
                        { "$add": ["$total_reviews", 1] }
                    ]
                },
                "total_reviews": { "$add": ["$total_reviews", 1] },
                "updated_at": "$$NOW"
            }
        }];

        let aggregated = self
            .workers()
            .update_one_with_session(
                doc! { "_id": worker_id, "deleted_at": null },
                pipeline,
                None,
                session,
            )
            .await?;
        if aggregated.matched_count == 0 {
            return Ok(TxOutcome::WorkerMissing);
        }

        Ok(TxOutcome::Applied)
    }
}

fn booking_guard(booking_id: ObjectId, expected: BookingStatus) -> Document {
    doc! {
        "_id": booking_id,
        "status": expected.as_str(),
        "deleted_at": null,
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn map_duplicate(err: mongodb::error::Error, message: &str) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Conflict(message.to_string())
    } else {
        StoreError::Database(err)
    }
}

async fn commit_with_retry(session: &mut ClientSession) -> mongodb::error::Result<()> {
    let mut attempt = 1;
    loop {
        match session.commit_transaction().await {
            Err(e) if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                log::warn!("Commit result unknown, retrying (attempt {})", attempt);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Drives one transaction body to completion.
///
/// `Rejected` and `WorkerMissing` abort the transaction so nothing is written.
/// Transient transaction errors (write conflicts on the same worker row, primary
/// step-downs) restart the whole body, up to `MAX_TRANSACTION_ATTEMPTS`.
macro_rules! run_transaction {
    ($self:ident, $session:ident, $body:expr, $conflict:expr) => {{
        let mut $session = $self.client.start_session(None).await?;
        let mut attempt = 1;
        loop {
            $session.start_transaction(None).await?;
            let outcome = $body.await;

            let result = match outcome {
                Ok(TxOutcome::Applied) => match commit_with_retry(&mut $session).await {
                    Ok(()) => Ok(true),
                    Err(e) => Err(e),
                },
                Ok(TxOutcome::Rejected) => {
                    $session.abort_transaction().await?;
                    Ok(false)
                }
                Ok(TxOutcome::WorkerMissing) => {
                    $session.abort_transaction().await?;
                    return Err(StoreError::Missing("Worker profile".to_string()));
                }
                Err(e) => {
                    // Best effort: the server aborts on its own when the body failed.
                    let _ = $session.abort_transaction().await;
                    Err(e)
                }
            };

            match result {
                Ok(applied) => break Ok::<bool, StoreError>(applied),
                Err(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    log::warn!("Transient transaction error, retrying (attempt {}): {}", attempt, e);
                    attempt += 1;
                }
                Err(e) => break Err(map_duplicate(e, $conflict)),
            }
        }
    }};
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.users()
            .insert_one(user, None)
            .await
            .map_err(|e| map_duplicate(e, "Email or phone number already registered"))?;
        Ok(())
    }

    async fn insert_worker_user(&self, user: &User, worker: &WorkerProfile) -> StoreResult<()> {
        run_transaction!(
            self,
            session,
            self.register_worker_in_session(&mut session, user, worker),
            "Email or phone number already registered"
        )?;
        Ok(())
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        Ok(self
            .users()
            .find_one(doc! { "_id": id, "deleted_at": null }, None)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users()
            .find_one(doc! { "email": email.to_lowercase(), "deleted_at": null }, None)
            .await?)
    }

    async fn update_user_profile(&self, id: ObjectId, changes: &UpdateProfileDto) -> StoreResult<Option<User>> {
        let mut update_doc = doc! {
            "updated_at": DateTime::now()
        };

        if let Some(ref name) = changes.name {
            update_doc.insert("name", name);
        }
        if let Some(ref phone) = changes.phone {
            update_doc.insert("phone", phone);
        }
        if let Some(ref address) = changes.address {
            update_doc.insert("address", address);
        }
        if let Some(ref avatar) = changes.avatar {
            update_doc.insert("avatar", avatar);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.users()
            .find_one_and_update(
                doc! { "_id": id, "deleted_at": null },
                doc! { "$set": update_doc },
                options,
            )
            .await
            .map_err(|e| map_duplicate(e, "Phone number already registered"))
    }

    async fn update_user_password(&self, id: ObjectId, password_hash: &str) -> StoreResult<bool> {
        let result = self
            .users()
            .update_one(
                doc! { "_id": id, "deleted_at": null },
                doc! { "$set": { "password_hash": password_hash, "updated_at": DateTime::now() } },
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn deactivate_user(&self, id: ObjectId) -> StoreResult<bool> {
        let now = DateTime::now();
        let result = self
            .users()
            .update_one(
                doc! { "_id": id, "deleted_at": null },
                doc! { "$set": { "is_active": false, "deleted_at": now, "updated_at": now } },
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn insert_worker(&self, worker: &WorkerProfile) -> StoreResult<()> {
        self.workers()
            .insert_one(worker, None)
            .await
            .map_err(|e| map_duplicate(e, "Worker profile already exists"))?;
        Ok(())
    }

    async fn find_worker(&self, id: ObjectId) -> StoreResult<Option<WorkerProfile>> {
        Ok(self
            .workers()
            .find_one(doc! { "_id": id, "deleted_at": null }, None)
            .await?)
    }

    async fn find_worker_by_user(&self, user_id: ObjectId) -> StoreResult<Option<WorkerProfile>> {
        Ok(self
            .workers()
            .find_one(doc! { "user_id": user_id, "deleted_at": null }, None)
            .await?)
    }

    async fn update_worker_profile(
        &self,
        id: ObjectId,
        changes: &UpdateWorkerProfileDto,
    ) -> StoreResult<Option<WorkerProfile>> {
        let mut update_doc = doc! {
            "updated_at": DateTime::now()
        };

        if let Some(ref bio) = changes.bio {
            update_doc.insert("bio", bio);
        }
        if let Some(rate) = changes.hourly_rate {
            update_doc.insert("hourly_rate", rate);
        }
        if let Some(ref areas) = changes.service_areas {
            update_doc.insert("service_areas", areas.clone());
        }
        if let Some(ref hours) = changes.working_hours {
            update_doc.insert("working_hours", hours);
        }
        if let Some(available) = changes.is_available {
            update_doc.insert("is_available", available);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Ok(self
            .workers()
            .find_one_and_update(
                doc! { "_id": id, "deleted_at": null },
                doc! { "$set": update_doc },
                options,
            )
            .await?)
    }

    async fn list_workers(&self, filter: WorkerFilter) -> StoreResult<Vec<WorkerProfile>> {
        let mut query = doc! { "deleted_at": null, "is_available": true };
        if filter.verified_only {
            query.insert("is_verified", true);
        }
        self.find_many(self.workers(), query, doc! { "rating": -1, "_id": 1 }).await
    }

    async fn insert_category(&self, category: &ServiceCategory) -> StoreResult<()> {
        self.categories()
            .insert_one(category, None)
            .await
            .map_err(|e| map_duplicate(e, "Category name already exists"))?;
        Ok(())
    }

    async fn find_category(&self, id: ObjectId) -> StoreResult<Option<ServiceCategory>> {
        Ok(self
            .categories()
            .find_one(doc! { "_id": id, "deleted_at": null }, None)
            .await?)
    }

    async fn list_categories(&self) -> StoreResult<Vec<ServiceCategory>> {
        self.find_many(
            self.categories(),
            doc! { "deleted_at": null, "is_active": true },
            doc! { "name": 1 },
        )
        .await
    }

    async fn insert_service(&self, service: &Service) -> StoreResult<()> {
        self.services().insert_one(service, None).await?;
        Ok(())
    }

    async fn find_service(&self, id: ObjectId) -> StoreResult<Option<Service>> {
        Ok(self
            .services()
            .find_one(doc! { "_id": id, "deleted_at": null }, None)
            .await?)
    }

    async fn list_services(&self, category_id: Option<ObjectId>) -> StoreResult<Vec<Service>> {
        let mut query = doc! { "deleted_at": null, "is_active": true };
        if let Some(category_id) = category_id {
            query.insert("category_id", category_id);
        }
        self.find_many(self.services(), query, doc! { "name": 1 }).await
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.bookings().insert_one(booking, None).await?;
        Ok(())
    }

    async fn find_booking(&self, id: ObjectId) -> StoreResult<Option<Booking>> {
        Ok(self
            .bookings()
            .find_one(doc! { "_id": id, "deleted_at": null }, None)
            .await?)
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let mut query = doc! { "deleted_at": null };
        if let Some(customer_id) = filter.customer_id {
            query.insert("customer_id", customer_id);
        }
        if let Some(worker_id) = filter.worker_id {
            query.insert("worker_id", worker_id);
        }
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }
        self.find_many(self.bookings(), query, doc! { "created_at": -1, "_id": -1 }).await
    }

    async fn list_pending_bookings(&self) -> StoreResult<Vec<Booking>> {
        self.find_many(
            self.bookings(),
            doc! {
                "deleted_at": null,
                "status": BookingStatus::Pending.as_str(),
                "worker_id": null,
            },
            doc! { "scheduled_at": 1, "_id": 1 },
        )
        .await
    }

    async fn compare_and_swap_booking(&self, next: &Booking, expected: BookingStatus) -> StoreResult<bool> {
        let booking_id = next
            .id
            .ok_or_else(|| StoreError::Missing("booking id".to_string()))?;

        let result = self
            .bookings()
            .update_one(
                booking_guard(booking_id, expected),
                doc! { "$set": next.lifecycle_document() },
                None,
            )
            .await?;

        Ok(result.matched_count == 1)
    }

    async fn complete_booking(
        &self,
        next: &Booking,
        expected: BookingStatus,
        worker_id: ObjectId,
    ) -> StoreResult<bool> {
        let booking_id = next
            .id
            .ok_or_else(|| StoreError::Missing("booking id".to_string()))?;

        run_transaction!(
            self,
            session,
            self.complete_in_session(&mut session, next, booking_id, expected, worker_id),
            "Booking already completed"
        )
    }

    async fn insert_review_and_aggregate(&self, review: &Review) -> StoreResult<()> {
        run_transaction!(
            self,
            session,
            self.review_in_session(&mut session, review),
            "Booking already reviewed"
        )?;
        Ok(())
    }

    async fn find_review_by_booking(&self, booking_id: ObjectId) -> StoreResult<Option<Review>> {
        Ok(self
            .reviews()
            .find_one(doc! { "booking_id": booking_id, "deleted_at": null }, None)
            .await?)
    }

    async fn list_reviews_for_worker(&self, worker_id: ObjectId) -> StoreResult<Vec<Review>> {
        self.find_many(
            self.reviews(),
            doc! { "worker_id": worker_id, "deleted_at": null },
            doc! { "created_at": -1, "_id": -1 },
        )
        .await
    }
}
