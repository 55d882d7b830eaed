use mongodb::bson::{oid::ObjectId, DateTime};

use super::{Actor, BookingEngine, EngineError, EngineResult};
use crate::models::{BookingStatus, Review, MAX_RATING, MIN_RATING};

impl BookingEngine {
    /// Records the customer's review of a completed booking and folds the rating
    /// into the assigned worker's average in the same atomic write.
    pub async fn submit_review(
        &self,
        actor: &Actor,
        booking_id: ObjectId,
        rating: i32,
        comment: Option<String>,
    ) -> EngineResult<Review> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(EngineError::Validation(format!(
                "Rating must be between {} and {}",
                MIN_RATING, MAX_RATING
            )));
        }

        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .filter(|b| b.customer_id == actor.user_id)
            .ok_or_else(|| EngineError::NotFound("Booking not found".to_string()))?;

        if booking.status() != BookingStatus::Completed {
            return Err(EngineError::State(format!(
                "Cannot review a booking that is {}",
                booking.status()
            )));
        }

        if self.store.find_review_by_booking(booking_id).await?.is_some() {
            return Err(EngineError::Conflict("Booking already reviewed".to_string()));
        }

        let now = DateTime::now();
        let review = Review {
            id: Some(ObjectId::new()),
            booking_id,
            customer_id: actor.user_id,
            worker_id: booking.worker_id(),
            rating,
            comment: comment.filter(|c| !c.trim().is_empty()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        // The unique booking index turns a concurrent duplicate into Conflict here.
        self.store.insert_review_and_aggregate(&review).await?;

        log::info!(
            "Review for booking {} recorded (rating {}, worker {:?})",
            booking_id,
            rating,
            review.worker_id
        );
        Ok(review)
    }

    /// Reviews left on bookings assigned to `worker_id`, newest first.
    pub async fn worker_reviews(&self, worker_id: ObjectId) -> EngineResult<Vec<Review>> {
        self.store
            .find_worker(worker_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Worker not found".to_string()))?;

        Ok(self.store.list_reviews_for_worker(worker_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use crate::store::Store;

    #[tokio::test]
    async fn review_updates_worker_rating() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;
        let booking = fx.completed(&worker).await;

        let review = fx
            .engine
            .submit_review(&fx.customer, booking.id.unwrap(), 5, Some("Spotless".to_string()))
            .await
            .unwrap();
        assert_eq!(review.worker_id, Some(profile_id));

        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.rating, 5.0);
        assert_eq!(profile.total_reviews, 1);
        assert_eq!(profile.total_jobs, 1);

        let listed = fx.engine.worker_reviews(profile_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].comment.as_deref(), Some("Spotless"));
    }

    #[tokio::test]
    async fn second_review_conflicts() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;
        let booking_id = fx.completed(&worker).await.id.unwrap();

        fx.engine.submit_review(&fx.customer, booking_id, 4, None).await.unwrap();
        assert!(matches!(
            fx.engine.submit_review(&fx.customer, booking_id, 1, None).await,
            Err(EngineError::Conflict(_))
        ));

        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.rating, 4.0);
        assert_eq!(profile.total_reviews, 1);
    }

    #[tokio::test]
    async fn review_preconditions() {
        let fx = Fixture::new().await;
        let (worker, _) = fx.worker().await;
        let pending = fx.pending().await.id.unwrap();
        let done = fx.completed(&worker).await.id.unwrap();

        assert!(matches!(
            fx.engine.submit_review(&fx.customer, done, 6, None).await,
            Err(EngineError::Validation(_))
        ));
        // Rating is checked before the booking is looked up.
        assert!(matches!(
            fx.engine.submit_review(&fx.customer, ObjectId::new(), 0, None).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            fx.engine.submit_review(&fx.customer, ObjectId::new(), 3, None).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            fx.engine.submit_review(&fx.customer, pending, 3, None).await,
            Err(EngineError::State(_))
        ));
        assert!(matches!(
            fx.engine.submit_review(&worker, done, 3, None).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ratings_average_out() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;

        for rating in [5, 3, 4] {
            let booking_id = fx.completed(&worker).await.id.unwrap();
            fx.engine.submit_review(&fx.customer, booking_id, rating, None).await.unwrap();
        }

        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.rating, 4.0);
        assert_eq!(profile.total_reviews, 3);
        assert_eq!(profile.total_jobs, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reviews_average_out() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;

        let mut booking_ids = Vec::new();
        for _ in 0..3 {
            booking_ids.push(fx.completed(&worker).await.id.unwrap());
        }

        let handles: Vec<_> = booking_ids
            .into_iter()
            .zip([5, 3, 4])
            .map(|(booking_id, rating)| {
                let engine = fx.engine.clone();
                let customer = fx.customer;
                tokio::spawn(async move { engine.submit_review(&customer, booking_id, rating, None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert!((profile.rating - 4.0).abs() < 1e-9);
        assert_eq!(profile.total_reviews, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_reviews_on_one_booking_admit_one() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;
        let booking_id = fx.completed(&worker).await.id.unwrap();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let engine = fx.engine.clone();
                let customer = fx.customer;
                tokio::spawn(async move { engine.submit_review(&customer, booking_id, 5, None).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert!(matches!(err, EngineError::Conflict(_))),
            }
        }

        assert_eq!(accepted, 1);
        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.total_reviews, 1);
    }

    #[tokio::test]
    async fn unknown_worker_has_no_reviews() {
        let fx = Fixture::new().await;
        assert!(matches!(
            fx.engine.worker_reviews(ObjectId::new()).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_review_write_changes_nothing() {
        let fx = Fixture::new().await;
        let (worker, profile_id) = fx.worker().await;
        let booking_id = fx.completed(&worker).await.id.unwrap();

        fx.store.set_failing(true);
        assert!(matches!(
            fx.engine.submit_review(&fx.customer, booking_id, 5, None).await,
            Err(EngineError::Persistence(_))
        ));
        fx.store.set_failing(false);

        assert!(fx.store.find_review_by_booking(booking_id).await.unwrap().is_none());
        let profile = fx.store.find_worker(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.total_reviews, 0);
    }
}
