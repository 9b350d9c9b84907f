// ⭐ Rating Aggregator - derived rating summary on products
//
// averageRating / approvedCount are a projection of the approved reviews.
// They are never edited directly: `reconcile` recomputes them from scratch,
// so it can be re-run at any time and converges to the same value.
//
// Review mutations trigger a recomputation as a secondary, best-effort write.
// If it fails the mutation still stands and the summary stays stale until the
// next successful `reconcile` / `reconcile_all`.

use crate::entities::{ModerationAction, NewReview, RatingSummary, Review, ReviewStatus};
use crate::error::{EngineError, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Store operations for reviews and the summary projection
pub trait ReviewStore {
    fn product_exists(&self, product_id: &str) -> Result<bool>;

    fn product_ids(&self) -> Result<Vec<String>>;

    fn insert_review(&mut self, review: &Review) -> Result<()>;

    fn get_review(&self, id: &str) -> Result<Option<Review>>;

    fn set_review_status(&mut self, id: &str, status: ReviewStatus) -> Result<()>;

    fn delete_review(&mut self, id: &str) -> Result<()>;

    /// Ratings of reviews whose status is approved
    fn approved_ratings(&self, product_id: &str) -> Result<Vec<u8>>;

    fn write_rating_summary(&mut self, product_id: &str, summary: &RatingSummary) -> Result<()>;
}

// ============================================================================
// RECONCILIATION
// ============================================================================

/// Recompute and persist one product's summary from its approved reviews
pub fn reconcile<S>(store: &mut S, product_id: &str) -> Result<RatingSummary>
where
    S: ReviewStore + ?Sized,
{
    let ratings = store.approved_ratings(product_id)?;
    let summary = RatingSummary::from_ratings(&ratings);

    store.write_rating_summary(product_id, &summary)?;
    debug!(
        product_id,
        average = summary.average_rating,
        approved = summary.approved_count,
        "rating summary recomputed"
    );

    Ok(summary)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub products: usize,
    pub reconciled: usize,
    /// (product_id, error message)
    pub failures: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        format!(
            "Reconciled {}/{} products ({} failed)",
            self.reconciled,
            self.products,
            self.failures.len()
        )
    }
}

/// Recompute every product's summary. One product failing does not stop the
/// rest; only failing to list products is an error.
pub fn reconcile_all<S>(store: &mut S) -> Result<ReconcileReport>
where
    S: ReviewStore + ?Sized,
{
    let ids = store.product_ids()?;
    let mut report = ReconcileReport {
        products: ids.len(),
        ..Default::default()
    };

    for id in ids {
        match reconcile(&mut *store, &id) {
            Ok(_) => report.reconciled += 1,
            Err(e) => {
                warn!(product_id = %id, error = %e, "rating reconciliation failed");
                report.failures.push((id, e.to_string()));
            }
        }
    }

    info!("{}", report.summary());
    Ok(report)
}

// ============================================================================
// REVIEW MUTATIONS
// ============================================================================

/// Result of a review mutation. `summary` is `None` when the follow-up
/// recomputation failed and the product's summary is stale.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub review: Review,
    pub summary: Option<RatingSummary>,
}

/// create / moderate / delete, each followed by a best-effort `reconcile`
pub struct ReviewService<'a, S: ReviewStore + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: ReviewStore + ?Sized> ReviewService<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        ReviewService { store }
    }

    /// Submit a review; it starts out pending
    pub fn create(&mut self, submission: NewReview) -> Result<ReviewOutcome> {
        if !self.store.product_exists(&submission.product_id)? {
            return Err(EngineError::not_found("product", submission.product_id));
        }

        let review = Review::from_submission(submission)?;
        self.store.insert_review(&review)?;
        info!(review_id = %review.id, product_id = %review.product_id, "review submitted");

        let summary = self.refresh(&review.product_id);
        Ok(ReviewOutcome { review, summary })
    }

    /// Admin approve/reject
    pub fn moderate(&mut self, review_id: &str, action: ModerationAction) -> Result<ReviewOutcome> {
        let mut review = self
            .store
            .get_review(review_id)?
            .ok_or_else(|| EngineError::not_found("review", review_id))?;

        let next = review.status.apply(action);
        self.store.set_review_status(review_id, next)?;
        info!(
            review_id,
            from = review.status.as_str(),
            to = next.as_str(),
            "review moderated"
        );
        review.status = next;

        let summary = self.refresh(&review.product_id);
        Ok(ReviewOutcome { review, summary })
    }

    pub fn delete(&mut self, review_id: &str) -> Result<ReviewOutcome> {
        let review = self
            .store
            .get_review(review_id)?
            .ok_or_else(|| EngineError::not_found("review", review_id))?;

        self.store.delete_review(review_id)?;
        info!(review_id, product_id = %review.product_id, "review deleted");

        let summary = self.refresh(&review.product_id);
        Ok(ReviewOutcome { review, summary })
    }

    fn refresh(&mut self, product_id: &str) -> Option<RatingSummary> {
        match reconcile(&mut *self.store, product_id) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(product_id, error = %e, "rating summary left stale");
                None
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        products: HashMap<String, RatingSummary>,
        reviews: Vec<Review>,
        summary_writes: usize,
        fail_summary_writes: bool,
    }

    impl MemoryStore {
        fn with_products(ids: &[&str]) -> Self {
            MemoryStore {
                products: ids
                    .iter()
                    .map(|id| (id.to_string(), RatingSummary::default()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl ReviewStore for MemoryStore {
        fn product_exists(&self, product_id: &str) -> Result<bool> {
            Ok(self.products.contains_key(product_id))
        }

        fn product_ids(&self) -> Result<Vec<String>> {
            let mut ids: Vec<String> = self.products.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        }

        fn insert_review(&mut self, review: &Review) -> Result<()> {
            self.reviews.push(review.clone());
            Ok(())
        }

        fn get_review(&self, id: &str) -> Result<Option<Review>> {
            Ok(self.reviews.iter().find(|r| r.id == id).cloned())
        }

        fn set_review_status(&mut self, id: &str, status: ReviewStatus) -> Result<()> {
            let review = self
                .reviews
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| EngineError::not_found("review", id))?;
            review.status = status;
            Ok(())
        }

        fn delete_review(&mut self, id: &str) -> Result<()> {
            self.reviews.retain(|r| r.id != id);
            Ok(())
        }

        fn approved_ratings(&self, product_id: &str) -> Result<Vec<u8>> {
            Ok(self
                .reviews
                .iter()
                .filter(|r| r.product_id == product_id && r.is_approved())
                .map(|r| r.rating)
                .collect())
        }

        fn write_rating_summary(&mut self, product_id: &str, summary: &RatingSummary) -> Result<()> {
            if self.fail_summary_writes {
                return Err(EngineError::InvalidInput("summary column locked".to_string()));
            }
            self.summary_writes += 1;
            self.products.insert(product_id.to_string(), *summary);
            Ok(())
        }
    }

    fn submit(service: &mut ReviewService<'_, MemoryStore>, product: &str, rating: u8) -> Review {
        service
            .create(NewReview {
                product_id: product.to_string(),
                rating,
                title: None,
                comment: None,
                author_name: None,
            })
            .unwrap()
            .review
    }

    #[test]
    fn test_pending_reviews_do_not_count() {
        let mut store = MemoryStore::with_products(&["p1"]);
        let mut service = ReviewService::new(&mut store);

        let outcome = service
            .create(NewReview {
                product_id: "p1".to_string(),
                rating: 5,
                title: None,
                comment: None,
                author_name: None,
            })
            .unwrap();

        assert_eq!(outcome.review.status, ReviewStatus::Pending);
        assert_eq!(outcome.summary, Some(RatingSummary::default()));
    }

    #[test]
    fn test_approval_updates_summary() {
        let mut store = MemoryStore::with_products(&["p1"]);
        let mut service = ReviewService::new(&mut store);

        let r1 = submit(&mut service, "p1", 5);
        let r2 = submit(&mut service, "p1", 2);
        let _pending = submit(&mut service, "p1", 1);

        service.moderate(&r1.id, ModerationAction::Approve).unwrap();
        let outcome = service.moderate(&r2.id, ModerationAction::Approve).unwrap();

        let summary = outcome.summary.unwrap();
        assert_eq!(summary.approved_count, 2);
        assert!((summary.average_rating - 3.5).abs() < 1e-9);
        assert_eq!(store.products["p1"], summary);
    }

    #[test]
    fn test_rejecting_approved_review_removes_it() {
        let mut store = MemoryStore::with_products(&["p1"]);
        let mut service = ReviewService::new(&mut store);

        let r1 = submit(&mut service, "p1", 4);
        service.moderate(&r1.id, ModerationAction::Approve).unwrap();
        let outcome = service.moderate(&r1.id, ModerationAction::Reject).unwrap();

        assert_eq!(outcome.review.status, ReviewStatus::Rejected);
        assert_eq!(outcome.summary, Some(RatingSummary::default()));
    }

    #[test]
    fn test_deleting_only_approved_review_zeroes_summary() {
        let mut store = MemoryStore::with_products(&["p1"]);
        let mut service = ReviewService::new(&mut store);

        let r1 = submit(&mut service, "p1", 3);
        let approved = service.moderate(&r1.id, ModerationAction::Approve).unwrap();
        assert_eq!(approved.summary.unwrap().approved_count, 1);

        let outcome = service.delete(&r1.id).unwrap();
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.approved_count, 0);
        assert_eq!(summary.average_rating, 0.0);
    }

    #[test]
    fn test_average_stays_in_rating_bounds() {
        let mut store = MemoryStore::with_products(&["p1"]);
        let mut service = ReviewService::new(&mut store);

        for rating in [1u8, 5, 5, 2, 4, 1, 3] {
            let review = submit(&mut service, "p1", rating);
            let outcome = service.moderate(&review.id, ModerationAction::Approve).unwrap();
            let avg = outcome.summary.unwrap().average_rating;
            assert!((1.0..=5.0).contains(&avg), "average {} out of bounds", avg);
        }
    }

    #[test]
    fn test_summary_failure_does_not_fail_mutation() {
        let mut store = MemoryStore::with_products(&["p1"]);
        store.fail_summary_writes = true;
        let mut service = ReviewService::new(&mut store);

        let review = submit(&mut service, "p1", 5);
        let outcome = service.moderate(&review.id, ModerationAction::Approve).unwrap();

        assert_eq!(outcome.review.status, ReviewStatus::Approved);
        assert_eq!(outcome.summary, None);
        // Stale until the next reconcile
        assert_eq!(store.products["p1"], RatingSummary::default());
        assert_eq!(store.reviews[0].status, ReviewStatus::Approved);

        store.fail_summary_writes = false;
        let summary = reconcile(&mut store, "p1").unwrap();
        assert_eq!(summary.approved_count, 1);
        assert_eq!(summary.average_rating, 5.0);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut store = MemoryStore::with_products(&["p1"]);
        let mut service = ReviewService::new(&mut store);
        let review = submit(&mut service, "p1", 4);
        service.moderate(&review.id, ModerationAction::Approve).unwrap();

        let first = reconcile(&mut store, "p1").unwrap();
        let second = reconcile(&mut store, "p1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reconcile_all_covers_every_product() {
        let mut store = MemoryStore::with_products(&["p1", "p2", "p3"]);
        let report = reconcile_all(&mut store).unwrap();

        assert_eq!(report.products, 3);
        assert_eq!(report.reconciled, 3);
        assert!(report.failures.is_empty());
        assert_eq!(store.summary_writes, 3);
    }

    #[test]
    fn test_reconcile_all_collects_failures() {
        let mut store = MemoryStore::with_products(&["p1", "p2"]);
        store.fail_summary_writes = true;

        let report = reconcile_all(&mut store).unwrap();
        assert_eq!(report.reconciled, 0);
        assert_eq!(report.failures.len(), 2);
    }

    #[test]
    fn test_review_for_unknown_product_rejected() {
        let mut store = MemoryStore::with_products(&["p1"]);
        let mut service = ReviewService::new(&mut store);

        let err = service
            .create(NewReview {
                product_id: "ghost".to_string(),
                rating: 4,
                title: None,
                comment: None,
                author_name: None,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "product", .. }));
    }

    #[test]
    fn test_moderating_missing_review_is_not_found() {
        let mut store = MemoryStore::with_products(&["p1"]);
        let mut service = ReviewService::new(&mut store);

        assert!(matches!(
            service.moderate("nope", ModerationAction::Approve),
            Err(EngineError::NotFound { entity: "review", .. })
        ));
        assert!(service.delete("nope").is_err());
    }
}
