// Entity Models
// "Identity persists, values change"
//
// Each entity has a stable UUID identity; its values are owned by the store.

pub mod institution;
pub mod product;
pub mod review;

pub use institution::Institution;
pub use product::{CanonicalProduct, ProductCategory, RatingSummary, Segment};
pub use review::{ModerationAction, NewReview, Review, ReviewStatus};
