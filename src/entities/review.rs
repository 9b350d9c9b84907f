// ⭐ Review Entity - user ratings awaiting moderation
//
// State machine (admin actions only, no automatic transitions):
//
//   pending ──approve──▶ approved
//      │                   ▲  │
//      └──reject──▶ rejected ◀┘   (approved ↔ rejected may be toggled)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<ReviewStatus> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }

    /// Apply an admin action. Every action is reachable from every state
    /// except that nothing ever moves back to `Pending`.
    pub fn apply(self, action: ModerationAction) -> ReviewStatus {
        match action {
            ModerationAction::Approve => ReviewStatus::Approved,
            ModerationAction::Reject => ReviewStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
}

/// What a submitter provides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub product_id: String,
    pub rating: u8,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
}

impl NewReview {
    pub fn validate(&self) -> Result<()> {
        if self.product_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("review needs a product_id".to_string()));
        }
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(EngineError::InvalidInput(format!(
                "rating must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, self.rating
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub product_id: String,
    pub rating: u8,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub author_name: Option<String>,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Build a pending review from validated submitter input
    pub fn from_submission(new: NewReview) -> Result<Self> {
        new.validate()?;

        Ok(Review {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: new.product_id,
            rating: new.rating,
            title: new.title,
            comment: new.comment,
            author_name: new.author_name,
            status: ReviewStatus::Pending,
            created_at: Utc::now(),
        })
    }

    pub fn is_approved(&self) -> bool {
        self.status == ReviewStatus::Approved
    }
}
