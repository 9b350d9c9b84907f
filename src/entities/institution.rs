// 🏦 Institution Entity - the bank/fintech/insurer behind a product
//
// "Institution name is a VALUE, institution UUID is IDENTITY"
//
// Institutions are created lazily by the importer the first time a provider
// name shows up, and never deleted by this engine. Products reference them by
// id so a later rename does not orphan the catalogue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    /// Display name, matched exactly during import
    pub name: String,

    /// Inactive institutions stay referenced but are hidden from listings
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

impl Institution {
    /// New active institution with a fresh UUID
    pub fn new(name: &str) -> Self {
        Institution {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
