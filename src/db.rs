// 🗄️ SQLite Store - institutions, products, reviews, audit events
//
// One connection, used from one thread. List fields and metadata live in JSON
// text columns so new spreadsheet columns never need a migration.

use crate::entities::{
    CanonicalProduct, Institution, ProductCategory, RatingSummary, Review, ReviewStatus, Segment,
};
use crate::error::{EngineError, Result};
use crate::fields::{RateRange, TermRange};
use crate::import::{ProductStore, StoredProduct};
use crate::ratings::ReviewStore;
use crate::resolver::InstitutionStore;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Actor recorded on events written by the engine itself
pub const ENGINE_ACTOR: &str = "raisket_engine";

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (in-memory databases silently stay on "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Institutions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS institutions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Products (canonical shape, rating summary is a projection of reviews)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            slug TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            institution_id TEXT NOT NULL,
            category TEXT NOT NULL,
            segment TEXT NOT NULL,
            tagline TEXT,
            description TEXT NOT NULL,
            benefits TEXT NOT NULL,
            features TEXT NOT NULL,
            rate_min REAL,
            rate_max REAL,
            term_min INTEGER,
            term_max INTEGER,
            max_amount REAL,
            fees TEXT,
            eligibility TEXT NOT NULL,
            image_url TEXT NOT NULL,
            ai_hint TEXT NOT NULL,
            details_url TEXT,
            metadata TEXT,
            average_rating REAL NOT NULL DEFAULT 0,
            review_count INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Reviews
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reviews (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
            title TEXT,
            comment TEXT,
            author_name TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected')),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_institutions_name ON institutions(name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_products_institution ON products(institution_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reviews_product ON reviews(product_id, status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| conversion_error(5, e.to_string()))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn parse_timestamp(column: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e.to_string()))
}

fn json_list(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_default()
}

// ============================================================================
// STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Audit writes never fail the change they describe
    fn record(&self, event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value) {
        let event = Event::new(event_type, entity_type, entity_id, data, ENGINE_ACTOR);
        if let Err(e) = insert_event(&self.conn, &event) {
            warn!(event_type, entity_id, error = %e, "failed to write audit event");
        }
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, entity_type, entity_id)
    }

    pub fn count_products(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_institutions(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM institutions", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_product_by_slug(&self, slug: &str) -> Result<Option<CanonicalProduct>> {
        Ok(self.find_product_by_slug(slug)?.map(|stored| stored.product))
    }

    /// All products, optionally restricted to one category, ordered by slug
    pub fn list_products(&self, category: Option<ProductCategory>) -> Result<Vec<CanonicalProduct>> {
        let sql = format!(
            "SELECT {} FROM products WHERE (?1 IS NULL OR category = ?1) ORDER BY slug",
            PRODUCT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let products = stmt
            .query_map(params![category.map(|c| c.as_str())], product_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(products)
    }

    pub fn get_institution(&self, id: &str) -> Result<Option<Institution>> {
        let institution = self
            .conn
            .query_row(
                "SELECT id, name, is_active, created_at FROM institutions WHERE id = ?1",
                params![id],
                institution_from_row,
            )
            .optional()?;
        Ok(institution)
    }

    pub fn reviews_for_product(&self, product_id: &str) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE product_id = ?1 ORDER BY created_at",
            REVIEW_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let reviews = stmt
            .query_map(params![product_id], review_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(reviews)
    }

    fn write_product(&self, product: &CanonicalProduct, content_hash: &str, insert: bool) -> Result<usize> {
        let benefits = serde_json::to_string(&product.benefits)?;
        let features = serde_json::to_string(&product.features)?;
        let eligibility = serde_json::to_string(&product.eligibility)?;
        let metadata = serde_json::to_string(&product.metadata)?;
        let rate = product.rate_info.unwrap_or_default();
        let term = product.term_info.unwrap_or_default();
        let now = Utc::now().to_rfc3339();

        // Rating columns are owned by the review projection and never written here
        let sql = if insert {
            "INSERT INTO products (
                id, slug, name, institution_id, category, segment, tagline, description,
                benefits, features, rate_min, rate_max, term_min, term_max, max_amount,
                fees, eligibility, image_url, ai_hint, details_url, metadata,
                content_hash, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?23)"
        } else {
            "UPDATE products SET
                slug = ?2, name = ?3, institution_id = ?4, category = ?5, segment = ?6,
                tagline = ?7, description = ?8, benefits = ?9, features = ?10,
                rate_min = ?11, rate_max = ?12, term_min = ?13, term_max = ?14,
                max_amount = ?15, fees = ?16, eligibility = ?17, image_url = ?18,
                ai_hint = ?19, details_url = ?20, metadata = ?21,
                content_hash = ?22, updated_at = ?23
             WHERE id = ?1"
        };

        let changed = self.conn.execute(
            sql,
            params![
                product.id,
                product.slug,
                product.name,
                product.institution_id,
                product.category.as_str(),
                product.segment.as_str(),
                product.tagline,
                product.description,
                benefits,
                features,
                rate.min,
                rate.max,
                term.min,
                term.max,
                product.max_amount,
                product.fees,
                eligibility,
                product.image_url,
                product.ai_hint,
                product.details_url,
                metadata,
                content_hash,
                now,
            ],
        )?;

        Ok(changed)
    }
}

const PRODUCT_COLUMNS: &str = "id, slug, name, institution_id, category, segment, tagline, \
     description, benefits, features, rate_min, rate_max, term_min, term_max, max_amount, \
     fees, eligibility, image_url, ai_hint, details_url, metadata, average_rating, \
     review_count, content_hash";

const REVIEW_COLUMNS: &str =
    "id, product_id, rating, title, comment, author_name, status, created_at";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<CanonicalProduct> {
    let category: String = row.get(4)?;
    let segment: String = row.get(5)?;
    let benefits: String = row.get(8)?;
    let features: String = row.get(9)?;
    let eligibility: String = row.get(16)?;
    let metadata_json: Option<String> = row.get(20)?;

    let metadata = metadata_json
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();

    Ok(CanonicalProduct {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        institution_id: row.get(3)?,
        category: ProductCategory::from_key(&category),
        segment: Segment::from_text(Some(&segment)),
        tagline: row.get(6)?,
        description: row.get(7)?,
        benefits: json_list(&benefits),
        features: json_list(&features),
        rate_info: RateRange::new(row.get(10)?, row.get(11)?).known(),
        term_info: TermRange::new(row.get(12)?, row.get(13)?).known(),
        max_amount: row.get(14)?,
        fees: row.get(15)?,
        eligibility: json_list(&eligibility),
        image_url: row.get(17)?,
        ai_hint: row.get(18)?,
        details_url: row.get(19)?,
        rating: RatingSummary {
            average_rating: row.get(21)?,
            approved_count: row.get(22)?,
        },
        metadata,
    })
}

fn institution_from_row(row: &Row<'_>) -> rusqlite::Result<Institution> {
    let created_at: String = row.get(3)?;
    Ok(Institution {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let status: String = row.get(6)?;
    let created_at: String = row.get(7)?;

    Ok(Review {
        id: row.get(0)?,
        product_id: row.get(1)?,
        rating: row.get(2)?,
        title: row.get(3)?,
        comment: row.get(4)?,
        author_name: row.get(5)?,
        status: ReviewStatus::parse(&status)
            .ok_or_else(|| conversion_error(6, format!("unknown review status '{}'", status)))?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

// ============================================================================
// STORE TRAITS
// ============================================================================

impl InstitutionStore for SqliteStore {
    fn find_institution_by_name(&self, name: &str) -> Result<Option<Institution>> {
        let institution = self
            .conn
            .query_row(
                "SELECT id, name, is_active, created_at FROM institutions
                 WHERE name = ?1 ORDER BY created_at LIMIT 1",
                params![name],
                institution_from_row,
            )
            .optional()?;
        Ok(institution)
    }

    fn insert_institution(&mut self, institution: &Institution) -> Result<()> {
        self.conn.execute(
            "INSERT INTO institutions (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                institution.id,
                institution.name,
                institution.is_active,
                institution.created_at.to_rfc3339(),
            ],
        )?;

        self.record(
            "institution_created",
            "institution",
            &institution.id,
            serde_json::json!({ "name": institution.name }),
        );
        Ok(())
    }

    fn find_institution_by_id(&self, id: &str) -> Result<Option<Institution>> {
        self.get_institution(id)
    }
}

impl SqliteStore {
    /// `column` is one of our own column names, never user input
    fn find_stored_product(&self, column: &'static str, value: &str) -> Result<Option<StoredProduct>> {
        let sql = format!("SELECT {} FROM products WHERE {} = ?1", PRODUCT_COLUMNS, column);

        let stored = self
            .conn
            .query_row(&sql, params![value], |row| {
                Ok(StoredProduct {
                    product: product_from_row(row)?,
                    content_hash: row.get(23)?,
                })
            })
            .optional()?;
        Ok(stored)
    }
}

impl ProductStore for SqliteStore {
    fn find_product_by_slug(&self, slug: &str) -> Result<Option<StoredProduct>> {
        self.find_stored_product("slug", slug)
    }

    fn find_product_by_id(&self, id: &str) -> Result<Option<StoredProduct>> {
        self.find_stored_product("id", id)
    }

    fn insert_product(&mut self, product: &CanonicalProduct, content_hash: &str) -> Result<()> {
        self.write_product(product, content_hash, true)?;
        debug!(slug = %product.slug, id = %product.id, "product inserted");

        self.record(
            "product_inserted",
            "product",
            &product.id,
            serde_json::json!({
                "slug": product.slug,
                "institution_id": product.institution_id,
                "category": product.category.as_str(),
            }),
        );
        Ok(())
    }

    fn update_product(&mut self, product: &CanonicalProduct, content_hash: &str) -> Result<()> {
        if self.write_product(product, content_hash, false)? == 0 {
            return Err(EngineError::not_found("product", product.id.clone()));
        }
        debug!(slug = %product.slug, id = %product.id, "product updated");

        self.record(
            "product_updated",
            "product",
            &product.id,
            serde_json::json!({ "slug": product.slug, "content_hash": content_hash }),
        );
        Ok(())
    }
}

impl ReviewStore for SqliteStore {
    fn product_exists(&self, product_id: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = ?1)",
            params![product_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn product_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM products ORDER BY slug")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn insert_review(&mut self, review: &Review) -> Result<()> {
        self.conn.execute(
            "INSERT INTO reviews (id, product_id, rating, title, comment, author_name, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                review.id,
                review.product_id,
                review.rating,
                review.title,
                review.comment,
                review.author_name,
                review.status.as_str(),
                review.created_at.to_rfc3339(),
            ],
        )?;

        self.record(
            "review_created",
            "review",
            &review.id,
            serde_json::json!({ "product_id": review.product_id, "rating": review.rating }),
        );
        Ok(())
    }

    fn get_review(&self, id: &str) -> Result<Option<Review>> {
        let sql = format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS);
        let review = self
            .conn
            .query_row(&sql, params![id], review_from_row)
            .optional()?;
        Ok(review)
    }

    fn set_review_status(&mut self, id: &str, status: ReviewStatus) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE reviews SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("review", id));
        }

        self.record(
            "review_moderated",
            "review",
            id,
            serde_json::json!({ "status": status.as_str() }),
        );
        Ok(())
    }

    fn delete_review(&mut self, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM reviews WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(EngineError::not_found("review", id));
        }

        self.record("review_deleted", "review", id, serde_json::json!({}));
        Ok(())
    }

    fn approved_ratings(&self, product_id: &str) -> Result<Vec<u8>> {
        let mut stmt = self
            .conn
            .prepare("SELECT rating FROM reviews WHERE product_id = ?1 AND status = 'approved'")?;
        let ratings = stmt
            .query_map(params![product_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<u8>, _>>()?;
        Ok(ratings)
    }

    fn write_rating_summary(&mut self, product_id: &str, summary: &RatingSummary) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE products SET average_rating = ?2, review_count = ?3 WHERE id = ?1",
            params![product_id, summary.average_rating, summary.approved_count],
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("product", product_id));
        }
        Ok(())
    }
}
