// 💳 Product Entity - the canonical financial product
//
// Whatever shape a product arrived in (flat spreadsheet row or relational
// institution/category/subcategory join), this is what the rest of the
// marketplace reads.

use crate::fields::{generate_slug, RateRange, TermRange};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    /// Credit cards
    Credit,

    /// Personal, payroll and auto loans
    Loans,

    /// Funds, CETES, fixed-term deposits
    Investments,

    /// Debit and savings accounts
    Banking,

    /// Insurance policies
    Insurance,

    /// Store financing / buy-now-pay-later
    Financing,

    /// Catch-all for unrecognized category keys
    All,
}

/// Fixed spelling table. Keys are already slugged, so "Crédito", "CREDITO"
/// and "credito" all land on "credito".
const CATEGORY_KEYS: &[(&str, ProductCategory)] = &[
    ("credit", ProductCategory::Credit),
    ("credito", ProductCategory::Credit),
    ("creditos", ProductCategory::Credit),
    ("credit-card", ProductCategory::Credit),
    ("credit-cards", ProductCategory::Credit),
    ("tarjeta", ProductCategory::Credit),
    ("tarjetas", ProductCategory::Credit),
    ("tarjetas-de-credito", ProductCategory::Credit),
    ("loan", ProductCategory::Loans),
    ("loans", ProductCategory::Loans),
    ("prestamo", ProductCategory::Loans),
    ("prestamos", ProductCategory::Loans),
    ("personal-loans", ProductCategory::Loans),
    ("prestamos-personales", ProductCategory::Loans),
    ("investment", ProductCategory::Investments),
    ("investments", ProductCategory::Investments),
    ("inversion", ProductCategory::Investments),
    ("inversiones", ProductCategory::Investments),
    ("banking", ProductCategory::Banking),
    ("bank-accounts", ProductCategory::Banking),
    ("cuenta", ProductCategory::Banking),
    ("cuentas", ProductCategory::Banking),
    ("debito", ProductCategory::Banking),
    ("ahorro", ProductCategory::Banking),
    ("insurance", ProductCategory::Insurance),
    ("seguro", ProductCategory::Insurance),
    ("seguros", ProductCategory::Insurance),
    ("financing", ProductCategory::Financing),
    ("financiamiento", ProductCategory::Financing),
    ("financiamientos", ProductCategory::Financing),
    ("bnpl", ProductCategory::Financing),
    ("all", ProductCategory::All),
    ("todos", ProductCategory::All),
];

impl ProductCategory {
    pub const ALL_VARIANTS: [ProductCategory; 7] = [
        ProductCategory::Credit,
        ProductCategory::Loans,
        ProductCategory::Investments,
        ProductCategory::Banking,
        ProductCategory::Insurance,
        ProductCategory::Financing,
        ProductCategory::All,
    ];

    /// Slug stored in the database and used in URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Credit => "credit",
            ProductCategory::Loans => "loans",
            ProductCategory::Investments => "investments",
            ProductCategory::Banking => "banking",
            ProductCategory::Insurance => "insurance",
            ProductCategory::Financing => "financing",
            ProductCategory::All => "all",
        }
    }

    /// Human-readable name (Spanish, as shown on the site)
    pub fn label(&self) -> &'static str {
        match self {
            ProductCategory::Credit => "Tarjetas de Crédito",
            ProductCategory::Loans => "Préstamos",
            ProductCategory::Investments => "Inversiones",
            ProductCategory::Banking => "Cuentas Bancarias",
            ProductCategory::Insurance => "Seguros",
            ProductCategory::Financing => "Financiamiento",
            ProductCategory::All => "Productos Financieros",
        }
    }

    /// Map any known spelling to a category; unknown keys become `All`.
    pub fn from_key(key: &str) -> ProductCategory {
        Self::from_key_with_aliases(key, &HashMap::new())
    }

    /// Same as `from_key`, with extra config-supplied spellings checked first.
    /// Alias values name a category by its `as_str()` slug.
    pub fn from_key_with_aliases(key: &str, aliases: &HashMap<String, String>) -> ProductCategory {
        let slug = generate_slug(key);

        let resolved = aliases
            .iter()
            .find(|(alias, _)| generate_slug(alias) == slug)
            .map(|(_, target)| generate_slug(target))
            .unwrap_or(slug);

        CATEGORY_KEYS
            .iter()
            .find(|(k, _)| *k == resolved)
            .map(|(_, category)| *category)
            .unwrap_or(ProductCategory::All)
    }
}

// ============================================================================
// SEGMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    #[default]
    Personal,
    Business,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Personal => "personal",
            Segment::Business => "business",
        }
    }

    /// Absent or unrecognized → `Personal`
    pub fn from_text(text: Option<&str>) -> Segment {
        match text.map(generate_slug).as_deref() {
            Some("business" | "empresa" | "empresas" | "negocio" | "negocios" | "pyme" | "pymes") => {
                Segment::Business
            }
            _ => Segment::Personal,
        }
    }
}

// ============================================================================
// RATING SUMMARY
// ============================================================================

/// Derived from approved reviews; only `ratings::reconcile` writes it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub approved_count: u32,
}

impl RatingSummary {
    /// Mean of the given ratings, or the empty summary when there are none
    pub fn from_ratings(ratings: &[u8]) -> Self {
        if ratings.is_empty() {
            return RatingSummary::default();
        }

        let sum: u32 = ratings.iter().map(|r| *r as u32).sum();
        RatingSummary {
            average_rating: sum as f64 / ratings.len() as f64,
            approved_count: ratings.len() as u32,
        }
    }
}

// ============================================================================
// CANONICAL PRODUCT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    /// Stable identity (UUID)
    pub id: String,
    pub name: String,
    /// Unique, URL-safe, derived from name (+ disambiguator)
    pub slug: String,
    pub institution_id: String,
    pub category: ProductCategory,
    pub segment: Segment,

    pub tagline: Option<String>,
    pub description: String,
    pub benefits: Vec<String>,
    pub features: Vec<String>,

    pub rate_info: Option<RateRange>,
    pub term_info: Option<TermRange>,
    pub max_amount: Option<f64>,
    pub fees: Option<String>,
    pub eligibility: Vec<String>,

    pub image_url: String,
    pub ai_hint: String,
    pub details_url: Option<String>,

    #[serde(default)]
    pub rating: RatingSummary,

    /// Columns we do not model yet
    #[serde(default)]
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl CanonicalProduct {
    /// Payload used for change detection: everything except identity and the
    /// derived rating, serialized deterministically.
    pub fn content_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut payload = self.clone();
        payload.id = String::new();
        payload.rating = RatingSummary::default();

        let json = serde_json::to_string(&payload).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
